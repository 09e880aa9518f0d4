#![allow(clippy::unwrap_used)]
// Integration tests for `HttpCollectionListener` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use tokio::sync::mpsc;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fleetsync_api::{Document, Error, HttpCollectionListener, PushListener};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpCollectionListener) {
    let server = MockServer::start().await;
    let listener = HttpCollectionListener::new(
        Url::parse(&server.uri()).unwrap(),
        Some(SecretString::from("store-token".to_string())),
        Duration::from_millis(20),
    );
    (server, listener)
}

fn stations_body(disabled: bool) -> serde_json::Value {
    json!({
        "documents": [
            { "id": "A", "data": { "disabled": disabled, "modules": [] } },
            { "id": "B", "data": { "disabled": false, "modules": [] } }
        ]
    })
}

enum Seen {
    Snapshot(Vec<Document>),
    Error(Error),
}

fn subscribe(listener: &HttpCollectionListener) -> (fleetsync_api::Subscription, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let err_tx = tx.clone();
    let sub = listener.subscribe(
        "stations",
        move |docs| {
            let _ = tx.send(Seen::Snapshot(docs));
        },
        move |e| {
            let _ = err_tx.send(Seen::Error(e));
        },
    );
    (sub, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_sends_bearer_token() {
    let (server, listener) = setup().await;

    Mock::given(method("GET"))
        .and(path("/collections/stations"))
        .and(header("authorization", "Bearer store-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stations_body(false)))
        .mount(&server)
        .await;

    let docs = listener.fetch("stations").await.unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].id, "A");
    assert_eq!(docs[0].data["disabled"], false);
}

#[tokio::test]
async fn test_fetch_maps_error_status() {
    let (server, listener) = setup().await;

    Mock::given(method("GET"))
        .and(path("/collections/stations"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
        .mount(&server)
        .await;

    let result = listener.fetch("stations").await;
    match result {
        Err(Error::Listener { status, ref message, .. }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "down for maintenance");
        }
        ref other => panic!("expected Listener error, got {other:?}"),
    }
    assert!(result.unwrap_err().is_transient());
}

#[tokio::test]
async fn test_fetch_rejects_malformed_body() {
    let (server, listener) = setup().await;

    Mock::given(method("GET"))
        .and(path("/collections/stations"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let result = listener.fetch("stations").await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_subscription_emits_only_on_change() {
    let (server, listener) = setup().await;

    Mock::given(method("GET"))
        .and(path("/collections/stations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stations_body(false)))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/collections/stations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stations_body(true)))
        .mount(&server)
        .await;

    let (_sub, mut rx) = subscribe(&listener);

    let Seen::Snapshot(first) = next(&mut rx).await else {
        panic!("expected snapshot");
    };
    assert_eq!(first[0].data["disabled"], false);

    // The three identical polls collapse into one emission.
    let Seen::Snapshot(second) = next(&mut rx).await else {
        panic!("expected snapshot");
    };
    assert_eq!(second[0].data["disabled"], true);
}

#[tokio::test]
async fn test_subscription_reports_errors_then_recovers() {
    let (server, listener) = setup().await;

    Mock::given(method("GET"))
        .and(path("/collections/stations"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/collections/stations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stations_body(false)))
        .mount(&server)
        .await;

    let (_sub, mut rx) = subscribe(&listener);

    assert!(matches!(next(&mut rx).await, Seen::Error(Error::Listener { status: 500, .. })));
    assert!(matches!(next(&mut rx).await, Seen::Snapshot(ref docs) if docs.len() == 2));
}

#[tokio::test]
async fn test_unsubscribe_stops_polling() {
    let (server, listener) = setup().await;

    Mock::given(method("GET"))
        .and(path("/collections/stations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stations_body(false)))
        .mount(&server)
        .await;

    let (sub, mut rx) = subscribe(&listener);
    assert!(matches!(next(&mut rx).await, Seen::Snapshot(_)));

    sub.unsubscribe();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let before = server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = server.received_requests().await.unwrap().len();
    assert_eq!(before, after);
}
