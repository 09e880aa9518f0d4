#![allow(clippy::unwrap_used)]
// End-to-end tests for `Fleet` over an in-memory transport and a
// hand-fed document store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use tokio::sync::{Mutex, mpsc};

use fleetsync_api::{
    Connection, ConnectionRemote, Document, Error, Frame, PushListener, Subscription, Transport,
};
use fleetsync_core::{
    ChannelState, Command, Fleet, FleetConfig, NoticeLevel, SlotRef, Station, StationId,
};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(30);

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Clone)]
struct ScriptedTransport {
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Connection>>>,
}

impl Transport for ScriptedTransport {
    async fn connect(&self) -> Result<Connection, Error> {
        let mut queue = self.queue.lock().await;
        match queue.recv().await {
            Some(conn) => Ok(conn),
            None => std::future::pending().await,
        }
    }
}

type SnapshotFn = Box<dyn Fn(Vec<Document>) + Send>;
type ErrorFn = Box<dyn Fn(Error) + Send>;

/// Keeps the callbacks so the test can push snapshots and errors by hand.
#[derive(Clone, Default)]
struct ManualListener {
    subscribers: Arc<StdMutex<HashMap<String, (SnapshotFn, ErrorFn)>>>,
}

impl ManualListener {
    fn push(&self, collection: &str, docs: Vec<Document>) {
        let subs = self.subscribers.lock().unwrap();
        (subs.get(collection).unwrap().0)(docs);
    }

    fn fail(&self, collection: &str, error: Error) {
        let subs = self.subscribers.lock().unwrap();
        (subs.get(collection).unwrap().1)(error);
    }
}

impl PushListener for ManualListener {
    fn subscribe<S, E>(&self, collection: &str, on_snapshot: S, on_error: E) -> Subscription
    where
        S: Fn(Vec<Document>) + Send + 'static,
        E: Fn(Error) + Send + 'static,
    {
        self.subscribers.lock().unwrap().insert(
            collection.to_owned(),
            (Box::new(on_snapshot), Box::new(on_error)),
        );
        Subscription::new(collection, CancellationToken::new())
    }
}

struct Harness {
    fleet: Fleet,
    listener: ManualListener,
    script: mpsc::UnboundedSender<Connection>,
}

async fn harness() -> Harness {
    let config = FleetConfig::new(
        "ws://fleet.test/ws".parse().unwrap(),
        "http://store.test/api".parse().unwrap(),
        SecretString::from("t0k3n".to_owned()),
    );
    let (script, queue) = mpsc::unbounded_channel();
    let transport = ScriptedTransport {
        queue: Arc::new(Mutex::new(queue)),
    };
    let listener = ManualListener::default();
    let fleet = Fleet::new(config);
    tokio_test::assert_ok!(fleet.start_with(transport, listener.clone()).await);
    Harness {
        fleet,
        listener,
        script,
    }
}

impl Harness {
    async fn connect(&self) -> ConnectionRemote {
        let (conn, remote) = Connection::in_memory();
        self.script.send(conn).unwrap();
        self.fleet.wait_connected(WAIT).await.unwrap();
        remote
    }

    async fn seed(&self) {
        self.listener.push("stations", vec![station_doc("A", false)]);
        self.fleet.wait_for_stations(WAIT).await.unwrap();
    }
}

fn station_doc(id: &str, locked: bool) -> Document {
    Document {
        id: id.into(),
        data: json!({
            "modules": [{
                "id": 1,
                "slots": [
                    { "position": 1, "serial": "PB-001", "battery": 100, "isLocked": false },
                    { "position": 3, "serial": "PB-003", "battery": 60, "isLocked": locked }
                ]
            }]
        }),
    }
}

fn slot_locked(stations: &[Arc<Station>]) -> Option<bool> {
    stations
        .iter()
        .find(|s| s.id.as_str() == "A")
        .and_then(|s| s.slot(SlotRef { module: 1, slot: 3 }))
        .and_then(|s| s.locked)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn lock_round_trip_through_both_channels() {
    let h = harness().await;
    let mut remote = h.connect().await;
    h.seed().await;

    h.fleet
        .submit(Command::LockSlot {
            station: "A".into(),
            slot: SlotRef { module: 1, slot: 3 },
            reason: None,
        })
        .await
        .unwrap();

    let frame = remote.sent.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["kind"], "command");
    assert_eq!(value["payload"]["action"], "lock slot");

    let mut overlays = h.fleet.subscribe_overlays();
    assert_eq!(overlays.latest().len(), 1);

    remote
        .frames
        .send(Frame::Text(
            json!({
                "action": "lock slot", "status": "locked",
                "affectedStation": "A", "affectedModule": 1, "affectedSlot": 3
            })
            .to_string(),
        ))
        .unwrap();

    let mut stations = h.fleet.subscribe_stations();
    let snap = tokio::time::timeout(WAIT, stations.wait_for(|s| slot_locked(s) == Some(true)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slot_locked(&snap), Some(true));
    tokio::time::timeout(WAIT, overlays.wait_for(|m| m.is_empty()))
        .await
        .unwrap()
        .unwrap();

    // A stale snapshot inside the window does not undo the confirmation.
    h.listener.push("stations", vec![station_doc("A", false)]);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(slot_locked(&h.fleet.stations()), Some(true));

    h.fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connection_made_before_engine_runs_is_reported() {
    let config = FleetConfig::new(
        "ws://fleet.test/ws".parse().unwrap(),
        "http://store.test/api".parse().unwrap(),
        SecretString::from("t0k3n".to_owned()),
    );
    let (script, queue) = mpsc::unbounded_channel();
    let (conn, mut remote) = Connection::in_memory();
    script.send(conn).unwrap();
    let transport = ScriptedTransport {
        queue: Arc::new(Mutex::new(queue)),
    };
    let listener = ManualListener::default();
    let fleet = Fleet::new(config);
    tokio_test::assert_ok!(fleet.start_with(transport, listener.clone()).await);

    fleet.wait_connected(WAIT).await.unwrap();
    assert_eq!(*fleet.connection_state().borrow(), ChannelState::Connected);

    listener.push("stations", vec![station_doc("A", false)]);
    fleet.wait_for_stations(WAIT).await.unwrap();
    tokio_test::assert_ok!(
        fleet
            .submit(Command::Disable {
                station: "A".into(),
            })
            .await
    );
    let frame = remote.sent.recv().await.unwrap();
    assert!(frame.contains("disable"));

    fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn submit_while_disconnected_is_rejected() {
    let h = harness().await;
    h.listener.push("stations", vec![station_doc("A", false)]);
    h.fleet.wait_for_stations(WAIT).await.unwrap();
    let mut notices = h.fleet.notices();

    let err = h
        .fleet
        .submit(Command::Disable {
            station: "A".into(),
        })
        .await
        .unwrap_err();

    assert!(err.is_channel_unavailable());
    assert!(!h.fleet.station(&StationId::from("A")).unwrap().disabled);
    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);

    h.fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn listener_error_keeps_last_known_state() {
    let h = harness().await;
    h.seed().await;
    let mut notices = h.fleet.notices();

    h.listener.fail("stations", Error::ConnectionLost);

    let notice = tokio::time::timeout(WAIT, notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notice.message.contains("stations"));
    assert_eq!(h.fleet.stations().len(), 1);

    h.fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_disconnects_and_stops_engine() {
    let h = harness().await;
    let _remote = h.connect().await;

    h.fleet.shutdown().await;

    assert_eq!(*h.fleet.connection_state().borrow(), ChannelState::Disconnected);
    let err = h
        .fleet
        .begin_edit(StationId::from("A"))
        .await
        .unwrap_err();
    assert!(matches!(err, fleetsync_core::CoreError::Internal(_)));
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected() {
    let h = harness().await;
    let (_script, queue) = mpsc::unbounded_channel();
    let transport = ScriptedTransport {
        queue: Arc::new(Mutex::new(queue)),
    };

    let err = tokio_test::assert_err!(
        h.fleet
            .start_with(transport, ManualListener::default())
            .await
    );
    assert!(matches!(err, fleetsync_core::CoreError::Internal(_)));

    h.fleet.shutdown().await;
}
