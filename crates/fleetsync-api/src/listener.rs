//! Push Listener Adapter for the document store.
//!
//! A [`PushListener`] delivers the *entire* current set of documents in a
//! collection on every change -- never a delta. Diffing against the local
//! model is the subscriber's job.
//!
//! [`HttpCollectionListener`] implements this over a plain REST endpoint
//! (`GET {base}/collections/{name}`), polling at a fixed interval and only
//! emitting when the collection content differs from the last emission.
//! After an error the next successful fetch is always emitted, so a
//! subscriber that showed a connectivity banner sees fresh state.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

/// One document from a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Handle returned by [`PushListener::subscribe`].
///
/// Unsubscribes when [`unsubscribe`](Self::unsubscribe) is called or when
/// dropped.
#[derive(Debug)]
pub struct Subscription {
    collection: String,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(collection: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            collection: collection.into(),
            cancel,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Subscribe to full-collection snapshots.
pub trait PushListener: Send + Sync {
    /// Start watching `collection`. `on_snapshot` receives the full document
    /// set on every change; `on_error` signals a connectivity problem.
    /// Resubscription after an error is the listener's responsibility.
    fn subscribe<S, E>(&self, collection: &str, on_snapshot: S, on_error: E) -> Subscription
    where
        S: Fn(Vec<Document>) + Send + 'static,
        E: Fn(Error) + Send + 'static;
}

// ── HTTP polling implementation ──────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

/// Polls a REST collection endpoint and emits on change.
#[derive(Debug, Clone)]
pub struct HttpCollectionListener {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
    interval: Duration,
}

impl HttpCollectionListener {
    pub fn new(base_url: Url, token: Option<SecretString>, interval: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token, interval)
    }

    /// Build with a caller-supplied `reqwest::Client` (timeouts, TLS, ...).
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        token: Option<SecretString>,
        interval: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            token,
            interval,
        }
    }

    /// Build with a per-request timeout.
    pub fn with_timeout(
        base_url: Url,
        token: Option<SecretString>,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url, token, interval))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn collection_url(&self, collection: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/collections/{collection}"))?)
    }

    /// Fetch the current document set once.
    pub async fn fetch(&self, collection: &str) -> Result<Vec<Document>, Error> {
        let url = self.collection_url(collection)?;
        tracing::trace!(%url, "fetching collection");

        let mut request = self.http.get(url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Listener {
                collection: collection.to_owned(),
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str::<CollectionResponse>(&body)
            .map(|r| r.documents)
            .map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body,
            })
    }
}

impl PushListener for HttpCollectionListener {
    fn subscribe<S, E>(&self, collection: &str, on_snapshot: S, on_error: E) -> Subscription
    where
        S: Fn(Vec<Document>) + Send + 'static,
        E: Fn(Error) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let listener = self.clone();
        let name = collection.to_owned();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut last: Option<Vec<Document>> = None;
            loop {
                tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    result = listener.fetch(&name) => match result {
                        Ok(docs) => {
                            if last.as_ref() != Some(&docs) {
                                tracing::debug!(collection = %name, count = docs.len(), "collection changed");
                                on_snapshot(docs.clone());
                                last = Some(docs);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(collection = %name, error = %e, "collection fetch failed");
                            on_error(e);
                            last = None;
                        }
                    }
                }

                tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    () = tokio::time::sleep(listener.interval) => {}
                }
            }
            tracing::debug!(collection = %name, "listener exiting");
        });

        Subscription::new(collection, cancel)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn collection_url_handles_trailing_slash() {
        let with = HttpCollectionListener::new(
            Url::parse("http://store.local/api/").unwrap(),
            None,
            Duration::from_secs(1),
        );
        let without = HttpCollectionListener::new(
            Url::parse("http://store.local/api").unwrap(),
            None,
            Duration::from_secs(1),
        );

        assert_eq!(
            with.collection_url("stations").unwrap().as_str(),
            "http://store.local/api/collections/stations"
        );
        assert_eq!(
            without.collection_url("stations").unwrap().as_str(),
            "http://store.local/api/collections/stations"
        );
    }

    #[test]
    fn dropping_subscription_cancels() {
        let cancel = CancellationToken::new();
        let sub = Subscription::new("stations", cancel.clone());
        assert!(sub.is_active());
        drop(sub);
        assert!(cancel.is_cancelled());
    }
}
