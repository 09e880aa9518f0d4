//! Persistent command channel with a fixed-delay reconnect loop.
//!
//! The channel owns a small state machine:
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnected → (delay) → Connecting → ...
//! ```
//!
//! Inbound text frames are parsed into [`InboundMessage`]s and broadcast as
//! [`ChannelEvent`]s. A frame that fails to parse is surfaced as
//! [`ChannelEvent::InvalidResponse`] and otherwise swallowed.
//!
//! [`CommandChannel::send`] (via [`CommandSink`]) succeeds only while the
//! state is [`ChannelState::Connected`]; otherwise it returns
//! [`Error::ConnectionLost`] without queueing anything.
//!
//! [`CommandChannel::close`] is the intentional shutdown path: it marks the
//! channel as cleaning up, which suppresses the automatic reconnect.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetsync_api::{CommandChannel, ReconnectConfig, WebSocketTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! let transport = WebSocketTransport::new(url);
//! let cancel = CancellationToken::new();
//! let channel = CommandChannel::spawn(transport, ReconnectConfig::primary(), token, &cancel);
//! let mut events = channel.subscribe();
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//!
//! channel.close();
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::wire::{CommandPayload, InboundMessage, OutboundEnvelope};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Reconnect delay for the primary operator channel.
pub const PRIMARY_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Reconnect delay for the administrative channel variant.
pub const ADMIN_RECONNECT_DELAY: Duration = Duration::from_secs(5);

// ── ChannelState ─────────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ChannelState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ── ChannelEvent ─────────────────────────────────────────────────────

/// Something received over the channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A well-formed confirmation or event.
    Message(Arc<InboundMessage>),
    /// A frame that could not be parsed. Carries the raw text for logging.
    InvalidResponse { raw: String, reason: String },
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Reconnect policy: a single fixed delay, no backoff or jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay between a disconnect and the next connection attempt.
    pub delay: Duration,
}

impl ReconnectConfig {
    pub fn primary() -> Self {
        Self {
            delay: PRIMARY_RECONNECT_DELAY,
        }
    }

    pub fn admin() -> Self {
        Self {
            delay: ADMIN_RECONNECT_DELAY,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::primary()
    }
}

// ── Transport seam ───────────────────────────────────────────────────

/// A frame coming up from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The peer closed the connection normally.
    Closed,
    /// The connection broke.
    Failed(String),
}

/// One live connection, as a pair of channels.
///
/// The transport owns the other ends and pumps real I/O into them. Dropping
/// the `Connection` tells the transport to close.
#[derive(Debug)]
pub struct Connection {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<Frame>,
}

/// The far side of an in-memory [`Connection`].
#[derive(Debug)]
pub struct ConnectionRemote {
    /// Frames the client wrote.
    pub sent: mpsc::UnboundedReceiver<String>,
    /// Push frames to the client.
    pub frames: mpsc::UnboundedSender<Frame>,
}

impl Connection {
    /// Build a connected pair without any real I/O.
    pub fn in_memory() -> (Self, ConnectionRemote) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
            },
            ConnectionRemote {
                sent: out_rx,
                frames: in_tx,
            },
        )
    }
}

/// Opens connections for the command channel.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<Connection, Error>> + Send;
}

// ── CommandSink ──────────────────────────────────────────────────────

/// The narrow sending surface the reconciler depends on.
pub trait CommandSink: Send + Sync {
    fn state(&self) -> ChannelState;

    /// Send one command. Fails with [`Error::ConnectionLost`] unless connected.
    fn send(&self, payload: &CommandPayload) -> Result<(), Error>;
}

// ── CommandChannel ───────────────────────────────────────────────────

/// Handle to a running command channel. Cheaply cloneable.
#[derive(Clone)]
pub struct CommandChannel {
    shared: Arc<Shared>,
}

struct Shared {
    state: watch::Sender<ChannelState>,
    outbound: ArcSwapOption<mpsc::UnboundedSender<String>>,
    events: broadcast::Sender<ChannelEvent>,
    /// Cancelled on intentional close; checked before scheduling a reconnect.
    cleaning_up: CancellationToken,
    token: SecretString,
}

impl Shared {
    fn set_state(&self, next: ChannelState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                tracing::debug!(from = ?*current, to = ?next, "command channel state");
                *current = next;
                true
            }
        });
    }
}

impl CommandChannel {
    /// Spawn the connection loop and return a handle immediately.
    ///
    /// The first connection attempt happens asynchronously. `cancel` is
    /// linked to the channel's own close token: cancelling it is an
    /// intentional close.
    pub fn spawn<T: Transport>(
        transport: T,
        reconnect: ReconnectConfig,
        token: SecretString,
        cancel: &CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            state,
            outbound: ArcSwapOption::empty(),
            events,
            cleaning_up: cancel.child_token(),
            token,
        });

        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            channel_loop(transport, task_shared, reconnect).await;
        });

        Self { shared }
    }

    /// Get a new receiver for inbound events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    /// Watch connection state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Close the channel intentionally. No reconnect will be scheduled.
    pub fn close(&self) {
        self.shared.cleaning_up.cancel();
        self.shared.outbound.store(None);
        self.shared.set_state(ChannelState::Disconnected);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.cleaning_up.is_cancelled()
    }
}

impl CommandSink for CommandChannel {
    fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    fn send(&self, payload: &CommandPayload) -> Result<(), Error> {
        if !self.state().is_connected() {
            return Err(Error::ConnectionLost);
        }
        let guard = self.shared.outbound.load();
        let Some(tx) = guard.as_ref() else {
            return Err(Error::ConnectionLost);
        };

        let envelope = OutboundEnvelope {
            kind: "command",
            token: self.shared.token.expose_secret(),
            payload,
        };
        let text = serde_json::to_string(&envelope).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;

        tx.send(text).map_err(|_| Error::ConnectionLost)?;
        tracing::debug!(
            station = %payload.station_id,
            action = %payload.action,
            "command sent"
        );
        Ok(())
    }
}

// ── Background connection loop ───────────────────────────────────────

/// Main loop: connect → read → on close or error, fixed delay → reconnect.
async fn channel_loop<T: Transport>(transport: T, shared: Arc<Shared>, reconnect: ReconnectConfig) {
    let cancel = shared.cleaning_up.clone();

    loop {
        shared.set_state(ChannelState::Connecting);

        let attempt = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = transport.connect() => result,
        };

        match attempt {
            Ok(conn) => read_until_closed(conn, &shared, &cancel).await,
            Err(e) => tracing::warn!(error = %e, "command channel connect failed"),
        }

        shared.outbound.store(None);
        shared.set_state(ChannelState::Disconnected);

        if cancel.is_cancelled() {
            break;
        }

        tracing::info!(
            delay_ms = u64::try_from(reconnect.delay.as_millis()).unwrap_or(u64::MAX),
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(reconnect.delay) => {}
        }
    }

    shared.outbound.store(None);
    shared.set_state(ChannelState::Disconnected);
    tracing::debug!("command channel loop exiting");
}

/// Publish the connection, then pump inbound frames until it drops.
async fn read_until_closed(conn: Connection, shared: &Shared, cancel: &CancellationToken) {
    let Connection {
        outbound,
        mut inbound,
    } = conn;

    shared.outbound.store(Some(Arc::new(outbound)));
    shared.set_state(ChannelState::Connected);
    tracing::info!("command channel connected");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = inbound.recv() => match frame {
                Some(Frame::Text(text)) => parse_and_broadcast(&text, &shared.events),
                Some(Frame::Closed) | None => {
                    tracing::info!("command channel closed by peer");
                    return;
                }
                Some(Frame::Failed(reason)) => {
                    tracing::warn!(%reason, "command channel error");
                    return;
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

fn parse_and_broadcast(text: &str, events: &broadcast::Sender<ChannelEvent>) {
    let event = match serde_json::from_str::<InboundMessage>(text) {
        Ok(msg) => ChannelEvent::Message(Arc::new(msg)),
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse inbound message");
            ChannelEvent::InvalidResponse {
                raw: text.to_owned(),
                reason: e.to_string(),
            }
        }
    };

    // Ignore send errors -- just means no active subscribers right now
    let _ = events.send(event);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_is_primary() {
        assert_eq!(ReconnectConfig::default().delay, Duration::from_secs(1));
        assert_eq!(ReconnectConfig::admin().delay, Duration::from_secs(5));
    }

    #[test]
    fn parse_and_broadcast_well_formed_message() {
        let (tx, mut rx) = broadcast::channel(16);

        parse_and_broadcast(
            r#"{"action":"lock slot","status":"locked","station":"A","module":1,"slot":3}"#,
            &tx,
        );

        let ChannelEvent::Message(msg) = rx.try_recv().unwrap() else {
            panic!("expected a message");
        };
        assert_eq!(msg.action, "lock slot");
        assert_eq!(msg.affected_slot, Some(3));
    }

    #[test]
    fn parse_and_broadcast_malformed_json() {
        let (tx, mut rx) = broadcast::channel(16);

        parse_and_broadcast("not json at all", &tx);

        assert!(matches!(
            rx.try_recv().unwrap(),
            ChannelEvent::InvalidResponse { ref raw, .. } if raw == "not json at all"
        ));
    }

    #[test]
    fn in_memory_connection_is_wired_both_ways() {
        let (mut conn, mut remote) = Connection::in_memory();

        conn.outbound.send("hello".into()).unwrap();
        remote.frames.send(Frame::Closed).unwrap();

        assert_eq!(remote.sent.try_recv().unwrap(), "hello");
        assert_eq!(conn.inbound.try_recv().unwrap(), Frame::Closed);
    }
}
