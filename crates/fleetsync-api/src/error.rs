use thiserror::Error;

/// Top-level error type for the `fleetsync-api` crate.
///
/// Covers every failure mode of the two transports: the command channel
/// (WebSocket) and the document-store listener (HTTP).
/// `fleetsync-core` maps these into user-facing variants.
#[derive(Debug, Error)]
pub enum Error {
    // ── Command channel ─────────────────────────────────────────────
    /// `send()` was called while the channel was not connected.
    #[error("Connection lost -- command channel is not connected")]
    ConnectionLost,

    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the peer.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Document store ──────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The document store answered with a non-success status.
    #[error("Document store error for '{collection}' (HTTP {status}): {message}")]
    Listener {
        collection: String,
        status: u16,
        message: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON (de)serialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) | Self::ConnectionLost => true,
            Self::Listener { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the command channel was not open.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost)
    }
}
