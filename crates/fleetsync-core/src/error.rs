// ── Core error types ──
//
// User-facing errors from fleetsync-core. Consumers never see raw transport
// failures; the `From<fleetsync_api::Error>` impl translates them into the
// reconciler's taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Channel / connectivity ───────────────────────────────────────
    /// A command was submitted while the command channel was not open.
    #[error("Command channel unavailable: {reason}")]
    ChannelUnavailable { reason: String },

    /// An inbound message could not be understood.
    #[error("Invalid response from server: {message}")]
    InvalidResponse { message: String },

    /// The document store reported a stream error.
    #[error("Document store connectivity error: {message}")]
    Connectivity { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Station not found: {identifier}")]
    StationNotFound { identifier: String },

    #[error("Slot not found: station {station}, module {module}, slot {slot}")]
    SlotNotFound {
        station: String,
        module: u32,
        slot: u32,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_channel_unavailable(&self) -> bool {
        matches!(self, Self::ChannelUnavailable { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<fleetsync_api::Error> for CoreError {
    fn from(err: fleetsync_api::Error) -> Self {
        match err {
            fleetsync_api::Error::ConnectionLost => CoreError::ChannelUnavailable {
                reason: "connection lost".into(),
            },
            fleetsync_api::Error::WebSocketConnect(reason) => CoreError::ChannelUnavailable {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            fleetsync_api::Error::WebSocketClosed { code, reason } => {
                CoreError::ChannelUnavailable {
                    reason: format!("WebSocket closed (code {code}): {reason}"),
                }
            }
            fleetsync_api::Error::Transport(ref e) => CoreError::Connectivity {
                message: e.to_string(),
            },
            fleetsync_api::Error::Listener {
                collection,
                status,
                message,
            } => CoreError::Connectivity {
                message: format!("'{collection}' returned HTTP {status}: {message}"),
            },
            fleetsync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            fleetsync_api::Error::Deserialization { message, body: _ } => {
                CoreError::InvalidResponse { message }
            }
        }
    }
}
