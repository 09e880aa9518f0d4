//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fleetsync_config::ConfigError;
use fleetsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Command channel unavailable: {reason}")]
    #[diagnostic(
        code(fleetsync::channel_unavailable),
        help(
            "Check that the command channel is reachable and the token is valid.\n\
             Try: fleetsync watch -v"
        )
    )]
    ChannelUnavailable { reason: String },

    #[error("Document store unreachable: {message}")]
    #[diagnostic(
        code(fleetsync::store_unreachable),
        help("Check store_url in your profile or pass --store-url.")
    )]
    StoreUnreachable { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(fleetsync::no_token),
        help(
            "Set token_env in the profile, export FLEETSYNC_TOKEN, \
             or pass --token."
        )
    )]
    NoToken { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(fleetsync::not_found),
        help("Run: fleetsync {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Outcome ──────────────────────────────────────────────────────
    #[error("Station rejected '{action}': {message}")]
    #[diagnostic(code(fleetsync::rejected))]
    Rejected { action: String, message: String },

    #[error("Invalid response from server: {message}")]
    #[diagnostic(code(fleetsync::invalid_response))]
    InvalidResponse { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fleetsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fleetsync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: fleetsync config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No fleet configured")]
    #[diagnostic(
        code(fleetsync::no_config),
        help(
            "Create a profile with: fleetsync config init --channel <URL> --store <URL>\n\
             Or pass --channel-url and --store-url.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(fleetsync::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s waiting for {what}")]
    #[diagnostic(
        code(fleetsync::timeout),
        help("Increase the wait with --timeout, or run `fleetsync watch` to follow late confirmations.")
    )]
    Timeout { what: String, seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ChannelUnavailable { .. } | Self::StoreUnreachable { .. } => {
                exit_code::CONNECTION
            }
            Self::NoToken { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } | Self::InvalidResponse { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ChannelUnavailable { reason } => CliError::ChannelUnavailable { reason },
            CoreError::Connectivity { message } => CliError::StoreUnreachable { message },
            CoreError::InvalidResponse { message } => CliError::InvalidResponse { message },
            CoreError::StationNotFound { identifier } => CliError::NotFound {
                resource_type: "station".into(),
                identifier,
                list_command: "stations".into(),
            },
            CoreError::SlotNotFound {
                station,
                module,
                slot,
            } => CliError::NotFound {
                resource_type: "slot".into(),
                identifier: format!("{station}/{module}/{slot}"),
                list_command: format!("station show {station}"),
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoToken { profile } => CliError::NoToken { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}
