//! Configuration for the fleetsync CLI.
//!
//! TOML profiles, token resolution (env + plaintext + keyring), and
//! translation to `fleetsync_core::FleetConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetsync_core::FleetConfig;
use fleetsync_core::config::{DEFAULT_HTTP_TIMEOUT, DEFAULT_POLL_INTERVAL};
use fleetsync_core::suppression::SuppressionTtls;

/// Environment variable checked for the token when a profile names none.
pub const TOKEN_ENV: &str = "FLEETSYNC_TOKEN";

const KEYRING_SERVICE: &str = "fleetsync";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoToken { profile: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named fleet profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick a profile: the explicit name, else `default_profile`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// How long a CLI command waits for its confirmation, in seconds.
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            confirm_timeout: default_confirm_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT.as_secs()
}
fn default_confirm_timeout() -> u64 {
    30
}

/// A named fleet: where the two channels live and how to reach them.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Profile {
    /// WebSocket URL of the command channel.
    pub channel_url: String,

    /// Base URL of the document store.
    pub store_url: String,

    /// Connect as the administrative channel (slower reconnect).
    #[serde(default)]
    pub admin: bool,

    /// Token (plaintext, prefer `token_env` or the keyring).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable name containing the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stations_collection: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rentals_collection: Option<String>,

    /// Document store poll interval in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    /// Fixed command-channel reconnect delay in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,

    /// Override timeout (seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Suppression window overrides.
    #[serde(default, skip_serializing_if = "TtlOverrides::is_empty")]
    pub ttls: TtlOverrides,
}

/// Per-profile suppression windows, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct TtlOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_confirm: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_session: Option<u64>,
}

impl TtlOverrides {
    pub fn is_empty(&self) -> bool {
        self.lock_confirm.is_none() && self.command.is_none() && self.edit_session.is_none()
    }

    pub fn apply(&self, mut ttls: SuppressionTtls) -> SuppressionTtls {
        if let Some(secs) = self.lock_confirm {
            ttls.lock_confirm = Duration::from_secs(secs);
        }
        if let Some(secs) = self.command {
            ttls.command = Duration::from_secs(secs);
        }
        if let Some(secs) = self.edit_session {
            ttls.edit_session = Duration::from_secs(secs);
        }
        ttls
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "fleetsync", "fleetsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fleetsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` (if it exists), then `FLEETSYNC_*` variables
/// (`FLEETSYNC_DEFAULTS__OUTPUT=json`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FLEETSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the fleet token: the profile's `token_env`, then
/// `FLEETSYNC_TOKEN`, then plaintext, then the system keyring.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        keyring_token,
    )
}

fn keyring_token(profile_name: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .ok()?
        .get_password()
        .ok()
}

fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    let from_env = profile
        .token_env
        .as_deref()
        .and_then(&env)
        .or_else(|| env(TOKEN_ENV))
        .filter(|t| !t.is_empty());
    if let Some(token) = from_env {
        return Ok(SecretString::from(token));
    }

    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    keyring(profile_name)
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::NoToken {
            profile: profile_name.into(),
        })
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

/// Build a `FleetConfig` from a profile, resolving the token.
pub fn profile_to_fleet_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<FleetConfig, ConfigError> {
    let token = resolve_token(profile, profile_name)?;
    fleet_config_with_token(profile, token)
}

/// Build a `FleetConfig` from a profile and an already-resolved token.
pub fn fleet_config_with_token(
    profile: &Profile,
    token: SecretString,
) -> Result<FleetConfig, ConfigError> {
    let channel_url = parse_url("channel_url", &profile.channel_url)?;
    if !matches!(channel_url.scheme(), "ws" | "wss") {
        return Err(ConfigError::Validation {
            field: "channel_url".into(),
            reason: format!("expected a ws:// or wss:// URL, got '{channel_url}'"),
        });
    }
    let store_url = parse_url("store_url", &profile.store_url)?;

    let mut cfg = FleetConfig::new(channel_url, store_url, token);
    if profile.admin {
        cfg = cfg.admin();
    }
    if let Some(ref name) = profile.stations_collection {
        cfg.stations_collection.clone_from(name);
    }
    if let Some(ref name) = profile.rentals_collection {
        cfg.rentals_collection.clone_from(name);
    }
    cfg.poll_interval = profile
        .poll_interval_ms
        .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);
    if let Some(ms) = profile.reconnect_delay_ms {
        cfg.reconnect_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = profile.timeout {
        cfg.timeout = Duration::from_secs(secs);
    }
    cfg.ttls = profile.ttls.apply(cfg.ttls);
    Ok(cfg)
}
