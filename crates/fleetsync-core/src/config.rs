// ── Runtime fleet configuration ──
//
// Describes *where* the two channels live and how the reconciler is tuned.
// Carries the auth token but never touches disk; `fleetsync-config` builds
// one of these from a profile and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use fleetsync_api::{ADMIN_RECONNECT_DELAY, PRIMARY_RECONNECT_DELAY, ReconnectConfig};

use crate::suppression::SuppressionTtls;

pub const DEFAULT_STATIONS_COLLECTION: &str = "stations";
pub const DEFAULT_RENTALS_COLLECTION: &str = "rentals";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// WebSocket URL of the command channel.
    pub channel_url: Url,
    /// Connect as the administrative channel variant.
    pub admin_channel: bool,
    /// Base URL of the document store.
    pub store_url: Url,
    /// Sent inside every outbound command envelope and as a bearer token
    /// to the document store.
    pub token: SecretString,
    pub stations_collection: String,
    pub rentals_collection: String,
    /// How often the document store is polled.
    pub poll_interval: Duration,
    /// Fixed delay before reconnecting the command channel.
    pub reconnect_delay: Duration,
    pub ttls: SuppressionTtls,
    /// Request timeout for document-store fetches.
    pub timeout: Duration,
}

impl FleetConfig {
    pub fn new(channel_url: Url, store_url: Url, token: SecretString) -> Self {
        Self {
            channel_url,
            admin_channel: false,
            store_url,
            token,
            stations_collection: DEFAULT_STATIONS_COLLECTION.into(),
            rentals_collection: DEFAULT_RENTALS_COLLECTION.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect_delay: PRIMARY_RECONNECT_DELAY,
            ttls: SuppressionTtls::default(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Switch to the administrative channel and its slower reconnect.
    pub fn admin(mut self) -> Self {
        self.admin_channel = true;
        self.reconnect_delay = ADMIN_RECONNECT_DELAY;
        self
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            delay: self.reconnect_delay,
        }
    }
}
