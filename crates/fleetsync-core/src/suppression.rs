// ── Suppression registry ──
//
// Entity key → expiry instant. While an entry is live, snapshots for that
// entity are discarded in favour of the store's current value. A new
// `suppress` call always overwrites the previous expiry, even if the new
// one is sooner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::model::EntityKey;

/// Window after a lock/unlock submission or confirmation.
pub const LOCK_CONFIRM_TTL: Duration = Duration::from_secs(20);

/// Window after any other command submission or confirmation.
pub const COMMAND_TTL: Duration = Duration::from_secs(30);

/// Window held while a station is open in an interactive edit session.
pub const EDIT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// The three suppression durations. Independent knobs, not one formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionTtls {
    pub lock_confirm: Duration,
    pub command: Duration,
    pub edit_session: Duration,
}

impl Default for SuppressionTtls {
    fn default() -> Self {
        Self {
            lock_confirm: LOCK_CONFIRM_TTL,
            command: COMMAND_TTL,
            edit_session: EDIT_SESSION_TTL,
        }
    }
}

/// Decides whether a snapshot may overwrite an entity right now.
#[derive(Debug)]
pub struct SuppressionRegistry {
    clock: Arc<dyn Clock>,
    entries: HashMap<EntityKey, Instant>,
}

impl SuppressionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: HashMap::new(),
        }
    }

    /// Suppress `key` until `now + ttl`, replacing any existing entry.
    /// Returns the new expiry.
    pub fn suppress(&mut self, key: impl Into<EntityKey>, ttl: Duration) -> Instant {
        let key = key.into();
        let expiry = self.clock.now() + ttl;
        tracing::trace!(%key, ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX), "suppressing");
        self.entries.insert(key, expiry);
        expiry
    }

    /// `true` iff `now < expiry`.
    pub fn is_suppressed(&self, key: impl Into<EntityKey>) -> bool {
        let key = key.into();
        self.entries
            .get(&key)
            .is_some_and(|expiry| self.clock.now() < *expiry)
    }

    /// Drop the entry for `key`. Returns `true` if one existed.
    pub fn clear(&mut self, key: impl Into<EntityKey>) -> bool {
        let key = key.into();
        let existed = self.entries.remove(&key).is_some();
        if existed {
            tracing::trace!(%key, "suppression cleared");
        }
        existed
    }

    /// Raw expiry for `key`, live or not.
    pub fn expiry(&self, key: impl Into<EntityKey>) -> Option<Instant> {
        self.entries.get(&key.into()).copied()
    }

    /// Time left in the window, or `None` once it has lapsed.
    pub fn remaining(&self, key: impl Into<EntityKey>) -> Option<Duration> {
        let expiry = self.expiry(key)?;
        let now = self.clock.now();
        (now < expiry).then(|| expiry - now)
    }

    /// Forget lapsed entries. Returns how many were dropped.
    pub fn prune_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, expiry| now < *expiry);
        before - self.entries.len()
    }

    /// Keys whose window is still open.
    pub fn active(&self) -> Vec<EntityKey> {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|(_, expiry)| now < **expiry)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl Default for SuppressionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
