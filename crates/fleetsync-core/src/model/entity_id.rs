// ── Core identity types ──
//
// Station and rental ids are opaque strings assigned by the backend.
// `EntityKey` unifies them so one suppression registry can guard both
// collections without id collisions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a kiosk station.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StationId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for StationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a rental record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RentalId(String);

impl RentalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RentalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RentalId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RentalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Any entity the Reconciler can suppress snapshots for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityKey {
    Station(StationId),
    Rental(RentalId),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Station(id) => write!(f, "station:{id}"),
            Self::Rental(id) => write!(f, "rental:{id}"),
        }
    }
}

impl From<StationId> for EntityKey {
    fn from(id: StationId) -> Self {
        Self::Station(id)
    }
}

impl From<&StationId> for EntityKey {
    fn from(id: &StationId) -> Self {
        Self::Station(id.clone())
    }
}

impl From<RentalId> for EntityKey {
    fn from(id: RentalId) -> Self {
        Self::Rental(id)
    }
}

impl From<&RentalId> for EntityKey {
    fn from(id: &RentalId) -> Self {
        Self::Rental(id.clone())
    }
}
