// ── Rental domain type ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::{RentalId, StationId};

/// A rental record. Only the fields the refund flow touches are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    pub id: RentalId,
    pub station_id: Option<StationId>,
    pub status: String,
    /// Amount in minor currency units.
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Rental {
    pub fn is_refunded(&self) -> bool {
        self.status.eq_ignore_ascii_case("refunded")
    }
}
