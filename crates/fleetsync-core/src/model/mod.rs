// ── Domain model ──
//
// Canonical types consumed by rendering. Raw documents from the store are
// normalized into these in `crate::convert`.

pub mod entity_id;
pub mod rental;
pub mod station;

pub use entity_id::{EntityKey, RentalId, StationId};
pub use rental::Rental;
pub use station::{FULL_BATTERY_LEVEL, Module, Slot, SlotRef, Station, TunnelKind};
