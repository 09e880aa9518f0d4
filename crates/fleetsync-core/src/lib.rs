//! Dual-channel state reconciliation for an unattended kiosk fleet.
//!
//! Two independent sources describe the fleet: a push-based document store
//! that periodically delivers the full set of station documents, and a
//! command channel that carries operator commands out and immediate
//! confirmations back. This crate merges them into one consistent model:
//!
//! - **[`Fleet`]**: Central facade. [`start()`](Fleet::start) spawns the
//!   command channel, subscribes the station and rental collections, and runs
//!   the [`Reconciler`] on a single task. Commands go in through
//!   [`submit()`](Fleet::submit); reads come straight from the [`EntityStore`].
//!
//! - **[`Reconciler`]**: Merge rules. A confirmed command wins over a stale
//!   snapshot for as long as the entity is in the [`SuppressionRegistry`];
//!   after that the snapshot is authoritative again.
//!
//! - **[`OptimisticOverlay`]**: Per-slot "in flight" markers shown between a
//!   command and the snapshot that reflects it.
//!
//! - **[`dispatch`]**: Classifies inbound confirmations and decodes the
//!   closed set of [`Confirmation`]s.
//!
//! - **Domain model** ([`model`]): `Station`, `Module`, `Slot`, `Rental`.

pub mod clock;
pub mod command;
pub mod config;
pub mod confirm;
pub mod convert;
pub mod error;
pub mod fleet;
pub mod model;
pub mod notice;
pub mod overlay;
pub mod reconciler;
pub mod store;
pub mod stream;
pub mod suppression;

// ── Primary re-exports ──────────────────────────────────────────────
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Action, Command, SlotSelection, UpdateTarget};
pub use config::FleetConfig;
pub use confirm::{Confirmation, Dispatch, EjectTarget, Outcome, dispatch};
pub use error::CoreError;
pub use fleet::Fleet;
pub use notice::{Notice, NoticeLevel};
pub use overlay::{OptimisticOverlay, OverlayKey, OverlayKind, OverlayMarker};
pub use reconciler::{Reconciler, SnapshotReport};
pub use store::EntityStore;
pub use stream::{EntityStream, EntityWatchStream};
pub use suppression::{SuppressionRegistry, SuppressionTtls};

pub use fleetsync_api::{ChannelState, Document};

pub use model::{
    EntityKey, FULL_BATTERY_LEVEL, Module, Rental, RentalId, Slot, SlotRef, Station, StationId,
    TunnelKind,
};
