// ── Entity Store ──
//
// Reactive storage for the canonical fleet model. Readers get snapshots
// and `EntityStream`s; only the reconciler writes.

mod collection;
mod entity_store;

pub(crate) use collection::Change;
pub use entity_store::EntityStore;
