// ── Central reactive entity store ──
//
// Holds stations, rentals, and the published overlay view. Everything
// public here is read-only; mutation goes through the reconciler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::{Change, EntityCollection};
use crate::model::{Rental, RentalId, Station, StationId};
use crate::overlay::OverlayMarker;
use crate::stream::EntityStream;

/// Canonical in-memory fleet model consumed by rendering.
pub struct EntityStore {
    stations: EntityCollection<Station>,
    rentals: EntityCollection<Rental>,
    overlays: watch::Sender<Arc<Vec<Arc<OverlayMarker>>>>,
    last_station_snapshot: watch::Sender<Option<DateTime<Utc>>>,
    last_rental_snapshot: watch::Sender<Option<DateTime<Utc>>>,
}

impl EntityStore {
    pub fn new() -> Self {
        let (overlays, _) = watch::channel(Arc::new(Vec::new()));
        let (last_station_snapshot, _) = watch::channel(None);
        let (last_rental_snapshot, _) = watch::channel(None);

        Self {
            stations: EntityCollection::new(),
            rentals: EntityCollection::new(),
            overlays,
            last_station_snapshot,
            last_rental_snapshot,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn stations_snapshot(&self) -> Arc<Vec<Arc<Station>>> {
        self.stations.snapshot()
    }

    pub fn rentals_snapshot(&self) -> Arc<Vec<Arc<Rental>>> {
        self.rentals.snapshot()
    }

    pub fn overlays_snapshot(&self) -> Arc<Vec<Arc<OverlayMarker>>> {
        self.overlays.borrow().clone()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn station(&self, id: &StationId) -> Option<Arc<Station>> {
        self.stations.get(id.as_str())
    }

    pub fn rental(&self, id: &RentalId) -> Option<Arc<Rental>> {
        self.rentals.get(id.as_str())
    }

    pub fn station_ids(&self) -> Vec<StationId> {
        let mut ids: Vec<StationId> = self.stations.keys().into_iter().map(StationId::from).collect();
        ids.sort();
        ids
    }

    pub fn rental_ids(&self) -> Vec<RentalId> {
        let mut ids: Vec<RentalId> = self.rentals.keys().into_iter().map(RentalId::from).collect();
        ids.sort();
        ids
    }

    // ── Count accessors ──────────────────────────────────────────────

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn rental_count(&self) -> usize {
        self.rentals.len()
    }

    /// Bumped on every published station change.
    pub fn stations_version(&self) -> u64 {
        self.stations.version()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_stations(&self) -> EntityStream<Station> {
        EntityStream::new(self.stations.subscribe())
    }

    pub fn subscribe_rentals(&self) -> EntityStream<Rental> {
        EntityStream::new(self.rentals.subscribe())
    }

    pub fn subscribe_overlays(&self) -> EntityStream<OverlayMarker> {
        EntityStream::new(self.overlays.subscribe())
    }

    // ── Metadata ─────────────────────────────────────────────────────

    /// When the last station snapshot was processed, accepted or not.
    pub fn last_station_snapshot(&self) -> Option<DateTime<Utc>> {
        *self.last_station_snapshot.borrow()
    }

    pub fn last_rental_snapshot(&self) -> Option<DateTime<Utc>> {
        *self.last_rental_snapshot.borrow()
    }

    pub fn watch_station_snapshots(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_station_snapshot.subscribe()
    }

    pub fn watch_rental_snapshots(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_rental_snapshot.subscribe()
    }

    // ── Reconciler-only mutation ─────────────────────────────────────

    pub(crate) fn apply_stations(&self, changes: Vec<Change<Station>>) -> usize {
        self.stations.apply(changes)
    }

    pub(crate) fn apply_rentals(&self, changes: Vec<Change<Rental>>) -> usize {
        self.rentals.apply(changes)
    }

    pub(crate) fn put_station(&self, station: Station) {
        self.stations.upsert(station.id.as_str().to_owned(), station);
    }

    pub(crate) fn put_rental(&self, rental: Rental) {
        self.rentals.upsert(rental.id.as_str().to_owned(), rental);
    }

    pub(crate) fn publish_overlays(&self, markers: Vec<OverlayMarker>) {
        let markers: Vec<Arc<OverlayMarker>> = markers.into_iter().map(Arc::new).collect();
        self.overlays.send_if_modified(|current| {
            if current.as_slice() == markers.as_slice() {
                false
            } else {
                *current = Arc::new(markers);
                true
            }
        });
    }

    pub(crate) fn mark_station_snapshot(&self, at: DateTime<Utc>) {
        self.last_station_snapshot.send_replace(Some(at));
    }

    pub(crate) fn mark_rental_snapshot(&self, at: DateTime<Utc>) {
        self.last_rental_snapshot.send_replace(Some(at));
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::overlay::OverlayKind;

    #[test]
    fn station_ids_are_sorted() {
        let store = EntityStore::new();
        store.put_station(Station::new("B"));
        store.put_station(Station::new("A"));

        assert_eq!(store.station_ids(), vec![StationId::from("A"), StationId::from("B")]);
        assert!(store.station(&StationId::from("A")).is_some());
        assert_eq!(store.station_count(), 2);
    }

    #[test]
    fn identical_overlay_view_is_not_republished() {
        let store = EntityStore::new();
        let mut rx = store.overlays.subscribe();
        let marker = OverlayMarker {
            station: StationId::from("A"),
            module: 1,
            slot: 3,
            kind: OverlayKind::Ejecting,
        };

        store.publish_overlays(vec![marker.clone()]);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        store.publish_overlays(vec![marker]);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.overlays_snapshot().len(), 1);
    }
}
