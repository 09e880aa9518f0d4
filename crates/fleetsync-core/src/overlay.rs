// ── Optimistic overlay ──
//
// Transient per-slot markers shown between a command's submission and its
// confirmation. Keyed by (station, module, slot) for O(1) lookup and
// removal. Entries have no timeout: they leave only on a matching
// confirmation, a settling sweep, or an explicit clear.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tokio::time::Instant;

use crate::model::{SlotRef, Station, StationId};

/// Composite key of one overlay entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OverlayKey {
    pub station: StationId,
    pub module: u32,
    pub slot: u32,
}

impl OverlayKey {
    pub fn new(station: StationId, at: SlotRef) -> Self {
        Self {
            station,
            module: at.module,
            slot: at.slot,
        }
    }

    pub fn slot_ref(&self) -> SlotRef {
        SlotRef {
            module: self.module,
            slot: self.slot,
        }
    }
}

impl fmt::Display for OverlayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.station, self.module, self.slot)
    }
}

/// What the operator is waiting for on a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayKind {
    /// Waiting on a confirmation with no observable target value.
    Pending,
    /// Waiting for the occupant to leave.
    Ejecting,
    /// Waiting for a lock change towards `locked`. Any reported lock flag
    /// settles it; the snapshot is authoritative on the final value.
    Locking { locked: bool },
}

impl OverlayKind {
    /// Whether `slot` already reports what this overlay is waiting on.
    /// A missing slot counts as settled.
    pub fn is_settled(self, slot: Option<&crate::model::Slot>) -> bool {
        let Some(slot) = slot else {
            return true;
        };
        match self {
            Self::Pending => false,
            Self::Ejecting => !slot.is_occupied(),
            Self::Locking { .. } => slot.locked.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayEntry {
    pub kind: OverlayKind,
    pub created_at: Instant,
}

/// Flattened, renderable view of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayMarker {
    pub station: StationId,
    pub module: u32,
    pub slot: u32,
    #[serde(flatten)]
    pub kind: OverlayKind,
}

#[derive(Debug, Default)]
pub struct OptimisticOverlay {
    entries: HashMap<OverlayKey, OverlayEntry>,
}

impl OptimisticOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a slot. Replaces an existing marker for the same key.
    pub fn insert(&mut self, key: OverlayKey, kind: OverlayKind, now: Instant) {
        self.entries.insert(
            key,
            OverlayEntry {
                kind,
                created_at: now,
            },
        );
    }

    pub fn remove(&mut self, key: &OverlayKey) -> Option<OverlayEntry> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &OverlayKey) -> Option<&OverlayEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &OverlayKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys belonging to one station, sorted.
    pub fn keys_for(&self, station: &StationId) -> Vec<OverlayKey> {
        let mut keys: Vec<OverlayKey> = self
            .entries
            .keys()
            .filter(|k| &k.station == station)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Drop every marker on `station`. Returns how many were removed.
    pub fn clear_station(&mut self, station: &StationId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| &k.station != station);
        before - self.entries.len()
    }

    /// Drop markers on `station` whose slot already shows the awaited value.
    pub fn sweep(&mut self, station: &Station) -> Vec<OverlayKey> {
        let settled: Vec<OverlayKey> = self
            .entries
            .iter()
            .filter(|(k, e)| k.station == station.id && e.kind.is_settled(station.slot(k.slot_ref())))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &settled {
            self.entries.remove(key);
        }
        settled
    }

    /// Sorted, renderable view of every entry.
    pub fn markers(&self) -> Vec<OverlayMarker> {
        let mut markers: Vec<OverlayMarker> = self
            .entries
            .iter()
            .map(|(k, e)| OverlayMarker {
                station: k.station.clone(),
                module: k.module,
                slot: k.slot,
                kind: e.kind,
            })
            .collect();
        markers.sort_by(|a, b| {
            (&a.station, a.module, a.slot).cmp(&(&b.station, b.module, b.slot))
        });
        markers
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Module, Slot};

    fn station(locked: Option<bool>, serial: Option<&str>) -> Station {
        let mut s = Station::new("A");
        s.modules = vec![Module {
            id: 1,
            output: true,
            slots: vec![Slot {
                position: 3,
                serial: serial.map(str::to_owned),
                locked,
                ..Slot::default()
            }],
        }];
        s
    }

    fn key() -> OverlayKey {
        OverlayKey::new(StationId::from("A"), SlotRef { module: 1, slot: 3 })
    }

    #[test]
    fn locking_settles_once_lock_flag_is_defined() {
        let mut overlay = OptimisticOverlay::new();
        overlay.insert(key(), OverlayKind::Locking { locked: true }, Instant::now());

        assert!(overlay.sweep(&station(None, None)).is_empty());
        assert_eq!(overlay.sweep(&station(Some(false), None)), vec![key()]);
        assert!(overlay.is_empty());

        overlay.insert(key(), OverlayKind::Locking { locked: false }, Instant::now());
        assert_eq!(overlay.sweep(&station(Some(false), None)), vec![key()]);
    }

    #[test]
    fn ejecting_settles_when_slot_empties() {
        let mut overlay = OptimisticOverlay::new();
        overlay.insert(key(), OverlayKind::Ejecting, Instant::now());

        assert!(overlay.sweep(&station(None, Some("PB-1"))).is_empty());
        assert_eq!(overlay.sweep(&station(None, None)).len(), 1);
    }

    #[test]
    fn pending_never_settles_by_sweep() {
        let mut overlay = OptimisticOverlay::new();
        overlay.insert(key(), OverlayKind::Pending, Instant::now());

        assert!(overlay.sweep(&station(Some(true), None)).is_empty());
        assert!(overlay.contains(&key()));
    }

    #[test]
    fn missing_slot_counts_as_settled() {
        let mut overlay = OptimisticOverlay::new();
        overlay.insert(key(), OverlayKind::Pending, Instant::now());

        assert_eq!(overlay.sweep(&Station::new("A")).len(), 1);
    }

    #[test]
    fn sweep_ignores_other_stations() {
        let mut overlay = OptimisticOverlay::new();
        let other = OverlayKey::new(StationId::from("B"), SlotRef { module: 1, slot: 3 });
        overlay.insert(other.clone(), OverlayKind::Ejecting, Instant::now());

        assert!(overlay.sweep(&station(None, None)).is_empty());
        assert!(overlay.contains(&other));
    }

    #[test]
    fn clear_station_and_markers() {
        let mut overlay = OptimisticOverlay::new();
        let now = Instant::now();
        overlay.insert(key(), OverlayKind::Ejecting, now);
        overlay.insert(
            OverlayKey::new(StationId::from("A"), SlotRef { module: 1, slot: 1 }),
            OverlayKind::Pending,
            now,
        );
        overlay.insert(
            OverlayKey::new(StationId::from("B"), SlotRef { module: 2, slot: 1 }),
            OverlayKind::Pending,
            now,
        );

        let markers = overlay.markers();
        assert_eq!(markers.len(), 3);
        assert_eq!((markers[0].module, markers[0].slot), (1, 1));
        assert_eq!(markers[2].station, StationId::from("B"));

        assert_eq!(overlay.clear_station(&StationId::from("A")), 2);
        assert_eq!(overlay.len(), 1);
    }
}
