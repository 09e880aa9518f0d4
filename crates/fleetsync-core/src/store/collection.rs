// ── Generic reactive entity collection ──
//
// `DashMap` storage keyed by entity id, with a `watch`-published snapshot
// sorted by key. Batched changes publish a single snapshot so subscribers
// never observe a half-applied collection snapshot.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// One mutation inside a batch.
#[derive(Debug, Clone)]
pub(crate) enum Change<T> {
    Upsert(String, T),
    Remove(String),
}

/// A reactive collection for a single entity type.
///
/// Every publishing mutation bumps a version counter and rebuilds the
/// snapshot subscribers receive.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,

    /// Version counter, bumped on every publish.
    version: watch::Sender<u64>,

    /// Full snapshot in key order.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(entity)).is_none();
        self.publish();
        is_new
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    /// Apply a batch and publish once. Returns the number of changes applied.
    pub(crate) fn apply(&self, changes: Vec<Change<T>>) -> usize {
        let mut applied = 0;
        for change in changes {
            match change {
                Change::Upsert(key, entity) => {
                    self.by_key.insert(key, Arc::new(entity));
                    applied += 1;
                }
                Change::Remove(key) => {
                    if self.by_key.remove(&key).is_some() {
                        applied += 1;
                    }
                }
            }
        }
        if applied > 0 {
            self.publish();
        }
        applied
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<Arc<T>> = entries.into_iter().map(|(_, v)| v).collect();

        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}
