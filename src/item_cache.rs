//! Identity-keyed weak index over constructed rows.
//!
//! The cache never owns rows: the rendered list holds the strong
//! references, and a cache entry whose row was released upgrades to `None`
//! so the next reconciliation transparently constructs a fresh one.
//! Single-writer discipline: the map is only touched from the UI-thread
//! context, so no interior lock is needed in the reconciliation hot path.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use crate::track_row::TrackRow;

#[derive(Default)]
pub struct ItemCache {
    entries: HashMap<String, Weak<TrackRow>>,
}

impl ItemCache {
    pub fn new() -> Self {
        ItemCache::default()
    }

    /// Upgrades the entry for `id`, returning the live row if its strong
    /// owner still exists. A stale entry is not an error; it simply reports
    /// no live row.
    pub fn live(&self, id: &str) -> Option<Arc<TrackRow>> {
        self.entries.get(id).and_then(Weak::upgrade)
    }

    /// Registers a weak entry for `id`, replacing any previous one.
    pub fn insert(&mut self, id: &str, row: &Arc<TrackRow>) {
        self.entries.insert(id.to_string(), Arc::downgrade(row));
    }

    pub fn remove(&mut self, id: &str) {
        self.entries.remove(id);
    }

    /// Drops entries whose rows have been released. Returns how many were
    /// pruned.
    pub fn prune_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.strong_count() > 0);
        before - self.entries.len()
    }

    pub fn live_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }
}
