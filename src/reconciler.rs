//! Ordered-list reconciliation between backend snapshots and live rows.
//!
//! Reconciliation is identity-keyed: a snapshot record whose id matches a
//! live cached row reuses that row (updating its backing record in place),
//! everything else is constructed exactly once, and ids that left the
//! snapshot are destroyed. Order changes alone produce position moves with
//! zero construction or destruction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, warn};

use crate::{
    item_cache::ItemCache,
    protocol::TrackRecord,
    track_row::{RowFactory, TrackRow},
};

/// One surviving row whose list index changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMove {
    pub id: String,
    pub from_index: usize,
    pub to_index: usize,
}

/// Outcome of one reconciliation pass.
pub struct ReconcilePlan {
    /// Rows in display order. This vector carries the strong ownership of
    /// every live row.
    pub rows: Vec<Arc<TrackRow>>,
    /// Explicit empty-collection signal for the rendering layer.
    pub is_empty: bool,
    /// Ids constructed during this pass, in display order.
    pub constructed: Vec<String>,
    /// Ids destroyed during this pass.
    pub removed: Vec<String>,
    /// Surviving rows whose index changed.
    pub moves: Vec<RowMove>,
}

pub struct ReconciliationEngine {
    cache: ItemCache,
    previous_order: Vec<String>,
    factory: Arc<dyn RowFactory>,
}

impl ReconciliationEngine {
    pub fn new(factory: Arc<dyn RowFactory>) -> Self {
        ReconciliationEngine {
            cache: ItemCache::new(),
            previous_order: Vec::new(),
            factory,
        }
    }

    /// Diffs `snapshot` against the cached view. Must run on the UI-thread
    /// context (single-writer over the cache).
    pub fn reconcile(&mut self, snapshot: &[TrackRecord]) -> ReconcilePlan {
        let deduped = dedupe_last_wins(snapshot);

        let mut rows = Vec::with_capacity(deduped.len());
        let mut new_order = Vec::with_capacity(deduped.len());
        let mut constructed = Vec::new();
        for record in &deduped {
            let row = match self.cache.live(&record.id) {
                Some(existing) => {
                    existing.update_record(record);
                    existing
                }
                None => {
                    let built = match self.factory.build(record) {
                        Ok(row) => row,
                        Err(error) => {
                            warn!(
                                "Failed to build row for record '{}': {}. Substituting placeholder",
                                record.id, error
                            );
                            self.factory.build_error(&record.id, &error)
                        }
                    };
                    self.cache.insert(&record.id, &built);
                    constructed.push(record.id.clone());
                    built
                }
            };
            new_order.push(record.id.clone());
            rows.push(row);
        }

        let new_ids: HashSet<&str> = new_order.iter().map(String::as_str).collect();
        let mut removed = Vec::new();
        for id in &self.previous_order {
            if new_ids.contains(id.as_str()) {
                continue;
            }
            if let Some(row) = self.cache.live(id) {
                row.destroy();
            }
            self.cache.remove(id);
            removed.push(id.clone());
        }

        let old_index: HashMap<&str, usize> = self
            .previous_order
            .iter()
            .enumerate()
            .map(|(index, id)| (id.as_str(), index))
            .collect();
        let moves: Vec<RowMove> = new_order
            .iter()
            .enumerate()
            .filter_map(|(to_index, id)| match old_index.get(id.as_str()) {
                Some(&from_index) if from_index != to_index => Some(RowMove {
                    id: id.clone(),
                    from_index,
                    to_index,
                }),
                _ => None,
            })
            .collect();

        self.cache.prune_expired();
        self.previous_order = new_order;
        debug!(
            "Reconciled snapshot: {} row(s), {} constructed, {} removed, {} moved",
            rows.len(),
            constructed.len(),
            removed.len(),
            moves.len()
        );
        ReconcilePlan {
            is_empty: rows.is_empty(),
            rows,
            constructed,
            removed,
            moves,
        }
    }

    /// Whether the last reconciled snapshot was empty.
    pub fn is_empty(&self) -> bool {
        self.previous_order.is_empty()
    }
}

/// Duplicate identities in one snapshot: the last occurrence wins, earlier
/// ones are treated as already superseded.
fn dedupe_last_wins(snapshot: &[TrackRecord]) -> Vec<TrackRecord> {
    let mut last_index: HashMap<&str, usize> = HashMap::new();
    for (index, record) in snapshot.iter().enumerate() {
        if last_index.insert(record.id.as_str(), index).is_some() {
            warn!(
                "Snapshot contains duplicate id '{}', keeping last occurrence",
                record.id
            );
        }
    }
    snapshot
        .iter()
        .enumerate()
        .filter(|(index, record)| last_index[record.id.as_str()] == *index)
        .map(|(_, record)| record.clone())
        .collect()
}
