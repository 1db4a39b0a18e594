//! Invalidation Module
//!
//! Applies out-of-band change notifications to a record store. Records are
//! dropped, never updated in place: an event only proves the cached value is
//! stale, it does not carry the new one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::stats::NearCacheStats;
use crate::cache::store::{InvalidateOutcome, RecordStore};
use crate::cache::{NearCacheKey, NearCacheValue};

// == Invalidation Event ==
/// A change notification from the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InvalidationEvent<K> {
    /// One key changed
    Single { key: K, sequence: u64 },
    /// Several keys changed under the same sequence
    Batch { keys: Vec<K>, sequence: u64 },
    /// Everything is stale, e.g. after a topology change or a remote clear
    All { sequence: u64 },
}

impl<K> InvalidationEvent<K> {
    pub fn sequence(&self) -> u64 {
        match self {
            InvalidationEvent::Single { sequence, .. }
            | InvalidationEvent::Batch { sequence, .. }
            | InvalidationEvent::All { sequence } => *sequence,
        }
    }
}

// == Invalidation Report ==
/// What applying one event did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// Records dropped
    pub removed: usize,
    /// Keys whose event was older than what they already carry
    pub stale: usize,
    /// Whether the whole store was cleared
    pub cleared: bool,
}

// == Invalidation Applier ==
/// Routes invalidation events to the record store's public operations.
pub struct InvalidationApplier<K, V> {
    store: Arc<RecordStore<K, V>>,
    stats: Arc<NearCacheStats>,
}

impl<K: NearCacheKey, V: NearCacheValue> InvalidationApplier<K, V> {
    pub fn new(store: Arc<RecordStore<K, V>>, stats: Arc<NearCacheStats>) -> Self {
        Self { store, stats }
    }

    // == Apply ==
    /// Applies one event.
    ///
    /// Per key, events older than or equal to the stored sequence are
    /// ignored; removals are idempotent so redelivery is harmless.
    pub fn apply(&self, event: &InvalidationEvent<K>) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        match event {
            InvalidationEvent::Single { key, sequence } => {
                self.apply_key(key, *sequence, &mut report);
            }
            InvalidationEvent::Batch { keys, sequence } => {
                for key in keys {
                    self.apply_key(key, *sequence, &mut report);
                }
            }
            InvalidationEvent::All { sequence } => {
                debug!(sequence, "Clearing near cache on invalidate-all event");
                self.store.clear();
                self.stats.record_invalidation();
                report.cleared = true;
            }
        }
        report
    }

    /// Applies events in order and sums their reports.
    pub fn apply_all<'a, I>(&self, events: I) -> InvalidationReport
    where
        I: IntoIterator<Item = &'a InvalidationEvent<K>>,
    {
        events
            .into_iter()
            .fold(InvalidationReport::default(), |mut total, event| {
                let report = self.apply(event);
                total.removed += report.removed;
                total.stale += report.stale;
                total.cleared |= report.cleared;
                total
            })
    }

    fn apply_key(&self, key: &K, sequence: u64, report: &mut InvalidationReport) {
        match self.store.invalidate(key, sequence) {
            InvalidateOutcome::Removed => {
                self.stats.record_invalidation();
                report.removed += 1;
            }
            InvalidateOutcome::Absent => {}
            InvalidateOutcome::Stale => {
                self.stats.record_stale_rejection();
                report.stale += 1;
            }
        }
    }
}
