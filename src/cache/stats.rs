//! Near Cache Statistics Module
//!
//! Passive counters incremented by the record store, the invalidation applier
//! and the preloader, read through serializable snapshots.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

// == Persistence Stats ==
/// Outcome of the most recent key store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PersistenceStats {
    /// Number of completed key stores
    pub persistence_count: u64,
    /// When the last key store finished
    pub last_persistence_time: Option<DateTime<Utc>>,
    /// How long the last key store took
    pub last_persistence_duration_ms: u64,
    /// Keys written by the last key store
    pub last_persistence_key_count: usize,
    /// Bytes written by the last key store
    pub last_persistence_written_bytes: u64,
    /// Error message of the last failed key store, cleared on success
    pub last_persistence_failure: Option<String>,
}

// == Near Cache Stats ==
/// Thread-safe statistics collector owned by one near cache.
#[derive(Debug)]
pub struct NearCacheStats {
    creation_time: DateTime<Utc>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
    stale_rejections: AtomicU64,
    owned_entry_count: AtomicI64,
    owned_entry_memory_cost: AtomicI64,
    preloaded: AtomicU64,
    preload_failures: AtomicU64,
    persistence: Mutex<PersistenceStats>,
}

impl NearCacheStats {
    // == Constructor ==
    /// Creates a collector with all counters at zero.
    pub fn new() -> Self {
        Self {
            creation_time: Utc::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            stale_rejections: AtomicU64::new(0),
            owned_entry_count: AtomicI64::new(0),
            owned_entry_memory_cost: AtomicI64::new(0),
            preloaded: AtomicU64::new(0),
            preload_failures: AtomicU64::new(0),
            persistence: Mutex::new(PersistenceStats::default()),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_rejection(&self) {
        self.stale_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preloaded(&self) {
        self.preloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preload_failure(&self) {
        self.preload_failures.fetch_add(1, Ordering::Relaxed);
    }

    // == Sized Counters ==
    /// Adjusts owned entry count and memory cost by signed deltas.
    pub fn adjust_owned(&self, entries: i64, cost: i64) {
        self.owned_entry_count.fetch_add(entries, Ordering::Relaxed);
        self.owned_entry_memory_cost
            .fetch_add(cost, Ordering::Relaxed);
    }

    /// Zeroes the sized counters; cumulative counters are kept.
    pub fn reset_owned(&self) {
        self.owned_entry_count.store(0, Ordering::Relaxed);
        self.owned_entry_memory_cost.store(0, Ordering::Relaxed);
    }

    // == Persistence ==
    pub fn record_persistence_success(&self, duration_ms: u64, key_count: usize, bytes: u64) {
        let mut persistence = self.persistence.lock();
        persistence.persistence_count += 1;
        persistence.last_persistence_time = Some(Utc::now());
        persistence.last_persistence_duration_ms = duration_ms;
        persistence.last_persistence_key_count = key_count;
        persistence.last_persistence_written_bytes = bytes;
        persistence.last_persistence_failure = None;
    }

    pub fn record_persistence_failure(&self, message: impl Into<String>) {
        let mut persistence = self.persistence.lock();
        persistence.last_persistence_time = Some(Utc::now());
        persistence.last_persistence_failure = Some(message.into());
    }

    // == Snapshot ==
    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            creation_time: self.creation_time,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            stale_rejections: self.stale_rejections.load(Ordering::Relaxed),
            owned_entry_count: self.owned_entry_count.load(Ordering::Relaxed).max(0) as u64,
            owned_entry_memory_cost: self.owned_entry_memory_cost.load(Ordering::Relaxed).max(0)
                as u64,
            preloaded: self.preloaded.load(Ordering::Relaxed),
            preload_failures: self.preload_failures.load(Ordering::Relaxed),
            persistence: self.persistence.lock().clone(),
        }
    }
}

impl Default for NearCacheStats {
    fn default() -> Self {
        Self::new()
    }
}

// == Stats Snapshot ==
/// Read-only copy of the near cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub creation_time: DateTime<Utc>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub stale_rejections: u64,
    pub owned_entry_count: u64,
    pub owned_entry_memory_cost: u64,
    pub preloaded: u64,
    pub preload_failures: u64,
    pub persistence: PersistenceStats,
}

impl StatsSnapshot {
    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
