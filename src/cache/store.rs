//! Record Store Module
//!
//! Sharded concurrent storage of near cache records. Owns eviction,
//! expiration and the per-key invalidation sequence guard.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::cache::eviction::{EvictionCandidate, EvictionPolicy, EVICTION_SAMPLE_SIZE};
use crate::cache::record::{current_timestamp_ms, CachedValue, Payload, Record};
use crate::cache::stats::NearCacheStats;
use crate::cache::{NearCacheKey, NearCacheValue};
use crate::config::{InMemoryFormat, NearCacheConfig};
use crate::error::Result;

/// How long an invalidation watermark outlives its record.
pub const INVALIDATION_WATERMARK_RETENTION: Duration = Duration::from_secs(60);

// == Outcomes ==
/// Result of a put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new record was created
    Inserted,
    /// An existing record was overwritten
    Replaced,
    /// The key already carries a newer sequence
    StaleRejected,
    /// The store is full and the policy does not evict
    Rejected,
}

/// Result of an invalidation of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateOutcome {
    /// The record was dropped
    Removed,
    /// No record was present; the sequence is remembered
    Absent,
    /// The event is not newer than what the key already carries
    Stale,
}

/// Highest invalidation sequence seen for a key whose record is gone.
#[derive(Debug, Clone, Copy)]
struct Watermark {
    sequence: u64,
    recorded_at: u64,
}

struct Shard<K, V> {
    records: HashMap<K, Record<V>>,
    watermarks: HashMap<K, Watermark>,
}

impl<K: NearCacheKey, V: NearCacheValue> Shard<K, V> {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            watermarks: HashMap::new(),
        }
    }

    fn known_sequence(&self, key: &K) -> u64 {
        let record_seq = self.records.get(key).map(|r| r.sequence()).unwrap_or(0);
        let mark_seq = self.watermarks.get(key).map(|w| w.sequence).unwrap_or(0);
        record_seq.max(mark_seq)
    }
}

enum Lookup<V> {
    Found(CachedValue<V>),
    Missing,
    Expired,
    Corrupt(String),
}

// == Record Store ==
/// Concurrent key to record mapping.
///
/// Keys are spread over a power-of-two number of shards, each behind its own
/// `RwLock`. Lookups take a shared lock and refresh access metadata through
/// atomics, so reads never block each other. Writers serialize per shard.
///
/// `size()` counts every record not yet removed, including records that are
/// logically expired but have not been swept or read since.
pub struct RecordStore<K, V> {
    shards: Box<[RwLock<Shard<K, V>>]>,
    shard_mask: usize,
    hasher: RandomState,
    /// Live record count
    len: AtomicUsize,
    /// Estimated memory cost of all records
    cost: AtomicUsize,
    /// Logical access clock
    clock: AtomicU64,
    /// Shard the next eviction sample starts from
    eviction_cursor: AtomicUsize,
    eviction_lock: Mutex<()>,
    stats: Arc<NearCacheStats>,
    in_memory_format: InMemoryFormat,
    max_entries: usize,
    max_memory_cost: Option<usize>,
    eviction_policy: EvictionPolicy,
    time_to_live: Option<Duration>,
    max_idle: Option<Duration>,
}

impl<K: NearCacheKey, V: NearCacheValue> RecordStore<K, V> {
    // == Constructor ==
    /// Creates an empty store from a validated configuration.
    ///
    /// Fails with a configuration error for invalid bounds.
    pub fn new(config: &NearCacheConfig, stats: Arc<NearCacheStats>) -> Result<Self> {
        config.validate()?;
        let shards = (0..config.shard_count)
            .map(|_| RwLock::new(Shard::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            shards,
            shard_mask: config.shard_count - 1,
            hasher: RandomState::new(),
            len: AtomicUsize::new(0),
            cost: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            eviction_cursor: AtomicUsize::new(0),
            eviction_lock: Mutex::new(()),
            stats,
            in_memory_format: config.in_memory_format,
            max_entries: config.max_entries,
            max_memory_cost: config.max_memory_cost,
            eviction_policy: config.eviction_policy,
            time_to_live: config.time_to_live,
            max_idle: config.max_idle,
        })
    }

    fn shard_for(&self, key: &K) -> &RwLock<Shard<K, V>> {
        let index = (self.hasher.hash_one(key) as usize) & self.shard_mask;
        &self.shards[index]
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn account(&self, entries: i64, cost: i64) {
        if entries >= 0 {
            self.len.fetch_add(entries as usize, Ordering::Relaxed);
        } else {
            self.len.fetch_sub(entries.unsigned_abs() as usize, Ordering::Relaxed);
        }
        if cost >= 0 {
            self.cost.fetch_add(cost as usize, Ordering::Relaxed);
        } else {
            self.cost.fetch_sub(cost.unsigned_abs() as usize, Ordering::Relaxed);
        }
        self.stats.adjust_owned(entries, cost);
    }

    // == Get ==
    /// Looks up a key, refreshing its access metadata on a hit.
    ///
    /// Missing and expired keys are misses. An expired record found here is
    /// removed and counted as an expiration.
    pub fn get(&self, key: &K) -> Option<CachedValue<V>> {
        let now = current_timestamp_ms();
        let lookup = {
            let shard = self.shard_for(key).read();
            match shard.records.get(key) {
                None => Lookup::Missing,
                Some(record) if record.is_expired_at(now, self.time_to_live, self.max_idle) => {
                    Lookup::Expired
                }
                Some(record) => match record.value() {
                    Ok(value) => {
                        record.touch(self.tick());
                        Lookup::Found(value)
                    }
                    Err(err) => Lookup::Corrupt(err.to_string()),
                },
            }
        };

        match lookup {
            Lookup::Found(value) => {
                self.stats.record_hit();
                Some(value)
            }
            Lookup::Missing => {
                self.stats.record_miss();
                None
            }
            Lookup::Expired => {
                let (ttl, idle) = (self.time_to_live, self.max_idle);
                if self.remove_if(key, |r| r.is_expired_at(now, ttl, idle)) {
                    self.stats.record_expirations(1);
                }
                self.stats.record_miss();
                None
            }
            Lookup::Corrupt(reason) => {
                warn!(key = ?key, %reason, "Dropping record that failed to decode");
                self.remove(key);
                self.stats.record_miss();
                None
            }
        }
    }

    // == Put ==
    /// Creates or overwrites the record for `key`.
    ///
    /// The put is rejected when the key already carries a sequence greater
    /// than `sequence`, either on its record or on the watermark left by an
    /// invalidation. Room is made before a new key is inserted, and the bound
    /// is checked again afterwards.
    pub fn put(&self, key: K, value: CachedValue<V>, sequence: u64) -> Result<PutOutcome> {
        let payload = Payload::encode(value, self.in_memory_format)?;
        let record = Record::new(payload, sequence, self.tick());
        let incoming_cost = record.cost();

        let is_new = !self.shard_for(&key).read().records.contains_key(&key);
        if is_new && self.over_bound(1, incoming_cost) {
            if !self.eviction_policy.evicts() {
                debug!(key = ?key, "Store full and eviction disabled, rejecting put");
                return Ok(PutOutcome::Rejected);
            }
            self.evict_while_over(1, incoming_cost);
        }

        let outcome = {
            let mut shard = self.shard_for(&key).write();
            let known = shard.known_sequence(&key);
            if known > sequence {
                debug!(key = ?key, known, sequence, "Rejecting stale put");
                self.stats.record_stale_rejection();
                return Ok(PutOutcome::StaleRejected);
            }
            shard.watermarks.remove(&key);
            match shard.records.insert(key, record) {
                Some(old) => {
                    self.account(0, incoming_cost as i64 - old.cost() as i64);
                    PutOutcome::Replaced
                }
                None => {
                    self.account(1, incoming_cost as i64);
                    PutOutcome::Inserted
                }
            }
        };

        self.evict_if_needed();
        Ok(outcome)
    }

    // == Remove ==
    /// Removes the record for `key`, returning whether one was present.
    pub fn remove(&self, key: &K) -> bool {
        self.remove_if(key, |_| true)
    }

    fn remove_if(&self, key: &K, predicate: impl Fn(&Record<V>) -> bool) -> bool {
        let mut shard = self.shard_for(key).write();
        match shard.records.get(key) {
            Some(record) if predicate(record) => {}
            _ => return false,
        }
        match shard.records.remove(key) {
            Some(record) => {
                self.account(-1, -(record.cost() as i64));
                true
            }
            None => false,
        }
    }

    // == Invalidate ==
    /// Drops the record for `key` if it is older than `sequence`.
    ///
    /// The sequence is remembered as a watermark so that a fetch started
    /// before this invalidation cannot put its stale value back.
    pub fn invalidate(&self, key: &K, sequence: u64) -> InvalidateOutcome {
        let mut shard = self.shard_for(key).write();
        if shard.known_sequence(key) >= sequence && shard_has_sequence(&shard, key) {
            debug!(key = ?key, sequence, "Ignoring stale invalidation");
            return InvalidateOutcome::Stale;
        }

        shard.watermarks.insert(
            key.clone(),
            Watermark {
                sequence,
                recorded_at: current_timestamp_ms(),
            },
        );
        match shard.records.remove(key) {
            Some(record) => {
                self.account(-1, -(record.cost() as i64));
                InvalidateOutcome::Removed
            }
            None => InvalidateOutcome::Absent,
        }
    }

    // == Clear ==
    /// Removes every record and watermark, shard by shard.
    ///
    /// Sized counters drop back to zero; hit/miss counters are untouched.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut shard = shard.write();
            let removed = shard.records.len() as i64;
            let cost: i64 = shard.records.values().map(|r| r.cost() as i64).sum();
            shard.records.clear();
            shard.watermarks.clear();
            self.account(-removed, -cost);
        }
    }

    // == Eviction ==
    /// Evicts records until the store is back within its bounds.
    ///
    /// Returns the number of evicted records.
    pub fn evict_if_needed(&self) -> usize {
        if !self.eviction_policy.evicts() {
            return 0;
        }
        self.evict_while_over(0, 0)
    }

    fn over_bound(&self, incoming_entries: usize, incoming_cost: usize) -> bool {
        let len = self.len.load(Ordering::Relaxed) + incoming_entries;
        if len > self.max_entries {
            return true;
        }
        match self.max_memory_cost {
            Some(max) => self.cost.load(Ordering::Relaxed) + incoming_cost > max,
            None => false,
        }
    }

    fn evict_while_over(&self, incoming_entries: usize, incoming_cost: usize) -> usize {
        let _guard = self.eviction_lock.lock();
        let mut rng = rand::thread_rng();
        let mut evicted = 0;

        while self.over_bound(incoming_entries, incoming_cost) {
            let sample = self.sample_candidates();
            let victim = match self.eviction_policy.select_victim(&sample, &mut rng) {
                Some(index) => &sample[index],
                None => break,
            };
            let stamp = victim.access_stamp;
            // Skip if the victim was touched or replaced since it was sampled
            if self.remove_if(&victim.key, |r| r.access_stamp() == stamp) {
                self.stats.record_eviction();
                evicted += 1;
                debug!(key = ?victim.key, policy = ?self.eviction_policy, "Evicted record");
            }
        }
        evicted
    }

    /// Collects up to `EVICTION_SAMPLE_SIZE` candidates, starting at a
    /// rotating shard. Stores smaller than the sample are scanned fully.
    fn sample_candidates(&self) -> Vec<EvictionCandidate<K>> {
        let shard_count = self.shards.len();
        let start = self.eviction_cursor.fetch_add(1, Ordering::Relaxed);
        let mut sample = Vec::with_capacity(EVICTION_SAMPLE_SIZE);

        for offset in 0..shard_count {
            let shard = self.shards[(start + offset) & self.shard_mask].read();
            for (key, record) in shard.records.iter() {
                if sample.len() == EVICTION_SAMPLE_SIZE {
                    return sample;
                }
                sample.push(EvictionCandidate {
                    key: key.clone(),
                    access_stamp: record.access_stamp(),
                    hits: record.hits(),
                });
            }
        }
        sample
    }

    // == Expiration Sweep ==
    /// Removes records past their time-to-live or max-idle and prunes old
    /// invalidation watermarks.
    ///
    /// Returns the number of expired records removed.
    pub fn sweep_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let check_records = self.time_to_live.is_some() || self.max_idle.is_some();
        let retention = INVALIDATION_WATERMARK_RETENTION.as_millis() as u64;
        let mut expired = 0;

        for shard in self.shards.iter() {
            let mut shard = shard.write();
            if check_records {
                let mut removed_cost = 0i64;
                let before = shard.records.len();
                let (ttl, idle) = (self.time_to_live, self.max_idle);
                shard.records.retain(|_, record| {
                    let keep = !record.is_expired_at(now, ttl, idle);
                    if !keep {
                        removed_cost += record.cost() as i64;
                    }
                    keep
                });
                let removed = before - shard.records.len();
                if removed > 0 {
                    self.account(-(removed as i64), -removed_cost);
                    expired += removed;
                }
            }
            shard
                .watermarks
                .retain(|_, mark| now.saturating_sub(mark.recorded_at) < retention);
        }

        if expired > 0 {
            self.stats.record_expirations(expired as u64);
        }
        expired
    }

    // == Keys ==
    /// Returns an approximate, point-in-time iterator over the stored keys.
    ///
    /// Shards are read one at a time as the iterator advances, so no lock is
    /// held across the whole store. Calling `keys()` again restarts the walk.
    pub fn keys(&self) -> KeySnapshot<'_, K, V> {
        KeySnapshot {
            store: self,
            next_shard: 0,
            buffer: Vec::new(),
        }
    }

    /// Highest sequence known for `key`, from its record or watermark.
    ///
    /// Read-through callers tag their fetch result with this value so that an
    /// invalidation arriving mid-fetch wins.
    pub fn known_sequence(&self, key: &K) -> u64 {
        self.shard_for(key).read().known_sequence(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.shard_for(key).read().records.contains_key(key)
    }

    /// Number of records currently held.
    pub fn size(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Estimated memory cost of all records in bytes.
    pub fn memory_cost(&self) -> usize {
        self.cost.load(Ordering::Relaxed)
    }

    pub fn in_memory_format(&self) -> InMemoryFormat {
        self.in_memory_format
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.eviction_policy
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

/// A record or watermark exists, so the stored sequence is meaningful.
fn shard_has_sequence<K: NearCacheKey, V: NearCacheValue>(shard: &Shard<K, V>, key: &K) -> bool {
    shard.records.contains_key(key) || shard.watermarks.contains_key(key)
}

// == Key Snapshot ==
/// Lazy walk over the keys of a [`RecordStore`], one shard at a time.
pub struct KeySnapshot<'a, K, V> {
    store: &'a RecordStore<K, V>,
    next_shard: usize,
    buffer: Vec<K>,
}

impl<'a, K: NearCacheKey, V: NearCacheValue> Iterator for KeySnapshot<'a, K, V> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        loop {
            if let Some(key) = self.buffer.pop() {
                return Some(key);
            }
            if self.next_shard >= self.store.shards.len() {
                return None;
            }
            let shard = self.store.shards[self.next_shard].read();
            self.buffer = shard.records.keys().cloned().collect();
            self.next_shard += 1;
        }
    }
}
