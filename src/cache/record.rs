//! Record Module
//!
//! Defines a single near cache record: the stored payload plus the access
//! metadata used by eviction, expiration and invalidation ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::InMemoryFormat;
use crate::error::{NearCacheError, Result};

// == Cached Value ==
/// What a lookup finds for a present key.
///
/// `Null` is the negative-caching sentinel: the remote source reported the key
/// as not found. It is distinct from a miss, which is `Option::None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue<V> {
    Value(V),
    Null,
}

impl<V> CachedValue<V> {
    pub fn is_null(&self) -> bool {
        matches!(self, CachedValue::Null)
    }

    /// Converts into the plain value, mapping the sentinel to `None`.
    pub fn into_value(self) -> Option<V> {
        match self {
            CachedValue::Value(v) => Some(v),
            CachedValue::Null => None,
        }
    }
}

// == Payload ==
/// Stored form of a value, depending on the in-memory format.
#[derive(Debug)]
pub(crate) enum Payload<V> {
    Object(V),
    Binary(Vec<u8>),
    Null,
}

impl<V> Payload<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    pub(crate) fn encode(value: CachedValue<V>, format: InMemoryFormat) -> Result<Self> {
        match (value, format) {
            (CachedValue::Null, _) => Ok(Payload::Null),
            (CachedValue::Value(v), InMemoryFormat::Object) => Ok(Payload::Object(v)),
            (CachedValue::Value(v), InMemoryFormat::Binary) => {
                Ok(Payload::Binary(serde_json::to_vec(&v)?))
            }
            (CachedValue::Value(_), InMemoryFormat::Native) => Err(NearCacheError::Configuration(
                "NATIVE in-memory format is not supported".to_string(),
            )),
        }
    }

    pub(crate) fn decode(&self) -> Result<CachedValue<V>> {
        match self {
            Payload::Object(v) => Ok(CachedValue::Value(v.clone())),
            Payload::Binary(bytes) => Ok(CachedValue::Value(serde_json::from_slice(bytes)?)),
            Payload::Null => Ok(CachedValue::Null),
        }
    }

    fn heap_bytes(&self) -> usize {
        match self {
            Payload::Binary(bytes) => bytes.len(),
            Payload::Object(_) | Payload::Null => 0,
        }
    }
}

// == Record ==
/// A single cached entry.
///
/// Access metadata are atomics so a lookup can refresh them while holding
/// only a shared lock on its shard.
#[derive(Debug)]
pub struct Record<V> {
    payload: Payload<V>,
    /// Creation timestamp (Unix milliseconds)
    created_at: u64,
    /// Last read timestamp (Unix milliseconds)
    last_accessed_at: AtomicU64,
    /// Logical clock value of the last access, orders LRU exactly
    access_stamp: AtomicU64,
    /// Number of reads, drives LFU
    hits: AtomicU64,
    /// Invalidation sequence the value was tagged with
    sequence: u64,
    /// Estimated memory cost in bytes
    cost: usize,
}

impl<V> Record<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    pub(crate) fn new(payload: Payload<V>, sequence: u64, stamp: u64) -> Self {
        let now = current_timestamp_ms();
        let cost = std::mem::size_of::<Self>() + payload.heap_bytes();
        Self {
            payload,
            created_at: now,
            last_accessed_at: AtomicU64::new(now),
            access_stamp: AtomicU64::new(stamp),
            hits: AtomicU64::new(0),
            sequence,
            cost,
        }
    }

    pub(crate) fn value(&self) -> Result<CachedValue<V>> {
        self.payload.decode()
    }

    /// Marks the record as read at `stamp`.
    pub(crate) fn touch(&self, stamp: u64) {
        self.last_accessed_at
            .store(current_timestamp_ms(), Ordering::Relaxed);
        self.access_stamp.store(stamp, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Is Expired ==
    /// Checks time-to-live against `created_at` and max-idle against
    /// `last_accessed_at`, both at `now` (Unix milliseconds).
    ///
    /// A record is expired once the full duration has elapsed (`>=`).
    pub fn is_expired_at(
        &self,
        now: u64,
        time_to_live: Option<Duration>,
        max_idle: Option<Duration>,
    ) -> bool {
        let ttl_expired = time_to_live
            .map(|ttl| now.saturating_sub(self.created_at) >= ttl.as_millis() as u64)
            .unwrap_or(false);
        let idle_expired = max_idle
            .map(|idle| now.saturating_sub(self.last_accessed_at()) >= idle.as_millis() as u64)
            .unwrap_or(false);
        ttl_expired || idle_expired
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> u64 {
        self.last_accessed_at.load(Ordering::Relaxed)
    }

    pub fn access_stamp(&self) -> u64 {
        self.access_stamp.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn cost(&self) -> usize {
        self.cost
    }

    pub fn is_null(&self) -> bool {
        matches!(self.payload, Payload::Null)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
