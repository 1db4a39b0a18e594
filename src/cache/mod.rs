//! Cache Module
//!
//! The near cache engine: a sharded record store with eviction and
//! expiration, the invalidation applier, the key preloader and the facade
//! composing them.

mod adapter;
mod eviction;
mod invalidation;
mod near_cache;
mod preloader;
mod record;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

use std::fmt::Debug;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

// Re-export public types
pub use adapter::{AdapterError, DataAdapter, MapAdapter};
pub use eviction::{EvictionCandidate, EvictionPolicy, EVICTION_SAMPLE_SIZE};
pub use invalidation::{InvalidationApplier, InvalidationEvent, InvalidationReport};
pub use near_cache::{select_to_save, ComponentKind, ComponentRef, NearCache};
pub use preloader::{PreloadState, Preloader, PRELOAD_FILE_MAGIC, PRELOAD_FILE_VERSION};
pub use record::{current_timestamp_ms, CachedValue, Record};
pub use stats::{NearCacheStats, PersistenceStats, StatsSnapshot};
pub use store::{
    InvalidateOutcome, KeySnapshot, PutOutcome, RecordStore, INVALIDATION_WATERMARK_RETENTION,
};

// == Key and Value Bounds ==
/// Requirements on near cache keys: hashable for sharding, serializable for
/// the preloader file.
pub trait NearCacheKey:
    Eq + Hash + Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> NearCacheKey for T where
    T: Eq + Hash + Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Requirements on near cache values: serializable for the binary in-memory
/// format.
pub trait NearCacheValue:
    Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> NearCacheValue for T where
    T: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}
