//! Data Adapter Module
//!
//! Boundary to the remote data source. The near cache never talks to the
//! remote side itself; callers and the preloader fetch through an adapter.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;
use thiserror::Error;

/// Failure reported by a data adapter for one fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch failed: {0}")]
pub struct AdapterError(pub String);

// == Data Adapter ==
/// Fetches values from the remote source.
///
/// `Ok(None)` means the remote source does not hold the key. Calls may block
/// on network I/O and are expected off the request path.
pub trait DataAdapter<K, V>: Send + Sync {
    fn fetch(&self, key: &K) -> Result<Option<V>, AdapterError>;
}

// == Map Adapter ==
/// In-memory data source, used as a stand-in for a remote map.
#[derive(Debug)]
pub struct MapAdapter<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> MapAdapter<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.entries.write().insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K: Eq + Hash, V> Default for MapAdapter<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for MapAdapter<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl<K, V> DataAdapter<K, V> for MapAdapter<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn fetch(&self, key: &K) -> Result<Option<V>, AdapterError> {
        Ok(self.entries.read().get(key).cloned())
    }
}
