//! Eviction Module
//!
//! Eviction policies and victim selection over a sample of records.

use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::NearCacheError;

/// Number of records sampled when looking for an eviction victim.
pub const EVICTION_SAMPLE_SIZE: usize = 15;

// == Eviction Policy ==
/// Policy applied when the record store exceeds its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently used
    Lru,
    /// Least frequently used
    Lfu,
    /// Any sampled record
    Random,
    /// Never evict; new keys are rejected once the store is full
    None,
}

impl FromStr for EvictionPolicy {
    type Err = NearCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "random" => Ok(EvictionPolicy::Random),
            "none" => Ok(EvictionPolicy::None),
            other => Err(NearCacheError::Configuration(format!(
                "Unknown eviction policy '{}'",
                other
            ))),
        }
    }
}

// == Eviction Candidate ==
/// Snapshot of the record metadata a policy compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate<K> {
    pub key: K,
    /// Logical clock of the last access
    pub access_stamp: u64,
    /// Read count
    pub hits: u64,
}

impl EvictionPolicy {
    // == Select Victim ==
    /// Picks the index of the record to evict from `candidates`.
    ///
    /// LRU takes the smallest access stamp. LFU takes the fewest hits and
    /// breaks ties by access stamp. Returns `None` for an empty sample or the
    /// `None` policy.
    pub fn select_victim<K, R: Rng + ?Sized>(
        &self,
        candidates: &[EvictionCandidate<K>],
        rng: &mut R,
    ) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        match self {
            EvictionPolicy::Lru => candidates
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| c.access_stamp)
                .map(|(i, _)| i),
            EvictionPolicy::Lfu => candidates
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| (c.hits, c.access_stamp))
                .map(|(i, _)| i),
            EvictionPolicy::Random => Some(rng.gen_range(0..candidates.len())),
            EvictionPolicy::None => None,
        }
    }

    pub fn evicts(&self) -> bool {
        !matches!(self, EvictionPolicy::None)
    }
}
