//! Response DTOs for the management API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CachedValue, PreloadState, PutOutcome, StatsSnapshot};

/// Where a looked-up value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSource {
    NearCache,
    Remote,
}

/// Response body for GET /cache/:key and GET /cache/:key/through
#[derive(Debug, Clone, Serialize)]
pub struct LookupResponse {
    pub key: String,
    /// `null` when the key is known to be absent at the source
    pub value: Option<String>,
    pub source: LookupSource,
}

impl LookupResponse {
    /// Builds a response for a value served by the near cache.
    pub fn cached(key: impl Into<String>, value: CachedValue<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into_value(),
            source: LookupSource::NearCache,
        }
    }

    /// Builds a response for a value fetched from the source.
    pub fn fetched(key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            value,
            source: LookupSource::Remote,
        }
    }
}

/// Response body for PUT /cache/:key
#[derive(Debug, Clone, Serialize)]
pub struct PutResponse {
    pub key: String,
    /// One of `inserted`, `replaced`, `stale_rejected`, `rejected`
    pub outcome: &'static str,
}

impl PutResponse {
    pub fn new(key: impl Into<String>, outcome: PutOutcome) -> Self {
        let outcome = match outcome {
            PutOutcome::Inserted => "inserted",
            PutOutcome::Replaced => "replaced",
            PutOutcome::StaleRejected => "stale_rejected",
            PutOutcome::Rejected => "rejected",
        };
        Self {
            key: key.into(),
            outcome,
        }
    }
}

/// Response body for DELETE /cache/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub key: String,
    pub removed: bool,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, removed: bool) -> Self {
        Self {
            key: key.into(),
            removed,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub name: String,
    /// Records currently held
    pub size: usize,
    /// Estimated bytes held by records
    pub memory_cost: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

impl StatsResponse {
    pub fn new(name: impl Into<String>, size: usize, memory_cost: usize, stats: StatsSnapshot) -> Self {
        Self {
            name: name.into(),
            size,
            memory_cost,
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for GET /preloader
#[derive(Debug, Clone, Serialize)]
pub struct PreloaderResponse {
    pub enabled: bool,
    /// Absent when preloading is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PreloadState>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl PreloaderResponse {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            state: None,
            done: true,
            file_path: None,
        }
    }
}

/// Response body for POST /preloader/store-keys
#[derive(Debug, Clone, Serialize)]
pub struct StoreKeysResponse {
    pub stored: usize,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn destroyed() -> Self {
        Self {
            status: "destroyed".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
