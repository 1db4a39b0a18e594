//! Error types for the near cache
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Near Cache Error Enum ==
/// Unified error type for the near cache.
///
/// Misses are not errors: lookups return `Option::None`. Stale updates are
/// silently rejected and only show up in statistics.
#[derive(Error, Debug)]
pub enum NearCacheError {
    /// Invalid configuration, or a component that is not present
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The near cache was destroyed
    #[error("Near cache destroyed: {0}")]
    Destroyed(String),

    /// Preloader file could not be read or written
    #[error("Persistence failure on {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key or value could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The data adapter failed to fetch a key
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// Key is not held by the near cache
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Malformed management request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Background work could not be scheduled
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl NearCacheError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NearCacheError::Persistence {
            path: path.into(),
            source,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for NearCacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            NearCacheError::Configuration(_) => StatusCode::BAD_REQUEST,
            NearCacheError::Destroyed(_) => StatusCode::GONE,
            NearCacheError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            NearCacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            NearCacheError::Adapter(_) => StatusCode::BAD_GATEWAY,
            NearCacheError::KeyNotFound(_) => StatusCode::NOT_FOUND,
            NearCacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            NearCacheError::Runtime(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the near cache.
pub type Result<T> = std::result::Result<T, NearCacheError>;
