//! API Handlers
//!
//! HTTP request handlers for each management endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::debug;

use crate::cache::{
    CachedValue, ComponentKind, DataAdapter, InvalidationEvent, InvalidationReport, NearCache,
};
use crate::error::{NearCacheError, Result};
use crate::models::{
    validate_key, DeleteResponse, HealthResponse, LookupResponse, PreloaderResponse, PutRequest,
    PutResponse, StatsResponse, StoreKeysResponse,
};

/// Application state shared across all handlers.
///
/// The near cache synchronizes internally, so handlers share it through a
/// plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<NearCache<String, String>>,
    /// Source consulted on read-through misses
    pub source: Arc<dyn DataAdapter<String, String>>,
}

impl AppState {
    pub fn new(
        cache: Arc<NearCache<String, String>>,
        source: Arc<dyn DataAdapter<String, String>>,
    ) -> Self {
        Self { cache, source }
    }
}

fn check_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(msg) => Err(NearCacheError::InvalidRequest(msg)),
        None => Ok(()),
    }
}

/// Handler for GET /cache/:key
///
/// Looks the key up in the near cache only. A miss is a 404; a cached
/// negative lookup is a 200 with a `null` value.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LookupResponse>> {
    check_key(&key)?;
    match state.cache.get(&key)? {
        Some(value) => Ok(Json(LookupResponse::cached(key, value))),
        None => Err(NearCacheError::KeyNotFound(key)),
    }
}

/// Handler for GET /cache/:key/through
///
/// Serves from the near cache, falling back to the source on a miss. The
/// fetched value is put back tagged with the sequence known before the
/// fetch, so an invalidation that lands mid-fetch wins.
pub async fn read_through_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LookupResponse>> {
    check_key(&key)?;
    if let Some(value) = state.cache.get(&key)? {
        return Ok(Json(LookupResponse::cached(key, value)));
    }

    let sequence = state.cache.known_sequence(&key)?;
    let source = state.source.clone();
    let fetch_key = key.clone();
    let fetched = tokio::task::spawn_blocking(move || source.fetch(&fetch_key))
        .await
        .map_err(|e| NearCacheError::Runtime(e.to_string()))?
        .map_err(|e| NearCacheError::Adapter(e.to_string()))?;

    if let Some(to_save) = state.cache.select_to_save(std::slice::from_ref(&fetched)) {
        let outcome = state.cache.put(key.clone(), to_save, sequence)?;
        debug!(key = %key, sequence, ?outcome, "Read-through result cached");
    }

    Ok(Json(LookupResponse::fetched(key, fetched)))
}

/// Handler for PUT /cache/:key
///
/// Caches a value, or a negative lookup when `value` is `null`.
pub async fn put_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<PutRequest>,
) -> Result<Json<PutResponse>> {
    check_key(&key)?;
    let value = match req.value {
        Some(value) => CachedValue::Value(value),
        None if state.cache.config().cache_null_values => CachedValue::Null,
        None => {
            return Err(NearCacheError::InvalidRequest(
                "Null values are not cached by this near cache".to_string(),
            ))
        }
    };

    let outcome = state.cache.put(key.clone(), value, req.sequence)?;
    Ok(Json(PutResponse::new(key, outcome)))
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    check_key(&key)?;
    let removed = state.cache.remove(&key)?;
    Ok(Json(DeleteResponse::new(key, removed)))
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<DeleteResponse>> {
    state.cache.clear()?;
    Ok(Json(DeleteResponse::new("*", true)))
}

/// Handler for POST /invalidations
///
/// Applies one invalidation event received from the source.
pub async fn invalidation_handler(
    State(state): State<AppState>,
    Json(event): Json<InvalidationEvent<String>>,
) -> Result<Json<InvalidationReport>> {
    let report = state.cache.invalidate(&event)?;
    Ok(Json(report))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let snapshot = state.cache.stats()?;
    let memory_cost = state
        .cache
        .unwrap(ComponentKind::RecordStore)?
        .as_record_store()
        .map(|store| store.memory_cost())
        .unwrap_or(0);

    Ok(Json(StatsResponse::new(
        state.cache.name(),
        state.cache.size()?,
        memory_cost,
        snapshot,
    )))
}

/// Handler for GET /preloader
pub async fn preloader_handler(State(state): State<AppState>) -> Result<Json<PreloaderResponse>> {
    if !state.cache.preloader_config().enabled {
        return Ok(Json(PreloaderResponse::disabled()));
    }

    let component = state.cache.unwrap(ComponentKind::Preloader)?;
    let response = match component.as_preloader() {
        Some(preloader) => PreloaderResponse {
            enabled: true,
            state: Some(preloader.state()),
            done: preloader.is_preload_done(),
            file_path: Some(preloader.file_path().display().to_string()),
        },
        None => PreloaderResponse::disabled(),
    };
    Ok(Json(response))
}

/// Handler for POST /preloader/store-keys
///
/// Persists the key set now instead of waiting for the periodic task.
pub async fn store_keys_handler(
    State(state): State<AppState>,
) -> Result<Json<StoreKeysResponse>> {
    let cache = state.cache.clone();
    let stored = tokio::task::spawn_blocking(move || cache.store_keys())
        .await
        .map_err(|e| NearCacheError::Runtime(e.to_string()))??;
    Ok(Json(StoreKeysResponse { stored }))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    if state.cache.is_destroyed() {
        Json(HealthResponse::destroyed())
    } else {
        Json(HealthResponse::healthy())
    }
}
