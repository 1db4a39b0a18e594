//! API Routes
//!
//! Configures the Axum router with all management endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, delete_handler, get_handler, health_handler, invalidation_handler,
    preloader_handler, put_handler, read_through_handler, stats_handler, store_keys_handler,
    AppState,
};

/// Creates the management router.
///
/// # Endpoints
/// - `GET /cache/:key` - Local lookup, 404 on a miss
/// - `GET /cache/:key/through` - Lookup falling back to the source
/// - `PUT /cache/:key` - Cache a value at a sequence
/// - `DELETE /cache/:key` - Drop one key
/// - `DELETE /cache` - Drop everything
/// - `POST /invalidations` - Apply an invalidation event
/// - `GET /stats` - Near cache statistics
/// - `GET /preloader` - Preload state
/// - `POST /preloader/store-keys` - Persist the key set now
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/cache", delete(clear_handler))
        .route(
            "/cache/:key",
            get(get_handler).put(put_handler).delete(delete_handler),
        )
        .route("/cache/:key/through", get(read_through_handler))
        .route("/invalidations", post(invalidation_handler))
        .route("/stats", get(stats_handler))
        .route("/preloader", get(preloader_handler))
        .route("/preloader/store-keys", post(store_keys_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MapAdapter, NearCache};
    use crate::config::NearCacheConfig;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let cache = Arc::new(NearCache::new(NearCacheConfig::new("routes")).unwrap());
        let source: Arc<MapAdapter<String, String>> = Arc::new(MapAdapter::new());
        create_router(AppState::new(cache, source))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .uri("/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_put_endpoint() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/cache/test")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"value":"hello","sequence":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .uri("/cache/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
