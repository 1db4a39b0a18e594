//! Near Cache management server
//!
//! Runs one near cache of string keys and values in front of a stand-in
//! source and exposes it over HTTP.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use near_cache::{
    create_router, AppState, MapAdapter, NearCache, NearCacheConfig, ServerConfig,
};

/// Main entry point for the near cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Load the source map and build the near cache
/// 4. Start background tasks and the preload pass
/// 5. Serve the management API until SIGINT/SIGTERM
/// 6. Persist the key set and destroy the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "near_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Near Cache Server");

    let cache_config = NearCacheConfig::from_env();
    let server_config = ServerConfig::from_env();
    info!(
        "Configuration loaded: name={}, max_entries={}, policy={:?}, format={:?}, port={}",
        cache_config.name,
        cache_config.max_entries,
        cache_config.eviction_policy,
        cache_config.in_memory_format,
        server_config.server_port
    );

    let source = Arc::new(match &server_config.source_file {
        Some(path) => load_source(path)?,
        None => MapAdapter::new(),
    });
    info!("Source loaded with {} keys", source.len());

    let cache = Arc::new(NearCache::new(cache_config).context("invalid near cache config")?);
    cache.initialize()?;
    let preload = cache.spawn_preload(source.clone())?;
    tokio::spawn(async move {
        match preload.await {
            Ok(Ok(count)) => info!("Preload finished: {} keys loaded", count),
            Ok(Err(err)) => warn!("Preload failed: {}", err),
            Err(err) => warn!("Preload worker panicked: {}", err),
        }
    });

    let app = create_router(AppState::new(cache.clone(), source));

    let addr = SocketAddr::from(([0, 0, 0, 0], server_config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let shutdown_cache = cache.clone();
    match tokio::task::spawn_blocking(move || shutdown_cache.store_keys()).await? {
        Ok(count) => info!("Stored {} keys for the next preload", count),
        Err(err) => warn!("Final key store failed: {}", err),
    }
    cache.destroy();

    info!("Server shutdown complete");
    Ok(())
}

/// Reads a JSON object of string keys and values into the stand-in source.
fn load_source(path: &Path) -> anyhow::Result<MapAdapter<String, String>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read source file {}", path.display()))?;
    let entries: HashMap<String, String> = serde_json::from_slice(&bytes)
        .with_context(|| format!("source file {} is not a JSON object", path.display()))?;
    Ok(entries.into_iter().collect())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
