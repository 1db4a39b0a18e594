//! Near Cache - A client-side cache in front of a remote key-value source
//!
//! Provides a bounded local record store with eviction and expiration,
//! sequence-ordered invalidation, key preloading across restarts and a
//! small management HTTP API.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{
    select_to_save, CachedValue, DataAdapter, InvalidationEvent, MapAdapter, NearCache,
};
pub use config::{InMemoryFormat, NearCacheConfig, PreloaderConfig, ServerConfig};
pub use error::{NearCacheError, Result};
pub use tasks::{spawn_expiration_task, spawn_key_store_task};
