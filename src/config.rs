//! Configuration Module
//!
//! Holds the near cache configuration snapshot and loads it from environment
//! variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;
use crate::error::{NearCacheError, Result};

/// Default expiration task initial delay in seconds
pub const DEFAULT_EXPIRATION_TASK_INITIAL_DELAY_SECS: u64 = 5;
/// Default expiration task interval in seconds
pub const DEFAULT_EXPIRATION_TASK_INTERVAL_SECS: u64 = 5;
/// Default preloader store initial delay in seconds
pub const DEFAULT_STORE_INITIAL_DELAY_SECS: u64 = 600;
/// Default preloader store interval in seconds
pub const DEFAULT_STORE_INTERVAL_SECS: u64 = 600;

// == In-Memory Format ==
/// How values are held inside the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InMemoryFormat {
    /// Values are kept as deserialized objects
    Object,
    /// Values are kept serialized and decoded on every read
    Binary,
    /// Off-heap storage; not supported by this crate
    Native,
}

impl FromStr for InMemoryFormat {
    type Err = NearCacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "object" => Ok(InMemoryFormat::Object),
            "binary" => Ok(InMemoryFormat::Binary),
            "native" => Ok(InMemoryFormat::Native),
            other => Err(NearCacheError::Configuration(format!(
                "Unknown in-memory format '{}'",
                other
            ))),
        }
    }
}

// == Preloader Config ==
/// Settings for persisting and restoring the key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloaderConfig {
    /// Whether keys are persisted and preloaded at all
    pub enabled: bool,
    /// File the key set is written to
    pub file_path: PathBuf,
    /// Delay before the first periodic key store
    pub store_initial_delay: Duration,
    /// Interval between periodic key stores
    pub store_interval: Duration,
}

impl PreloaderConfig {
    /// Enabled preloader writing to `file_path` with default intervals.
    pub fn enabled(file_path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            file_path: file_path.into(),
            ..Self::default()
        }
    }
}

impl Default for PreloaderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_path: PathBuf::from("near-cache-keys.json"),
            store_initial_delay: Duration::from_secs(DEFAULT_STORE_INITIAL_DELAY_SECS),
            store_interval: Duration::from_secs(DEFAULT_STORE_INTERVAL_SECS),
        }
    }
}

// == Near Cache Config ==
/// Configuration snapshot a near cache is created from.
#[derive(Debug, Clone)]
pub struct NearCacheConfig {
    /// Name of the near cache (used in logs and stats)
    pub name: String,
    /// Storage format of values
    pub in_memory_format: InMemoryFormat,
    /// Maximum number of records
    pub max_entries: usize,
    /// Optional bound on the estimated memory cost in bytes
    pub max_memory_cost: Option<usize>,
    /// Eviction policy applied when a bound is exceeded
    pub eviction_policy: EvictionPolicy,
    /// Maximum age of a record since creation
    pub time_to_live: Option<Duration>,
    /// Maximum time a record may go without being read
    pub max_idle: Option<Duration>,
    /// Whether invalidation events are applied
    pub invalidate_on_change: bool,
    /// Whether "not found" results are cached as the NULL sentinel
    pub cache_null_values: bool,
    /// Number of lock shards in the record store (power of two)
    pub shard_count: usize,
    /// Delay before the first expiration sweep
    pub expiration_initial_delay: Duration,
    /// Interval between expiration sweeps
    pub expiration_interval: Duration,
    /// Key persistence settings
    pub preloader: PreloaderConfig,
}

impl NearCacheConfig {
    /// Creates a default config with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Creates a new config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `NEAR_CACHE_NAME` (default: `default`)
    /// - `NEAR_CACHE_IN_MEMORY_FORMAT` - `object` | `binary` (default: `object`)
    /// - `NEAR_CACHE_MAX_ENTRIES` (default: 10000)
    /// - `NEAR_CACHE_MAX_MEMORY_COST` - bytes, unset = unbounded
    /// - `NEAR_CACHE_EVICTION_POLICY` - `lru` | `lfu` | `random` | `none` (default: `lru`)
    /// - `NEAR_CACHE_TTL_SECS`, `NEAR_CACHE_MAX_IDLE_SECS` - 0 or unset disables
    /// - `NEAR_CACHE_INVALIDATE_ON_CHANGE` (default: true)
    /// - `NEAR_CACHE_CACHE_NULL_VALUES` (default: true)
    /// - `NEAR_CACHE_SHARDS` (default: 16)
    /// - `NEAR_CACHE_PRELOAD_ENABLED` (default: false)
    /// - `NEAR_CACHE_PRELOAD_FILE` (default: `near-cache-keys.json`)
    /// - `NEAR_CACHE_PRELOAD_STORE_DELAY_SECS`, `NEAR_CACHE_PRELOAD_STORE_INTERVAL_SECS` (default: 600)
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let preloader_defaults = PreloaderConfig::default();

        Self {
            name: env::var("NEAR_CACHE_NAME").unwrap_or(defaults.name),
            in_memory_format: env_parse("NEAR_CACHE_IN_MEMORY_FORMAT")
                .unwrap_or(defaults.in_memory_format),
            max_entries: env_parse("NEAR_CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            max_memory_cost: env_parse("NEAR_CACHE_MAX_MEMORY_COST"),
            eviction_policy: env_parse("NEAR_CACHE_EVICTION_POLICY")
                .unwrap_or(defaults.eviction_policy),
            time_to_live: env_parse::<u64>("NEAR_CACHE_TTL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            max_idle: env_parse::<u64>("NEAR_CACHE_MAX_IDLE_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            invalidate_on_change: env_parse("NEAR_CACHE_INVALIDATE_ON_CHANGE")
                .unwrap_or(defaults.invalidate_on_change),
            cache_null_values: env_parse("NEAR_CACHE_CACHE_NULL_VALUES")
                .unwrap_or(defaults.cache_null_values),
            shard_count: env_parse("NEAR_CACHE_SHARDS").unwrap_or(defaults.shard_count),
            expiration_initial_delay: defaults.expiration_initial_delay,
            expiration_interval: defaults.expiration_interval,
            preloader: PreloaderConfig {
                enabled: env_parse("NEAR_CACHE_PRELOAD_ENABLED")
                    .unwrap_or(preloader_defaults.enabled),
                file_path: env::var("NEAR_CACHE_PRELOAD_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(preloader_defaults.file_path),
                store_initial_delay: env_parse("NEAR_CACHE_PRELOAD_STORE_DELAY_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(preloader_defaults.store_initial_delay),
                store_interval: env_parse("NEAR_CACHE_PRELOAD_STORE_INTERVAL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(preloader_defaults.store_interval),
            },
        }
    }

    /// Checks bounds and settings, failing with a configuration error.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(NearCacheError::Configuration(
                "max_entries must be greater than zero".to_string(),
            ));
        }
        if self.max_memory_cost == Some(0) {
            return Err(NearCacheError::Configuration(
                "max_memory_cost must be greater than zero when set".to_string(),
            ));
        }
        if self.shard_count == 0 || !self.shard_count.is_power_of_two() {
            return Err(NearCacheError::Configuration(format!(
                "shard_count must be a power of two, got {}",
                self.shard_count
            )));
        }
        if self.expiration_interval.is_zero() {
            return Err(NearCacheError::Configuration(
                "expiration_interval must be greater than zero".to_string(),
            ));
        }
        if self.in_memory_format == InMemoryFormat::Native {
            return Err(NearCacheError::Configuration(
                "NATIVE in-memory format is not supported".to_string(),
            ));
        }
        if self.preloader.enabled {
            if self.preloader.file_path.as_os_str().is_empty() {
                return Err(NearCacheError::Configuration(
                    "preloader file path must not be empty".to_string(),
                ));
            }
            if self.preloader.store_interval.is_zero() {
                return Err(NearCacheError::Configuration(
                    "preloader store_interval must be greater than zero".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn with_in_memory_format(mut self, format: InMemoryFormat) -> Self {
        self.in_memory_format = format;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_memory_cost(mut self, bytes: usize) -> Self {
        self.max_memory_cost = Some(bytes);
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    pub fn with_invalidate_on_change(mut self, enabled: bool) -> Self {
        self.invalidate_on_change = enabled;
        self
    }

    pub fn with_cache_null_values(mut self, enabled: bool) -> Self {
        self.cache_null_values = enabled;
        self
    }

    pub fn with_shard_count(mut self, shards: usize) -> Self {
        self.shard_count = shards;
        self
    }

    pub fn with_expiration_schedule(mut self, initial_delay: Duration, interval: Duration) -> Self {
        self.expiration_initial_delay = initial_delay;
        self.expiration_interval = interval;
        self
    }

    pub fn with_preloader(mut self, preloader: PreloaderConfig) -> Self {
        self.preloader = preloader;
        self
    }
}

impl Default for NearCacheConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            in_memory_format: InMemoryFormat::Object,
            max_entries: 10_000,
            max_memory_cost: None,
            eviction_policy: EvictionPolicy::Lru,
            time_to_live: None,
            max_idle: None,
            invalidate_on_change: true,
            cache_null_values: true,
            shard_count: 16,
            expiration_initial_delay: Duration::from_secs(
                DEFAULT_EXPIRATION_TASK_INITIAL_DELAY_SECS,
            ),
            expiration_interval: Duration::from_secs(DEFAULT_EXPIRATION_TASK_INTERVAL_SECS),
            preloader: PreloaderConfig::default(),
        }
    }
}

// == Server Config ==
/// Settings of the management server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port
    pub server_port: u16,
    /// Optional JSON object file seeding the stand-in remote source
    pub source_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Loads `SERVER_PORT` (default: 3000) and `NEAR_CACHE_SOURCE_FILE`.
    pub fn from_env() -> Self {
        Self {
            server_port: env_parse("SERVER_PORT").unwrap_or(3000),
            source_file: env::var("NEAR_CACHE_SOURCE_FILE").ok().map(PathBuf::from),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            source_file: None,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
