//! Preloader Module
//!
//! Persists the near cache key set and restores it at startup by fetching
//! each key through a data adapter.
//!
//! # File Layout
//! A JSON document `{"magic": .., "version": .., "keys": [..]}` holding the
//! keys in snapshot order. Every store overwrites the whole file through a
//! temporary sibling and a rename.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::adapter::DataAdapter;
use crate::cache::record::CachedValue;
use crate::cache::stats::NearCacheStats;
use crate::cache::store::{PutOutcome, RecordStore};
use crate::cache::{NearCacheKey, NearCacheValue};
use crate::config::PreloaderConfig;
use crate::error::{NearCacheError, Result};

/// Marker identifying a key file
pub const PRELOAD_FILE_MAGIC: &str = "near-cache-keys";
/// Current key file layout version
pub const PRELOAD_FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct KeyFile<K> {
    magic: String,
    version: u32,
    keys: Vec<K>,
}

// == Preload State ==
/// Lifecycle of the preload pass. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreloadState {
    NotStarted,
    InProgress,
    Done,
}

impl PreloadState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PreloadState::NotStarted,
            1 => PreloadState::InProgress,
            _ => PreloadState::Done,
        }
    }
}

// == Preloader ==
/// Stores and restores the key set of one record store.
pub struct Preloader<K, V> {
    store: Arc<RecordStore<K, V>>,
    stats: Arc<NearCacheStats>,
    config: PreloaderConfig,
    cache_null_values: bool,
    state: AtomicU8,
    cancelled: AtomicBool,
    /// Serializes concurrent key stores
    write_lock: Mutex<()>,
}

impl<K: NearCacheKey, V: NearCacheValue> Preloader<K, V> {
    pub fn new(
        store: Arc<RecordStore<K, V>>,
        stats: Arc<NearCacheStats>,
        config: PreloaderConfig,
        cache_null_values: bool,
    ) -> Self {
        Self {
            store,
            stats,
            config,
            cache_null_values,
            state: AtomicU8::new(PreloadState::NotStarted as u8),
            cancelled: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> PreloadState {
        PreloadState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_preload_done(&self) -> bool {
        self.state() == PreloadState::Done
    }

    pub fn file_path(&self) -> &Path {
        &self.config.file_path
    }

    pub fn config(&self) -> &PreloaderConfig {
        &self.config
    }

    /// Stops an in-flight preload at the next key and disables key stores.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    // == Store Keys ==
    /// Writes the current key set to the key file, replacing its contents.
    ///
    /// Keys are collected shard by shard while the store keeps serving, so
    /// the result is approximate. Skipped while a preload is still running.
    /// Returns the number of keys written.
    pub fn store_keys(&self) -> Result<usize> {
        if self.is_cancelled() {
            return Ok(0);
        }
        if self.state() == PreloadState::InProgress {
            debug!("Preload in progress, skipping key store");
            return Ok(0);
        }

        let _guard = self.write_lock.lock();
        let started = Instant::now();
        let key_file = KeyFile {
            magic: PRELOAD_FILE_MAGIC.to_string(),
            version: PRELOAD_FILE_VERSION,
            keys: self.store.keys().collect::<Vec<K>>(),
        };
        let key_count = key_file.keys.len();

        let written = serde_json::to_vec(&key_file)
            .map_err(NearCacheError::from)
            .and_then(|bytes| self.write_atomically(&bytes).map(|_| bytes.len()));

        match written {
            Ok(bytes) => {
                let elapsed = started.elapsed().as_millis() as u64;
                self.stats
                    .record_persistence_success(elapsed, key_count, bytes as u64);
                info!(
                    keys = key_count,
                    bytes,
                    path = %self.config.file_path.display(),
                    "Stored near cache keys"
                );
                Ok(key_count)
            }
            Err(err) => {
                warn!(error = %err, "Failed to store near cache keys");
                self.stats.record_persistence_failure(err.to_string());
                Err(err)
            }
        }
    }

    fn write_atomically(&self, bytes: &[u8]) -> Result<()> {
        let path = &self.config.file_path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| NearCacheError::persistence(parent, e))?;
        }
        let tmp = temporary_path(path);
        fs::write(&tmp, bytes).map_err(|e| NearCacheError::persistence(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| NearCacheError::persistence(path, e))
    }

    // == Preload ==
    /// Restores the persisted key set by fetching every key through
    /// `adapter`.
    ///
    /// Runs at most once. Fetch failures are logged, counted and skipped;
    /// keys the remote source no longer holds are cached as the NULL sentinel
    /// when negative caching is enabled. The state becomes `Done` when the
    /// pass ends, even if the key file could not be read. Returns the number
    /// of records populated.
    pub fn preload(&self, adapter: &dyn DataAdapter<K, V>) -> Result<usize> {
        let started = self.state.compare_exchange(
            PreloadState::NotStarted as u8,
            PreloadState::InProgress as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if started.is_err() {
            debug!(state = ?self.state(), "Preload already started, ignoring");
            return Ok(0);
        }

        let result = self.run_preload(adapter);
        self.state
            .store(PreloadState::Done as u8, Ordering::Release);
        result
    }

    fn run_preload(&self, adapter: &dyn DataAdapter<K, V>) -> Result<usize> {
        let keys = match self.read_keys()? {
            Some(keys) => keys,
            None => {
                info!(
                    path = %self.config.file_path.display(),
                    "No key file found, nothing to preload"
                );
                return Ok(0);
            }
        };

        let total = keys.len();
        let mut loaded = 0;
        for key in keys {
            if self.is_cancelled() {
                info!(loaded, total, "Preload cancelled");
                return Ok(loaded);
            }
            if self.store.contains_key(&key) {
                continue;
            }

            let value = match adapter.fetch(&key) {
                Ok(Some(value)) => CachedValue::Value(value),
                Ok(None) if self.cache_null_values => CachedValue::Null,
                Ok(None) => continue,
                Err(err) => {
                    warn!(key = ?key, error = %err, "Preload fetch failed, skipping key");
                    self.stats.record_preload_failure();
                    continue;
                }
            };

            let sequence = self.store.known_sequence(&key);
            match self.store.put(key, value, sequence) {
                Ok(PutOutcome::Inserted) | Ok(PutOutcome::Replaced) => {
                    self.stats.record_preloaded();
                    loaded += 1;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "Preloaded value could not be stored");
                    self.stats.record_preload_failure();
                }
            }
        }

        info!(loaded, total, "Preload finished");
        Ok(loaded)
    }

    fn read_keys(&self) -> Result<Option<Vec<K>>> {
        let path = &self.config.file_path;
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(NearCacheError::persistence(path, err)),
        };

        let key_file: KeyFile<K> = serde_json::from_slice(&bytes)?;
        if key_file.magic != PRELOAD_FILE_MAGIC || key_file.version != PRELOAD_FILE_VERSION {
            return Err(NearCacheError::persistence(
                path,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "unsupported key file (magic '{}', version {})",
                        key_file.magic, key_file.version
                    ),
                ),
            ));
        }
        Ok(Some(key_file.keys))
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::adapter::{AdapterError, MapAdapter};
    use crate::config::NearCacheConfig;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<RecordStore<String, String>>,
        stats: Arc<NearCacheStats>,
        config: PreloaderConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = PreloaderConfig::enabled(dir.path().join("keys.json"));
            let stats = Arc::new(NearCacheStats::new());
            let store =
                Arc::new(RecordStore::new(&NearCacheConfig::default(), stats.clone()).unwrap());
            Self {
                _dir: dir,
                store,
                stats,
                config,
            }
        }

        fn preloader(&self, cache_null_values: bool) -> Preloader<String, String> {
            Preloader::new(
                self.store.clone(),
                self.stats.clone(),
                self.config.clone(),
                cache_null_values,
            )
        }

        fn fresh_store(&self) -> Self {
            let stats = Arc::new(NearCacheStats::new());
            Self {
                _dir: TempDir::new().unwrap(),
                store: Arc::new(
                    RecordStore::new(&NearCacheConfig::default(), stats.clone()).unwrap(),
                ),
                stats,
                config: self.config.clone(),
            }
        }
    }

    struct FailingFor(&'static str, MapAdapter<String, String>);

    impl DataAdapter<String, String> for FailingFor {
        fn fetch(&self, key: &String) -> std::result::Result<Option<String>, AdapterError> {
            if key == self.0 {
                return Err(AdapterError("connection reset".to_string()));
            }
            self.1.fetch(key)
        }
    }

    #[test]
    fn test_store_keys_writes_file() {
        let fixture = Fixture::new();
        for key in ["a", "b", "c"] {
            fixture
                .store
                .put(key.to_string(), CachedValue::Value("v".to_string()), 0)
                .unwrap();
        }
        let preloader = fixture.preloader(true);

        assert_eq!(preloader.store_keys().unwrap(), 3);

        let raw = fs::read_to_string(preloader.file_path()).unwrap();
        assert!(raw.contains(PRELOAD_FILE_MAGIC));
        assert!(!temporary_path(preloader.file_path()).exists());
        let persistence = fixture.stats.snapshot().persistence;
        assert_eq!(persistence.persistence_count, 1);
        assert_eq!(persistence.last_persistence_key_count, 3);
    }

    #[test]
    fn test_preload_with_partial_failure() {
        let source = Fixture::new();
        for key in ["K1", "K2"] {
            source
                .store
                .put(key.to_string(), CachedValue::Value("old".to_string()), 0)
                .unwrap();
        }
        source.preloader(true).store_keys().unwrap();

        let target = source.fresh_store();
        let preloader = target.preloader(true);
        let adapter = FailingFor(
            "K2",
            [("K1".to_string(), "one".to_string())].into_iter().collect(),
        );

        assert!(!preloader.is_preload_done());
        let loaded = preloader.preload(&adapter).unwrap();

        assert_eq!(loaded, 1);
        assert!(preloader.is_preload_done());
        assert_eq!(
            target.store.get(&"K1".to_string()),
            Some(CachedValue::Value("one".to_string()))
        );
        assert_eq!(target.store.get(&"K2".to_string()), None);
        let snapshot = target.stats.snapshot();
        assert_eq!(snapshot.preloaded, 1);
        assert_eq!(snapshot.preload_failures, 1);
    }

    #[test]
    fn test_preload_caches_not_found_as_null() {
        let source = Fixture::new();
        source
            .store
            .put("gone".to_string(), CachedValue::Value("v".to_string()), 0)
            .unwrap();
        source.preloader(true).store_keys().unwrap();

        let with_nulls = source.fresh_store();
        with_nulls
            .preloader(true)
            .preload(&MapAdapter::<String, String>::new())
            .unwrap();
        assert_eq!(
            with_nulls.store.get(&"gone".to_string()),
            Some(CachedValue::Null)
        );

        let without_nulls = source.fresh_store();
        without_nulls
            .preloader(false)
            .preload(&MapAdapter::<String, String>::new())
            .unwrap();
        assert_eq!(without_nulls.store.get(&"gone".to_string()), None);
    }

    #[test]
    fn test_preload_runs_once() {
        let fixture = Fixture::new();
        fixture
            .store
            .put("k".to_string(), CachedValue::Value("v".to_string()), 0)
            .unwrap();
        fixture.preloader(true).store_keys().unwrap();
        fixture.store.clear();

        let preloader = fixture.preloader(true);
        let adapter: MapAdapter<String, String> =
            [("k".to_string(), "v".to_string())].into_iter().collect();

        assert_eq!(preloader.preload(&adapter).unwrap(), 1);
        fixture.store.clear();
        assert_eq!(preloader.preload(&adapter).unwrap(), 0);
        assert_eq!(preloader.state(), PreloadState::Done);
        assert!(fixture.store.is_empty());
    }

    #[test]
    fn test_preload_missing_file_is_done() {
        let fixture = Fixture::new();
        let preloader = fixture.preloader(true);

        assert_eq!(preloader.preload(&MapAdapter::<String, String>::new()).unwrap(), 0);
        assert!(preloader.is_preload_done());
    }

    #[test]
    fn test_preload_rejects_foreign_file() {
        let fixture = Fixture::new();
        fs::write(
            &fixture.config.file_path,
            r#"{"magic":"other","version":1,"keys":[]}"#,
        )
        .unwrap();
        let preloader = fixture.preloader(true);

        let result = preloader.preload(&MapAdapter::<String, String>::new());

        assert!(matches!(result, Err(NearCacheError::Persistence { .. })));
        assert!(preloader.is_preload_done());
    }

    #[test]
    fn test_cancelled_preload_stops() {
        let fixture = Fixture::new();
        fixture
            .store
            .put("k".to_string(), CachedValue::Value("v".to_string()), 0)
            .unwrap();
        fixture.preloader(true).store_keys().unwrap();
        fixture.store.clear();

        let preloader = fixture.preloader(true);
        preloader.cancel();
        let adapter: MapAdapter<String, String> =
            [("k".to_string(), "v".to_string())].into_iter().collect();

        assert_eq!(preloader.preload(&adapter).unwrap(), 0);
        assert!(preloader.is_preload_done());
        assert_eq!(preloader.store_keys().unwrap(), 0);
    }

    #[test]
    fn test_store_keys_reports_io_failure() {
        let fixture = Fixture::new();
        // A directory where the file should be makes the rename fail
        fs::create_dir_all(&fixture.config.file_path).unwrap();
        let preloader = fixture.preloader(true);

        let result = preloader.store_keys();

        assert!(matches!(result, Err(NearCacheError::Persistence { .. })));
        assert!(fixture
            .stats
            .snapshot()
            .persistence
            .last_persistence_failure
            .is_some());
    }
}
