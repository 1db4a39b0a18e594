//! Near Cache Facade
//!
//! Public contract of the near cache. Composes the record store, the
//! invalidation applier, the preloader and the statistics collector, and
//! owns the background tasks that serve them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::adapter::DataAdapter;
use crate::cache::invalidation::{InvalidationApplier, InvalidationEvent, InvalidationReport};
use crate::cache::preloader::Preloader;
use crate::cache::record::CachedValue;
use crate::cache::stats::{NearCacheStats, StatsSnapshot};
use crate::cache::store::{PutOutcome, RecordStore};
use crate::cache::{NearCacheKey, NearCacheValue};
use crate::config::{InMemoryFormat, NearCacheConfig, PreloaderConfig};
use crate::error::{NearCacheError, Result};
use crate::tasks::{spawn_expiration_task, spawn_key_store_task};

// == Select To Save ==
/// Picks the value to cache from candidates produced by racing or fallback
/// reads, ordered oldest to newest.
///
/// The newest non-null candidate wins. When every candidate is null the
/// NULL sentinel is returned if negative caching is enabled, otherwise
/// nothing should be saved. An empty candidate list saves nothing.
pub fn select_to_save<V: Clone>(
    candidates: &[Option<V>],
    cache_null_values: bool,
) -> Option<CachedValue<V>> {
    if candidates.is_empty() {
        return None;
    }
    match candidates.iter().rev().find_map(|candidate| candidate.as_ref()) {
        Some(value) => Some(CachedValue::Value(value.clone())),
        None if cache_null_values => Some(CachedValue::Null),
        None => None,
    }
}

// == Components ==
/// Internal components reachable through [`NearCache::unwrap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    RecordStore,
    Stats,
    InvalidationApplier,
    Preloader,
}

/// Borrowed internal component.
pub enum ComponentRef<'a, K, V> {
    RecordStore(&'a Arc<RecordStore<K, V>>),
    Stats(&'a Arc<NearCacheStats>),
    InvalidationApplier(&'a InvalidationApplier<K, V>),
    Preloader(&'a Arc<Preloader<K, V>>),
}

impl<'a, K, V> ComponentRef<'a, K, V> {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentRef::RecordStore(_) => ComponentKind::RecordStore,
            ComponentRef::Stats(_) => ComponentKind::Stats,
            ComponentRef::InvalidationApplier(_) => ComponentKind::InvalidationApplier,
            ComponentRef::Preloader(_) => ComponentKind::Preloader,
        }
    }

    pub fn as_record_store(&self) -> Option<&'a Arc<RecordStore<K, V>>> {
        match self {
            ComponentRef::RecordStore(store) => Some(*store),
            _ => None,
        }
    }

    pub fn as_stats(&self) -> Option<&'a Arc<NearCacheStats>> {
        match self {
            ComponentRef::Stats(stats) => Some(*stats),
            _ => None,
        }
    }

    pub fn as_preloader(&self) -> Option<&'a Arc<Preloader<K, V>>> {
        match self {
            ComponentRef::Preloader(preloader) => Some(*preloader),
            _ => None,
        }
    }
}

// == Near Cache ==
/// Client-side cache in front of a remote key-value source.
///
/// Operations never block on the network. Misses are returned as `None`;
/// the caller fetches through its adapter and puts the result back, tagged
/// with [`NearCache::known_sequence`] read before the fetch.
///
/// After [`NearCache::destroy`] every operation fails with
/// [`NearCacheError::Destroyed`].
pub struct NearCache<K, V> {
    config: NearCacheConfig,
    store: Arc<RecordStore<K, V>>,
    stats: Arc<NearCacheStats>,
    applier: Option<InvalidationApplier<K, V>>,
    preloader: Option<Arc<Preloader<K, V>>>,
    destroyed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<K: NearCacheKey, V: NearCacheValue> NearCache<K, V> {
    // == Constructor ==
    /// Builds a near cache from a configuration snapshot.
    ///
    /// No background work starts until [`NearCache::initialize`].
    pub fn new(config: NearCacheConfig) -> Result<Self> {
        let stats = Arc::new(NearCacheStats::new());
        let store = Arc::new(RecordStore::new(&config, stats.clone())?);

        let applier = config
            .invalidate_on_change
            .then(|| InvalidationApplier::new(store.clone(), stats.clone()));
        let preloader = config.preloader.enabled.then(|| {
            Arc::new(Preloader::new(
                store.clone(),
                stats.clone(),
                config.preloader.clone(),
                config.cache_null_values,
            ))
        });

        info!(
            name = %config.name,
            format = ?config.in_memory_format,
            max_entries = config.max_entries,
            policy = ?config.eviction_policy,
            invalidate_on_change = config.invalidate_on_change,
            preload = config.preloader.enabled,
            "Near cache created"
        );

        Ok(Self {
            config,
            store,
            stats,
            applier,
            preloader,
            destroyed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    // == Initialize ==
    /// Starts the expiration sweep and, with preloading enabled, the
    /// periodic key store on the current tokio runtime.
    ///
    /// Calling it again is a no-op.
    pub fn initialize(&self) -> Result<()> {
        self.ensure_active()?;
        tokio::runtime::Handle::try_current()
            .map_err(|e| NearCacheError::Runtime(e.to_string()))?;

        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return Ok(());
        }
        tasks.push(spawn_expiration_task(
            self.store.clone(),
            self.config.expiration_initial_delay,
            self.config.expiration_interval,
        ));
        if let Some(preloader) = &self.preloader {
            tasks.push(spawn_key_store_task(
                preloader.clone(),
                self.config.preloader.store_initial_delay,
                self.config.preloader.store_interval,
            ));
        }
        debug!(name = %self.config.name, tasks = tasks.len(), "Background tasks started");
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(NearCacheError::Destroyed(self.config.name.clone()));
        }
        Ok(())
    }

    // == Get ==
    /// Returns the cached value, the NULL sentinel for a cached negative
    /// lookup, or `None` on a miss.
    pub fn get(&self, key: &K) -> Result<Option<CachedValue<V>>> {
        self.ensure_active()?;
        Ok(self.store.get(key))
    }

    // == Put ==
    /// Caches `value` for `key`, tagged with `sequence`.
    pub fn put(&self, key: K, value: CachedValue<V>, sequence: u64) -> Result<PutOutcome> {
        self.ensure_active()?;
        self.store.put(key, value, sequence)
    }

    // == Remove ==
    pub fn remove(&self, key: &K) -> Result<bool> {
        self.ensure_active()?;
        Ok(self.store.remove(key))
    }

    // == Clear ==
    pub fn clear(&self) -> Result<()> {
        self.ensure_active()?;
        self.store.clear();
        Ok(())
    }

    // == Size ==
    /// Number of records held, including expired records not yet swept.
    pub fn size(&self) -> Result<usize> {
        self.ensure_active()?;
        Ok(self.store.size())
    }

    /// Sequence a read-through fetch for `key` should be tagged with.
    pub fn known_sequence(&self, key: &K) -> Result<u64> {
        self.ensure_active()?;
        Ok(self.store.known_sequence(key))
    }

    // == Invalidate ==
    /// Applies an invalidation event.
    ///
    /// Fails with a configuration error when the cache does not invalidate
    /// on change.
    pub fn invalidate(&self, event: &InvalidationEvent<K>) -> Result<InvalidationReport> {
        self.ensure_active()?;
        match &self.applier {
            Some(applier) => Ok(applier.apply(event)),
            None => Err(NearCacheError::Configuration(format!(
                "near cache '{}' does not invalidate on change",
                self.config.name
            ))),
        }
    }

    pub fn select_to_save(&self, candidates: &[Option<V>]) -> Option<CachedValue<V>> {
        select_to_save(candidates, self.config.cache_null_values)
    }

    // == Unwrap ==
    /// Exposes an internal component for management use.
    ///
    /// Fails with a configuration error when the component is not part of
    /// this cache (no applier without invalidate-on-change, no preloader
    /// without preloading).
    pub fn unwrap(&self, kind: ComponentKind) -> Result<ComponentRef<'_, K, V>> {
        self.ensure_active()?;
        let component = match kind {
            ComponentKind::RecordStore => Some(ComponentRef::RecordStore(&self.store)),
            ComponentKind::Stats => Some(ComponentRef::Stats(&self.stats)),
            ComponentKind::InvalidationApplier => {
                self.applier.as_ref().map(ComponentRef::InvalidationApplier)
            }
            ComponentKind::Preloader => self.preloader.as_ref().map(ComponentRef::Preloader),
        };
        component.ok_or_else(|| {
            NearCacheError::Configuration(format!(
                "near cache '{}' has no {:?} component",
                self.config.name, kind
            ))
        })
    }

    // == Preloading ==
    /// Runs the preload pass on the calling thread.
    ///
    /// A no-op returning 0 when preloading is disabled.
    pub fn preload(&self, adapter: &dyn DataAdapter<K, V>) -> Result<usize> {
        self.ensure_active()?;
        match &self.preloader {
            Some(preloader) => preloader.preload(adapter),
            None => Ok(0),
        }
    }

    /// Runs the preload pass on tokio's blocking pool.
    pub fn spawn_preload(
        &self,
        adapter: Arc<dyn DataAdapter<K, V>>,
    ) -> Result<JoinHandle<Result<usize>>> {
        self.ensure_active()?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| NearCacheError::Runtime(e.to_string()))?;
        let preloader = self.preloader.clone();
        Ok(handle.spawn_blocking(move || match preloader {
            Some(preloader) => preloader.preload(adapter.as_ref()),
            None => Ok(0),
        }))
    }

    /// Persists the current key set. A no-op returning 0 when preloading is
    /// disabled.
    pub fn store_keys(&self) -> Result<usize> {
        self.ensure_active()?;
        match &self.preloader {
            Some(preloader) => preloader.store_keys(),
            None => Ok(0),
        }
    }

    /// `true` once preloading finished; always `true` when it is disabled.
    pub fn is_preload_done(&self) -> bool {
        self.preloader
            .as_ref()
            .map(|p| p.is_preload_done())
            .unwrap_or(true)
    }

    // == Accessors ==
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &NearCacheConfig {
        &self.config
    }

    pub fn in_memory_format(&self) -> InMemoryFormat {
        self.config.in_memory_format
    }

    pub fn preloader_config(&self) -> &PreloaderConfig {
        &self.config.preloader
    }

    pub fn is_invalidated_on_change(&self) -> bool {
        self.config.invalidate_on_change
    }

    pub fn stats(&self) -> Result<StatsSnapshot> {
        self.ensure_active()?;
        Ok(self.stats.snapshot())
    }

    // == Destroy ==
    /// Stops background work, cancels preloading and clears the store.
    ///
    /// Idempotent; every other operation fails afterwards.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(preloader) = &self.preloader {
            preloader.cancel();
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.store.clear();
        info!(name = %self.config.name, "Near cache destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl<K, V> Drop for NearCache<K, V> {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
