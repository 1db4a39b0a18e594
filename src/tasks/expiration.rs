//! Expiration Sweep Task
//!
//! Background task that periodically removes expired near cache records.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::{NearCacheKey, NearCacheValue, RecordStore};

/// Spawns a background task that sweeps expired records.
///
/// The first sweep runs after `initial_delay`, then every `interval`. The
/// task runs until its handle is aborted, which
/// [`NearCache::destroy`](crate::cache::NearCache::destroy) does.
///
/// # Example
/// ```ignore
/// let handle = spawn_expiration_task(store.clone(), Duration::from_secs(5), Duration::from_secs(5));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_expiration_task<K, V>(
    store: Arc<RecordStore<K, V>>,
    initial_delay: Duration,
    interval: Duration,
) -> JoinHandle<()>
where
    K: NearCacheKey,
    V: NearCacheValue,
{
    tokio::spawn(async move {
        info!(
            "Starting expiration task: initial delay {:?}, interval {:?}",
            initial_delay, interval
        );

        let mut ticker = interval_at(Instant::now() + initial_delay, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let removed = store.sweep_expired();

            if removed > 0 {
                info!("Expiration sweep: removed {} expired records", removed);
            } else {
                debug!("Expiration sweep: no expired records found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachedValue, NearCacheStats};
    use crate::config::NearCacheConfig;

    fn store(ttl: Duration) -> Arc<RecordStore<String, String>> {
        let config = NearCacheConfig::default().with_time_to_live(ttl);
        Arc::new(RecordStore::new(&config, Arc::new(NearCacheStats::new())).unwrap())
    }

    #[tokio::test]
    async fn test_expiration_task_removes_expired_records() {
        let store = store(Duration::from_millis(100));
        store
            .put(
                "expire_soon".to_string(),
                CachedValue::Value("value".to_string()),
                0,
            )
            .unwrap();

        let handle = spawn_expiration_task(
            store.clone(),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(store.size(), 0, "Expired record should have been swept");
        handle.abort();
    }

    #[tokio::test]
    async fn test_expiration_task_preserves_live_records() {
        let store = store(Duration::from_secs(3600));
        store
            .put(
                "long_lived".to_string(),
                CachedValue::Value("value".to_string()),
                0,
            )
            .unwrap();

        let handle = spawn_expiration_task(
            store.clone(),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            store.get(&"long_lived".to_string()),
            Some(CachedValue::Value("value".to_string()))
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_expiration_task_can_be_aborted() {
        let handle = spawn_expiration_task(
            store(Duration::from_secs(1)),
            Duration::from_secs(5),
            Duration::from_secs(5),
        );

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
