//! Key Store Task
//!
//! Background task that periodically persists the near cache key set.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::cache::{NearCacheKey, NearCacheValue, Preloader};

/// Spawns a background task calling [`Preloader::store_keys`] every
/// `interval` after `initial_delay`.
///
/// File I/O runs on the blocking pool. Failures are logged and retried on
/// the next tick; they are also visible in the persistence statistics.
pub fn spawn_key_store_task<K, V>(
    preloader: Arc<Preloader<K, V>>,
    initial_delay: Duration,
    interval: Duration,
) -> JoinHandle<()>
where
    K: NearCacheKey,
    V: NearCacheValue,
{
    tokio::spawn(async move {
        info!(
            "Starting key store task: initial delay {:?}, interval {:?}",
            initial_delay, interval
        );

        let mut ticker = interval_at(Instant::now() + initial_delay, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let preloader = preloader.clone();
            match tokio::task::spawn_blocking(move || preloader.store_keys()).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => warn!("Periodic key store failed: {}", err),
                Err(err) => warn!("Key store worker panicked: {}", err),
            }
        }
    })
}
