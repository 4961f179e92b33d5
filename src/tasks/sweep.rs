//! Expiry Sweep Task
//!
//! Background task that periodically sweeps expired cache entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::Cache;

/// Spawns a background task that sweeps the cache every `interval`.
///
/// The task holds only a weak reference and exits once the cache is
/// dropped. A tick that lands while another sweep is still running is
/// dropped rather than queued.
///
/// # Returns
/// A JoinHandle for the spawned task, aborted by [`Cache::close`].
pub fn spawn_sweep_task(cache: Weak<Cache>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting cache sweep task"
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let Some(cache) = cache.upgrade() else {
                debug!("cache dropped, sweep task exiting");
                break;
            };

            match cache.sweep().await {
                Some(report) if report.expired + report.evicted > 0 => {
                    info!(
                        expired = report.expired,
                        evicted = report.evicted,
                        "cache sweep removed entries"
                    );
                }
                Some(_) => debug!("cache sweep: nothing to remove"),
                None => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cache::{Cache, CacheConfig, CacheKey, SetOptions};
    use crate::storage::MemoryStore;

    fn config(interval_ms: u64) -> CacheConfig {
        CacheConfig::new().with_cleanup_interval(Duration::from_millis(interval_ms))
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let cache = Cache::open(Arc::new(MemoryStore::new()), config(100)).await;

        cache
            .set(
                &CacheKey::select("products"),
                &"value",
                SetOptions::with_ttl(Duration::from_millis(50)),
            )
            .await
            .unwrap();

        // Wait for entry to expire and a sweep to run
        tokio::time::sleep(Duration::from_millis(400)).await;

        // Removed without any read touching it
        assert!(cache.get_keys().await.is_empty());
        cache.close().await;
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let cache = Cache::open(Arc::new(MemoryStore::new()), config(100)).await;

        cache
            .set(
                &CacheKey::select("products"),
                &"value",
                SetOptions::with_ttl(Duration::from_secs(3600)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(cache.get_keys().await.len(), 1);
        cache.close().await;
    }

    #[tokio::test]
    async fn test_sweep_task_exits_when_cache_dropped() {
        let cache = Arc::new(Cache::new(Arc::new(MemoryStore::new()), config(20)));
        let handle = super::spawn_sweep_task(Arc::downgrade(&cache), Duration::from_millis(20));

        drop(cache);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(handle.is_finished(), "Task should stop once the cache is gone");
    }
}
