//! TTL Cleanup Task
//!
//! Background task that periodically sweeps expired entries out of a store,
//! bounding growth from keys that are written but never read again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::Sweep;

/// Default sweep interval for the volatile store (10 minutes).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Spawns a background task that periodically cleans up expired cache entries.
///
/// The first sweep runs one `interval` after spawning. Each sweep holds the
/// store's write lock only for the duration of the scan.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(RwLock::new(MemoryStore::<String>::with_defaults()));
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(600));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<C>(cache: Arc<RwLock<C>>, interval: Duration) -> JoinHandle<()>
where
    C: Sweep + 'static,
{
    tokio::spawn(async move {
        let name = cache.read().await.name();
        info!(
            store = name,
            "Starting TTL cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let removed = {
                let mut cache_guard = cache.write().await;
                cache_guard.cleanup()
            };

            if removed > 0 {
                info!(store = name, "TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!(store = name, "TTL cleanup: no expired entries found");
            }
        }
    })
}

// == Cleanup Task ==
/// Start/stop handle around [`spawn_cleanup_task`].
///
/// Nothing runs until `start` is called; dropping the handle stops the task.
pub struct CleanupTask<C> {
    cache: Arc<RwLock<C>>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl<C> CleanupTask<C>
where
    C: Sweep + 'static,
{
    pub fn new(cache: Arc<RwLock<C>>, interval: Duration) -> Self {
        Self {
            cache,
            interval,
            handle: None,
        }
    }

    /// Starts sweeping. Calling it while running is a no-op.
    ///
    /// A zero interval is rejected, since the timer cannot tick at zero.
    pub fn start(&mut self) -> bool {
        if self.is_running() || self.interval.is_zero() {
            return false;
        }
        self.handle = Some(spawn_cleanup_task(Arc::clone(&self.cache), self.interval));
        true
    }

    /// Stops sweeping.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<C> Drop for CleanupTask<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryStorage, MemoryStore, PersistentStore, MEMORY_DEFAULT_TTL};
    use crate::clock::ManualClock;

    fn shared_store(clock: &ManualClock) -> Arc<RwLock<MemoryStore<String>>> {
        Arc::new(RwLock::new(MemoryStore::new(
            MEMORY_DEFAULT_TTL,
            Arc::new(clock.clone()),
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_removes_expired_entries() {
        let clock = ManualClock::new(0);
        let cache = shared_store(&clock);

        cache
            .write()
            .await
            .set("expire_soon", "value".to_string(), Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(2));

        let handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        // Counted directly: `get` would evict on its own
        assert_eq!(cache.read().await.len(), 0, "Expired entry should have been cleaned up");

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_preserves_valid_entries() {
        let clock = ManualClock::new(0);
        let cache = shared_store(&clock);

        cache
            .write()
            .await
            .set("long_lived", "value".to_string(), Some(Duration::from_secs(3_600)));

        let handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let value = cache.write().await.get("long_lived");
        assert_eq!(value.as_deref(), Some("value"), "Valid entry should not be removed");

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_sweeps_persistent_store() {
        let clock = ManualClock::new(0);
        let cache = Arc::new(RwLock::new(PersistentStore::new(
            InMemoryStorage::new(),
            Duration::from_secs(60),
            Arc::new(clock.clone()),
        )));

        cache.write().await.set("resource-1", &"doc", None);
        clock.advance(Duration::from_secs(61));

        let mut task = CleanupTask::new(cache.clone(), Duration::from_secs(600));
        assert!(task.start());
        tokio::time::sleep(Duration::from_secs(601)).await;

        assert_eq!(cache.read().await.stats().total_items, 0);
        task.stop();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let clock = ManualClock::new(0);
        let handle = spawn_cleanup_task(shared_store(&clock), Duration::from_secs(1));

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let clock = ManualClock::new(0);
        let mut task = CleanupTask::new(shared_store(&clock), DEFAULT_CLEANUP_INTERVAL);

        assert!(!task.is_running());
        assert!(task.start());
        assert!(task.is_running());
        assert!(!task.start(), "Second start should be a no-op");

        task.stop();
        assert!(!task.is_running());
        assert_eq!(task.interval(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let clock = ManualClock::new(0);
        let mut task = CleanupTask::new(shared_store(&clock), Duration::ZERO);

        assert!(!task.start());
        assert!(!task.is_running());
    }
}
