//! Fetch Binding Module
//!
//! Ties a cache key to a fetcher: serves fresh cached data, fetches on a
//! miss, keeps the last good value when a refresh fails and optionally
//! refreshes on a timer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::CacheLayer;
use crate::clock::duration_ms;
use crate::error::FetchError;
use crate::fetch::SingleFlight;

// == Fetcher ==
/// Zero-argument async operation producing the value for a key.
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Builds a [`Fetcher`] from an async closure.
///
/// ```ignore
/// let news = fetcher(|| async { api.list_news().await });
/// ```
pub fn fetcher<T, F, Fut>(f: F) -> Fetcher<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

// == Binding Options ==
/// Per-binding settings.
#[derive(Debug, Clone, Default)]
pub struct BindingOptions {
    /// Entry lifetime; `None` uses the selected store's default
    pub ttl: Option<Duration>,
    /// Use the persistent store instead of the volatile one
    pub persistent: bool,
    /// Period of automatic forced refreshes; `None` disables them
    pub refresh_interval: Option<Duration>,
}

// == Fetch State ==
/// What a consumer of a binding observes.
#[derive(Debug, Clone)]
pub struct FetchState<T> {
    /// Last known value
    pub data: Option<T>,
    /// True while a load is in progress
    pub loading: bool,
    /// Failure of the most recent load, cleared when a new load starts
    pub error: Option<FetchError>,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

// == Binding Core ==
/// State shared between a binding and its refresh task.
struct BindingCore<T> {
    key: String,
    fetcher: Fetcher<T>,
    cache: Arc<dyn CacheLayer<T>>,
    ttl: Option<Duration>,
    flights: Arc<SingleFlight<T>>,
    state: watch::Sender<FetchState<T>>,
    pending: AtomicUsize,
}

impl<T> BindingCore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn flight_key(&self) -> String {
        format!("{}:{}", self.cache.name(), self.key)
    }

    async fn load(&self, force: bool) -> Result<T, FetchError> {
        let _loading = LoadingGuard::begin(self);

        if !force {
            if let Some(value) = self.cache.get(&self.key).await {
                debug!(key = %self.key, store = self.cache.name(), "cache hit");
                self.state.send_modify(|state| state.data = Some(value.clone()));
                return Ok(value);
            }
            debug!(key = %self.key, store = self.cache.name(), "cache miss");
        }

        // A forced load must not be answered by a fetch that began before it
        let flight_key = self.flight_key();
        let result = if force {
            self.flights
                .run_fresh(&flight_key, || self.fetch_and_store(true))
                .await
        } else {
            self.flights
                .run(&flight_key, || self.fetch_and_store(false))
                .await
        };

        match &result {
            Ok(value) => {
                self.state.send_modify(|state| state.data = Some(value.clone()));
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "fetch failed, keeping previous data");
                self.state.send_modify(|state| state.error = Some(err.clone()));
            }
        }

        result
    }

    /// Future run once per flight: re-check the cache (unless forced), call
    /// the fetcher and write the result back before resolving.
    fn fetch_and_store(&self, force: bool) -> BoxFuture<'static, Result<T, FetchError>> {
        let key = self.key.clone();
        let cache = Arc::clone(&self.cache);
        let fetcher = Arc::clone(&self.fetcher);
        let ttl = self.ttl;

        async move {
            if !force {
                if let Some(value) = cache.get(&key).await {
                    return Ok(value);
                }
            }

            let value = fetcher().await.map_err(FetchError::new)?;
            cache.set(&key, value.clone(), ttl).await;
            debug!(key = %key, store = cache.name(), "fetched and cached");
            Ok(value)
        }
        .boxed()
    }
}

/// Marks the binding as loading for as long as it lives.
///
/// Resetting `loading` on drop covers failures, panics and cancelled loads.
struct LoadingGuard<'a, T> {
    core: &'a BindingCore<T>,
}

impl<'a, T> LoadingGuard<'a, T> {
    fn begin(core: &'a BindingCore<T>) -> Self {
        core.state.send_modify(|state| {
            core.pending.fetch_add(1, Ordering::SeqCst);
            state.loading = true;
            state.error = None;
        });
        Self { core }
    }
}

impl<T> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        let core = self.core;
        core.state.send_modify(|state| {
            let remaining = core.pending.fetch_sub(1, Ordering::SeqCst) - 1;
            state.loading = remaining > 0;
        });
    }
}

// == Fetch Binding ==
/// A consumer's handle on one cache key.
///
/// Dropping the binding cancels its refresh timer. A fetch already in flight
/// still completes and writes the cache.
pub struct FetchBinding<T> {
    core: Arc<BindingCore<T>>,
    refresh_interval: Option<Duration>,
    refresh_task: Option<JoinHandle<()>>,
}

impl<T> FetchBinding<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a binding without loading anything.
    ///
    /// Use [`crate::fetch::FetchContext::bind`] to also perform the initial load.
    pub fn new(
        key: impl Into<String>,
        fetcher: Fetcher<T>,
        cache: Arc<dyn CacheLayer<T>>,
        flights: Arc<SingleFlight<T>>,
        options: &BindingOptions,
    ) -> Self {
        let (state, _) = watch::channel(FetchState::default());
        let core = Arc::new(BindingCore {
            key: key.into(),
            fetcher,
            cache,
            ttl: options.ttl,
            flights,
            state,
            pending: AtomicUsize::new(0),
        });

        let mut binding = Self {
            core,
            refresh_interval: None,
            refresh_task: None,
        };
        binding.set_refresh_interval(options.refresh_interval);
        binding
    }

    /// The cache key this binding manages.
    pub fn key(&self) -> &str {
        &self.core.key
    }

    /// Current state.
    pub fn snapshot(&self) -> FetchState<T> {
        self.core.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.core.state.subscribe()
    }

    // == Load ==
    /// Returns the cached value if fresh, otherwise fetches and caches it.
    ///
    /// With `force`, the cache is skipped and the fetcher always runs (or an
    /// identical fetch already in flight is joined). On failure the previous
    /// `data` is kept and the error is recorded.
    pub async fn load(&self, force: bool) -> Result<T, FetchError> {
        self.core.load(force).await
    }

    // == Refresh ==
    /// Re-fetches and overwrites the cached value.
    pub async fn refresh(&self) -> Result<T, FetchError> {
        self.core.load(true).await
    }

    // == Invalidate ==
    /// Drops the cached value, then re-fetches.
    ///
    /// Readers of the store see the key as absent until the fetch settles.
    pub async fn invalidate(&self) -> Result<T, FetchError> {
        let removed = self.core.cache.delete(&self.core.key).await;
        debug!(key = %self.core.key, removed, "invalidated");
        self.core.load(true).await
    }

    // == Auto Refresh ==
    /// Replaces the automatic refresh period. `None` or zero stops it.
    pub fn set_refresh_interval(&mut self, interval: Option<Duration>) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }

        self.refresh_interval = interval.filter(|period| !period.is_zero());
        if let Some(period) = self.refresh_interval {
            info!(
                key = %self.core.key,
                period_ms = duration_ms(period),
                "auto refresh enabled"
            );
            self.refresh_task = Some(spawn_refresh_task(Arc::clone(&self.core), period));
        }
    }

    /// Current automatic refresh period.
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
    }
}

impl<T> Drop for FetchBinding<T> {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
    }
}

impl<T> std::fmt::Debug for FetchBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchBinding")
            .field("key", &self.core.key)
            .field("store", &self.core.cache.name())
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

fn spawn_refresh_task<T>(core: Arc<BindingCore<T>>, period: Duration) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            // Failures are recorded in the binding state
            let _ = core.load(true).await;
        }
    })
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, MEMORY_DEFAULT_TTL};
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::RwLock;

    struct Harness {
        clock: ManualClock,
        store: Arc<RwLock<MemoryStore<String>>>,
        calls: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
        delay: Duration,
    }

    impl Harness {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }

        fn new() -> Self {
            let clock = ManualClock::new(0);
            let store = Arc::new(RwLock::new(MemoryStore::new(
                MEMORY_DEFAULT_TTL,
                Arc::new(clock.clone()),
            )));
            Self {
                clock,
                store,
                calls: Arc::new(AtomicUsize::new(0)),
                failing: Arc::new(AtomicBool::new(false)),
                delay: Duration::ZERO,
            }
        }

        fn fetcher(&self) -> Fetcher<String> {
            let calls = Arc::clone(&self.calls);
            let failing = Arc::clone(&self.failing);
            let delay = self.delay;
            fetcher(move || {
                let calls = Arc::clone(&calls);
                let failing = Arc::clone(&failing);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if failing.load(Ordering::SeqCst) {
                        anyhow::bail!("backend unavailable");
                    }
                    Ok(format!("v{n}"))
                }
            })
        }

        fn binding(&self, options: BindingOptions) -> FetchBinding<String> {
            FetchBinding::new(
                "news",
                self.fetcher(),
                self.store.clone(),
                Arc::new(SingleFlight::new()),
                &options,
            )
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_miss_fetches_then_hit_serves_cache() {
        let h = Harness::new();
        let binding = h.binding(BindingOptions::default());

        assert_eq!(binding.load(false).await.unwrap(), "v1");
        assert_eq!(binding.load(false).await.unwrap(), "v1");

        assert_eq!(h.calls(), 1);
        let state = binding.snapshot();
        assert_eq!(state.data.as_deref(), Some("v1"));
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let h = Harness::new();
        let binding = h.binding(BindingOptions {
            ttl: Some(Duration::from_secs(60)),
            ..Default::default()
        });

        binding.load(false).await.unwrap();
        h.clock.advance(Duration::from_secs(61));

        assert_eq!(binding.load(false).await.unwrap(), "v2");
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test]
    async fn test_existing_cache_entry_skips_fetcher() {
        let h = Harness::new();
        h.store.write().await.set("news", "cached".to_string(), None);
        let binding = h.binding(BindingOptions::default());

        assert_eq!(binding.load(false).await.unwrap(), "cached");
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_overwrites_cache() {
        let h = Harness::new();
        let binding = h.binding(BindingOptions::default());

        binding.load(false).await.unwrap();
        assert_eq!(binding.refresh().await.unwrap(), "v2");

        assert_eq!(h.store.write().await.get("news").as_deref(), Some("v2"));
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_while_error() {
        let h = Harness::new();
        let binding = h.binding(BindingOptions::default());

        binding.load(false).await.unwrap();
        h.failing.store(true, Ordering::SeqCst);

        let result = binding.refresh().await;

        assert!(result.is_err());
        let state = binding.snapshot();
        assert_eq!(state.data.as_deref(), Some("v1"));
        assert!(state.error.unwrap().to_string().contains("backend unavailable"));
        assert!(!state.loading);
        // The failed fetch does not touch the store
        assert_eq!(h.store.write().await.get("news").as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_first_load_failure_leaves_data_empty() {
        let h = Harness::new();
        h.failing.store(true, Ordering::SeqCst);
        let binding = h.binding(BindingOptions::default());

        assert!(binding.load(false).await.is_err());

        let state = binding.snapshot();
        assert!(state.data.is_none());
        assert!(state.error.is_some());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_new_load_clears_previous_error() {
        let h = Harness::new();
        h.failing.store(true, Ordering::SeqCst);
        let binding = h.binding(BindingOptions::default());
        let _ = binding.load(false).await;

        h.failing.store(false, Ordering::SeqCst);
        binding.load(false).await.unwrap();

        assert!(binding.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_forces_exactly_one_fetch() {
        let h = Harness::new();
        let binding = h.binding(BindingOptions::default());
        binding.load(false).await.unwrap();
        assert!(h.store.read().await.has("news"));

        let before = h.calls();
        assert_eq!(binding.invalidate().await.unwrap(), "v2");

        assert_eq!(h.calls(), before + 1);
    }

    #[tokio::test]
    async fn test_invalidate_failure_leaves_key_absent() {
        let h = Harness::new();
        let binding = h.binding(BindingOptions::default());
        binding.load(false).await.unwrap();

        h.failing.store(true, Ordering::SeqCst);
        assert!(binding.invalidate().await.is_err());

        assert!(!h.store.read().await.has("news"));
        assert_eq!(binding.snapshot().data.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_loading_flag_observed_while_fetching() {
        let h = Harness::new();
        let gate = Arc::new(tokio::sync::Notify::new());
        let release = Arc::clone(&gate);
        let slow = fetcher(move || {
            let release = Arc::clone(&release);
            async move {
                release.notified().await;
                Ok::<_, anyhow::Error>("slow".to_string())
            }
        });
        let binding = Arc::new(FetchBinding::new(
            "slow",
            slow,
            h.store.clone(),
            Arc::new(SingleFlight::new()),
            &BindingOptions::default(),
        ));
        let mut rx = binding.subscribe();

        let task = {
            let binding = Arc::clone(&binding);
            tokio::spawn(async move { binding.load(false).await })
        };

        rx.wait_for(|state| state.loading).await.unwrap();
        gate.notify_one();
        assert_eq!(task.await.unwrap().unwrap(), "slow");
        assert!(!binding.snapshot().loading);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let h = Harness::new();
        let binding = Arc::new(h.binding(BindingOptions::default()));

        let loads = (0..8).map(|_| {
            let binding = Arc::clone(&binding);
            tokio::spawn(async move { binding.load(false).await })
        });
        let results = futures::future::join_all(loads).await;

        assert!(results.into_iter().all(|r| r.unwrap().is_ok()));
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_during_refresh_fetches_again() {
        let h = Harness::with_delay(Duration::from_millis(50));
        let binding = Arc::new(h.binding(BindingOptions::default()));
        assert_eq!(binding.load(false).await.unwrap(), "v1");

        let refresh = {
            let binding = Arc::clone(&binding);
            tokio::spawn(async move { binding.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.calls(), 2);

        assert_eq!(binding.invalidate().await.unwrap(), "v3");
        assert_eq!(refresh.await.unwrap().unwrap(), "v2");

        assert_eq!(h.calls(), 3);
        assert_eq!(h.store.write().await.get("news").as_deref(), Some("v3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_does_not_join_pending_load() {
        let h = Harness::with_delay(Duration::from_millis(50));
        let binding = Arc::new(h.binding(BindingOptions::default()));

        let load = {
            let binding = Arc::clone(&binding);
            tokio::spawn(async move { binding.load(false).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(binding.refresh().await.unwrap(), "v2");
        assert_eq!(load.await.unwrap().unwrap(), "v1");
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_runs_on_interval() {
        let h = Harness::new();
        let binding = h.binding(BindingOptions {
            refresh_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        assert_eq!(binding.refresh_interval(), Some(Duration::from_secs(30)));

        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(h.calls(), 3);
        assert_eq!(binding.snapshot().data.as_deref(), Some("v3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_auto_refresh() {
        let h = Harness::new();
        let binding = h.binding(BindingOptions {
            refresh_interval: Some(Duration::from_secs(10)),
            ..Default::default()
        });

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(h.calls(), 1);

        drop(binding);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changing_interval_restarts_timer() {
        let h = Harness::new();
        let mut binding = h.binding(BindingOptions {
            refresh_interval: Some(Duration::from_secs(10)),
            ..Default::default()
        });

        binding.set_refresh_interval(None);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.calls(), 0);

        binding.set_refresh_interval(Some(Duration::from_secs(5)));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(h.calls(), 2);
    }
}
