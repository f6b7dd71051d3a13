//! Single-Flight Module
//!
//! Per-key registry of in-flight fetches. Concurrent callers asking for the
//! same key await one shared fetch instead of each invoking the fetcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::FetchError;

type FlightFuture<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;

struct Flight<T> {
    id: u64,
    future: FlightFuture<T>,
}

// == Single Flight ==
/// Deduplicates concurrent fetches per key.
///
/// Each fetch runs on its own task, so it completes (and performs whatever
/// side effects it carries, such as a cache write) even if every caller
/// waiting on it is dropped. The flight leaves the registry once it settles.
pub struct SingleFlight<T> {
    flights: Arc<Mutex<HashMap<String, Flight<T>>>>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the future built by `start`, or joins the one already running
    /// for `key`.
    ///
    /// `start` is only called when no flight for `key` is registered. A panic
    /// inside the fetch surfaces as a `FetchError`.
    pub async fn run<F>(&self, key: &str, start: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T, FetchError>>,
    {
        let future = {
            let mut flights = self.flights.lock().await;

            match flights.get(key) {
                Some(flight) => {
                    debug!(key, flight = flight.id, "joining in-flight fetch");
                    flight.future.clone()
                }
                None => self.register(&mut flights, key, start()),
            }
        };

        future.await
    }

    /// Starts a new flight for `key` that never reuses one registered earlier.
    ///
    /// A flight already running for `key` is awaited first, so results land
    /// in the order the flights were started. Callers arriving afterwards via
    /// [`SingleFlight::run`] join the new flight.
    pub async fn run_fresh<F>(&self, key: &str, start: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T, FetchError>>,
    {
        let future = {
            let mut flights = self.flights.lock().await;

            let previous = flights.get(key).map(|flight| {
                debug!(key, flight = flight.id, "queueing fresh fetch behind in-flight fetch");
                flight.future.clone()
            });
            let fetch = start();
            let chained = async move {
                if let Some(previous) = previous {
                    // Only ordering matters here; its callers get its result
                    let _ = previous.await;
                }
                fetch.await
            }
            .boxed();

            self.register(&mut flights, key, chained)
        };

        future.await
    }

    /// Number of fetches currently registered.
    pub async fn in_flight(&self) -> usize {
        self.flights.lock().await.len()
    }

    fn register(
        &self,
        flights: &mut HashMap<String, Flight<T>>,
        key: &str,
        fetch: BoxFuture<'static, Result<T, FetchError>>,
    ) -> FlightFuture<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let future = self.launch(key.to_string(), id, fetch);
        flights.insert(
            key.to_string(),
            Flight {
                id,
                future: future.clone(),
            },
        );
        future
    }

    fn launch(
        &self,
        key: String,
        id: u64,
        fetch: BoxFuture<'static, Result<T, FetchError>>,
    ) -> FlightFuture<T> {
        let flights = Arc::clone(&self.flights);

        let handle = tokio::spawn(async move {
            let result = fetch.await;

            let mut flights = flights.lock().await;
            if flights.get(&key).is_some_and(|flight| flight.id == id) {
                flights.remove(&key);
            }
            result
        });

        async move {
            handle.await.unwrap_or_else(|err| {
                Err(FetchError::new(anyhow::anyhow!("fetch task failed: {err}")))
            })
        }
        .boxed()
        .shared()
    }
}
