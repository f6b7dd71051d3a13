//! Fetch Module
//!
//! Cached data fetching: bindings that serve fresh cache entries, fetch on a
//! miss, share in-flight fetches per key and refresh on a timer.

mod binding;
mod single_flight;

use std::sync::Arc;

pub use binding::{fetcher, BindingOptions, FetchBinding, FetchState, Fetcher};
pub use single_flight::SingleFlight;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::cache::{CacheLayer, DurableStorage, MemoryStore, SharedPersistentStore};
use crate::clock::Clock;
use crate::config::Config;

// == Fetch Context ==
/// The stores and in-flight registry shared by every binding of one value type.
///
/// Built once and passed to consumers; there is no process-wide instance.
pub struct FetchContext<T> {
    memory: Arc<dyn CacheLayer<T>>,
    persistent: Arc<dyn CacheLayer<T>>,
    flights: Arc<SingleFlight<T>>,
}

impl<T> Clone for FetchContext<T> {
    fn clone(&self) -> Self {
        Self {
            memory: Arc::clone(&self.memory),
            persistent: Arc::clone(&self.persistent),
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<T> FetchContext<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a context over a volatile and a persistent cache layer.
    pub fn new(memory: Arc<dyn CacheLayer<T>>, persistent: Arc<dyn CacheLayer<T>>) -> Self {
        Self {
            memory,
            persistent,
            flights: Arc::new(SingleFlight::new()),
        }
    }

    /// Creates a context with a fresh volatile store using the configured
    /// TTL, over an existing shared persistent store.
    pub fn from_config<S>(
        config: &Config,
        persistent: SharedPersistentStore<S>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        T: Serialize + DeserializeOwned,
        S: DurableStorage + 'static,
    {
        let memory = Arc::new(RwLock::new(MemoryStore::new(config.memory_ttl(), clock)));
        Self::new(memory, persistent)
    }

    /// Returns the layer selected by `persistent`.
    pub fn layer(&self, persistent: bool) -> Arc<dyn CacheLayer<T>> {
        if persistent {
            Arc::clone(&self.persistent)
        } else {
            Arc::clone(&self.memory)
        }
    }

    /// Creates a binding without loading.
    pub fn binding(
        &self,
        key: impl Into<String>,
        fetcher: Fetcher<T>,
        options: BindingOptions,
    ) -> FetchBinding<T> {
        FetchBinding::new(
            key,
            fetcher,
            self.layer(options.persistent),
            Arc::clone(&self.flights),
            &options,
        )
    }

    /// Creates a binding and performs its initial load.
    ///
    /// The outcome of the initial load is available through the binding's
    /// state; a failure does not prevent the binding from being returned.
    pub async fn bind(
        &self,
        key: impl Into<String>,
        fetcher: Fetcher<T>,
        options: BindingOptions,
    ) -> FetchBinding<T> {
        let binding = self.binding(key, fetcher, options);
        // Recorded in the binding state
        let _ = binding.load(false).await;
        binding
    }
}
