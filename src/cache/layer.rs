//! Cache Layer Module
//!
//! Async, shared view of a store for one value type. This is the seam the
//! fetch bindings depend on, so either store can sit behind a binding.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::cache::{DurableStorage, MemoryStore, PersistentStore};

// == Cache Layer Trait ==
/// Shared cache operations for values of type `T`.
#[async_trait]
pub trait CacheLayer<T>: Send + Sync {
    /// Name for logging, e.g. "memory" or "persistent".
    fn name(&self) -> &'static str;

    /// Returns the value if present and fresh.
    async fn get(&self, key: &str) -> Option<T>;

    /// Stores a value, `None` meaning the store's default TTL.
    async fn set(&self, key: &str, value: T, ttl: Option<Duration>);

    /// Removes the key, returning whether an entry was present.
    async fn delete(&self, key: &str) -> bool;
}

#[async_trait]
impl<T> CacheLayer<T> for RwLock<MemoryStore<T>>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Option<T> {
        // Write lock: an expired entry is evicted on read
        self.write().await.get(key)
    }

    async fn set(&self, key: &str, value: T, ttl: Option<Duration>) {
        self.write().await.set(key, value, ttl);
    }

    async fn delete(&self, key: &str) -> bool {
        self.write().await.delete(key)
    }
}

#[async_trait]
impl<T, S> CacheLayer<T> for RwLock<PersistentStore<S>>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: DurableStorage,
{
    fn name(&self) -> &'static str {
        "persistent"
    }

    async fn get(&self, key: &str) -> Option<T> {
        self.write().await.get(key)
    }

    async fn set(&self, key: &str, value: T, ttl: Option<Duration>) {
        self.write().await.set(key, &value, ttl);
    }

    async fn delete(&self, key: &str) -> bool {
        self.write().await.delete(key)
    }
}
