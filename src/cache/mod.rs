//! Cache Module
//!
//! TTL caches with lazy expiry on read and periodic sweeps: a volatile
//! in-memory store and a persistent store over durable key-scoped storage.

mod entry;
mod layer;
mod memory;
mod persistent;
mod stats;
mod storage;


use std::sync::Arc;

use tokio::sync::RwLock;

// Re-export public types
pub use entry::CacheEntry;
pub use layer::CacheLayer;
pub use memory::{MemoryStore, MEMORY_DEFAULT_TTL};
pub use persistent::{PersistentStore, DEFAULT_KEY_PREFIX, PERSISTENT_DEFAULT_TTL};
pub use stats::CacheStats;
pub use storage::{DurableStorage, FileStorage, InMemoryStorage};

/// Volatile store shared between bindings and the cleanup task.
pub type SharedMemoryStore<V> = Arc<RwLock<MemoryStore<V>>>;

/// Persistent store shared between bindings, the cleanup task and the API.
pub type SharedPersistentStore<S> = Arc<RwLock<PersistentStore<S>>>;

// == Sweep Trait ==
/// A store whose expired entries can be swept independently of reads.
pub trait Sweep: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &'static str;

    /// Removes expired entries, returning how many were removed.
    fn cleanup(&mut self) -> usize;
}
