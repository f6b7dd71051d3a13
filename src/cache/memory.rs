//! Memory Store Module
//!
//! Volatile cache engine: a HashMap of typed entries with lazy expiry on read
//! and a sweep for entries that are never read again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, Sweep};
use crate::clock::{Clock, SystemClock};

/// Default TTL for the volatile store (5 minutes).
pub const MEMORY_DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

// == Memory Store ==
/// In-process cache holding values of one type.
///
/// Cleared when the process exits. Wrap in `Arc<RwLock<_>>` to share it
/// between bindings and the cleanup task.
#[derive(Debug)]
pub struct MemoryStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// TTL applied when `set` is called without one
    default_ttl: Duration,
    /// Time source for expiry checks
    clock: Arc<dyn Clock>,
}

impl<V: Clone> MemoryStore<V> {
    // == Constructor ==
    /// Creates a new MemoryStore with the given default TTL and clock.
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
            clock,
        }
    }

    /// Creates a store on the system clock with the 5 minute default TTL.
    pub fn with_defaults() -> Self {
        Self::new(MEMORY_DEFAULT_TTL, Arc::new(SystemClock))
    }

    /// Returns the TTL used when `set` is called without one.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // == Set ==
    /// Stores a value, replacing any existing entry for the key.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL (uses the store default if None)
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let entry = CacheEntry::new(value, self.clock.now_ms(), ttl.unwrap_or(self.default_ttl));
        debug!(key = %key, expires_at = entry.expires_at, "memory cache set");
        self.entries.insert(key, entry);
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed and reported as absent.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        let expired = self.entries.get(key)?.is_expired_at(now);

        if expired {
            self.entries.remove(key);
            debug!(key, "memory cache entry expired on read");
            return None;
        }

        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Has ==
    /// Returns whether a valid entry exists, without evicting expired ones.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    // == Delete ==
    /// Removes an entry by key, returning whether one was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // == Cleanup ==
    /// Removes every expired entry and returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before - self.entries.len()
    }

    /// Returns the number of entries held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone + Serialize> MemoryStore<V> {
    // == Stats ==
    /// Scans all entries against the current clock.
    ///
    /// Size is estimated from the key length plus the JSON length of the value.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        let mut stats = CacheStats::new();

        for (key, entry) in &self.entries {
            let value_size = serde_json::to_vec(&entry.value)
                .map(|bytes| bytes.len())
                .unwrap_or_else(|_| std::mem::size_of::<V>());
            stats.record_entry(entry.is_expired_at(now), key.len() + value_size);
        }

        stats
    }
}

impl<V: Clone + Send + Sync> Sweep for MemoryStore<V> {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn cleanup(&mut self) -> usize {
        MemoryStore::cleanup(self)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn test_store() -> (MemoryStore<String>, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let store = MemoryStore::new(MEMORY_DEFAULT_TTL, Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn test_store_new() {
        let (store, _clock) = test_store();
        assert!(store.is_empty());
        assert_eq!(store.default_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_store_set_and_get() {
        let (mut store, _clock) = test_store();

        store.set("key1", "value1".to_string(), None);

        assert_eq!(store.get("key1").as_deref(), Some("value1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let (mut store, _clock) = test_store();
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn test_store_delete() {
        let (mut store, _clock) = test_store();

        store.set("key1", "value1".to_string(), None);

        assert!(store.delete("key1"));
        assert!(store.is_empty());
        assert!(store.get("key1").is_none());
    }

    #[test]
    fn test_store_delete_nonexistent() {
        let (mut store, _clock) = test_store();
        assert!(!store.delete("nonexistent"));
    }

    #[test]
    fn test_store_overwrite() {
        let (mut store, _clock) = test_store();

        store.set("key1", "value1".to_string(), None);
        store.set("key1", "value2".to_string(), None);

        assert_eq!(store.get("key1").as_deref(), Some("value2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_overwrite_resets_ttl() {
        let (mut store, clock) = test_store();

        store.set("key1", "value1".to_string(), Some(Duration::from_secs(10)));
        clock.advance(Duration::from_secs(8));
        store.set("key1", "value2".to_string(), Some(Duration::from_secs(10)));
        clock.advance(Duration::from_secs(8));

        assert_eq!(store.get("key1").as_deref(), Some("value2"));
    }

    #[test]
    fn test_store_ttl_expiration() {
        let (mut store, clock) = test_store();

        store.set("key1", "value1".to_string(), Some(Duration::from_secs(1)));
        assert!(store.get("key1").is_some());

        clock.advance(Duration::from_millis(1_001));

        assert!(store.get("key1").is_none());
    }

    #[test]
    fn test_default_ttl_news_scenario() {
        let clock = ManualClock::new(0);
        let mut store: MemoryStore<Vec<String>> =
            MemoryStore::new(MEMORY_DEFAULT_TTL, Arc::new(clock.clone()));
        let news = vec![
            "flood drill".to_string(),
            "evacuation map".to_string(),
            "hotline".to_string(),
        ];

        store.set("news", news.clone(), None);
        assert_eq!(store.get("news"), Some(news));

        clock.advance(Duration::from_secs(5 * 60 + 1));
        assert!(store.get("news").is_none());
    }

    #[test]
    fn test_get_evicts_expired_entry() {
        let (mut store, clock) = test_store();

        store.set("key1", "value1".to_string(), Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(2));

        assert_eq!(store.stats().total_items, 1);
        assert!(store.get("key1").is_none());
        assert_eq!(store.stats().total_items, 0);
    }

    #[test]
    fn test_has_does_not_evict() {
        let (mut store, clock) = test_store();

        store.set("key1", "value1".to_string(), Some(Duration::from_secs(1)));
        assert!(store.has("key1"));

        clock.advance(Duration::from_secs(2));

        assert!(!store.has("key1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_stats() {
        let (mut store, clock) = test_store();

        store.set("short", "a".to_string(), Some(Duration::from_secs(1)));
        store.set("long", "b".to_string(), Some(Duration::from_secs(60)));
        clock.advance(Duration::from_secs(2));

        let stats = store.stats();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.expired_items, 1);
        assert_eq!(stats.valid_items, 1);
        // "short" + "\"a\"" and "long" + "\"b\""
        assert_eq!(stats.memory_usage_estimate, 5 + 3 + 4 + 3);
    }

    #[test]
    fn test_store_cleanup_expired() {
        let (mut store, clock) = test_store();

        store.set("key1", "value1".to_string(), Some(Duration::from_secs(1)));
        store.set("key2", "value2".to_string(), Some(Duration::from_secs(10)));
        clock.advance(Duration::from_secs(2));

        let removed = store.cleanup();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("key2").is_some());
    }

    #[test]
    fn test_sweep_removes_never_read_entries() {
        let (mut store, clock) = test_store();

        for i in 0..5 {
            store.set(format!("k{i}"), "v".to_string(), Some(Duration::from_millis(100)));
        }
        clock.advance(Duration::from_secs(1));

        assert_eq!(store.cleanup(), 5);
        assert_eq!(store.stats().total_items, 0);
    }

    #[test]
    fn test_store_clear() {
        let (mut store, _clock) = test_store();

        store.set("a", "1".to_string(), None);
        store.set("b", "2".to_string(), None);
        store.clear();

        assert!(store.is_empty());
    }
}
