//! Persistent Store Module
//!
//! Cache that survives restarts. Each entry is serialized on its own into one
//! durable storage slot; values are typed at the call site through serde.
//! Storage and serde failures are logged and degrade to a cache miss.

use std::sync::Arc;
use std::time::Duration;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStats, DurableStorage, Sweep};
use crate::clock::{Clock, SystemClock};

/// Default TTL for the persistent store (24 hours).
pub const PERSISTENT_DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Prefix marking the slots owned by this store.
pub const DEFAULT_KEY_PREFIX: &str = "drr_cache_";

// == Persistent Store ==
/// Cache backed by durable storage.
#[derive(Debug)]
pub struct PersistentStore<S> {
    /// Slot storage
    storage: S,
    /// Prefix prepended to every key to form its slot name
    prefix: String,
    /// TTL applied when `set` is called without one
    default_ttl: Duration,
    /// Time source for expiry checks
    clock: Arc<dyn Clock>,
}

impl<S: DurableStorage> PersistentStore<S> {
    // == Constructor ==
    /// Creates a new PersistentStore over `storage`.
    pub fn new(storage: S, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            default_ttl,
            clock,
        }
    }

    /// Creates a store on the system clock with the 24 hour default TTL.
    pub fn with_defaults(storage: S) -> Self {
        Self::new(storage, PERSISTENT_DEFAULT_TTL, Arc::new(SystemClock))
    }

    /// Replaces the slot prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Returns the TTL used when `set` is called without one.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn slot(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    // == Set ==
    /// Serializes and stores a value.
    ///
    /// A serialization or write failure is logged; the entry then reads as
    /// absent.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, self.clock.now_ms(), ttl.unwrap_or(self.default_ttl));
        let slot = self.slot(key);

        let result = serde_json::to_string(&entry)
            .map_err(Into::into)
            .and_then(|json| self.storage.set_item(&slot, &json));

        match result {
            Ok(()) => debug!(key, expires_at = entry.expires_at, "persistent cache set"),
            Err(err) => {
                warn!(key, error = %err, "persistent cache write failed");
                // Do not leave an older value readable under this key
                if let Err(err) = self.storage.remove_item(&slot) {
                    warn!(key, error = %err, "failed to drop stale slot after write failure");
                }
            }
        }
    }

    // == Get ==
    /// Reads and deserializes a value.
    ///
    /// Expired or undecodable slots are removed and reported as absent.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let slot = self.slot(key);
        let raw = self.read_slot(key, &slot)?;

        match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) if entry.is_expired_at(self.clock.now_ms()) => {
                debug!(key, "persistent cache entry expired on read");
                self.remove_slot(key, &slot);
                None
            }
            Ok(entry) => Some(entry.value),
            Err(err) => {
                warn!(key, error = %err, "corrupt persistent cache entry, removing");
                self.remove_slot(key, &slot);
                None
            }
        }
    }

    // == Has ==
    /// Returns whether a valid entry exists, without evicting anything.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        self.read_slot(key, &self.slot(key))
            .and_then(|raw| serde_json::from_str::<CacheEntry<IgnoredAny>>(&raw).ok())
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    // == Delete ==
    /// Removes an entry, returning whether one was present.
    pub fn delete(&mut self, key: &str) -> bool {
        let slot = self.slot(key);
        self.remove_slot(key, &slot)
    }

    // == Clear ==
    /// Removes every slot owned by this store; other slots are left alone.
    pub fn clear(&mut self) {
        for slot in self.owned_slots() {
            if let Err(err) = self.storage.remove_item(&slot) {
                warn!(slot = %slot, error = %err, "failed to clear persistent cache slot");
            }
        }
    }

    // == Stats ==
    /// Scans all owned slots against the current clock.
    ///
    /// Undecodable slots count as expired; size is the raw slot length.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        let mut stats = CacheStats::new();

        for slot in self.owned_slots() {
            let raw = match self.storage.get_item(&slot) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(slot = %slot, error = %err, "failed to read slot for stats");
                    continue;
                }
            };
            let expired = serde_json::from_str::<CacheEntry<IgnoredAny>>(&raw)
                .map(|entry| entry.is_expired_at(now))
                .unwrap_or(true);
            stats.record_entry(expired, slot.len() + raw.len());
        }

        stats
    }

    // == Cleanup ==
    /// Removes every expired or undecodable slot and returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;

        for slot in self.owned_slots() {
            let stale = match self.storage.get_item(&slot) {
                Ok(Some(raw)) => serde_json::from_str::<CacheEntry<IgnoredAny>>(&raw)
                    .map(|entry| entry.is_expired_at(now))
                    .unwrap_or(true),
                Ok(None) => false,
                Err(err) => {
                    warn!(slot = %slot, error = %err, "failed to read slot during cleanup");
                    false
                }
            };

            if stale {
                match self.storage.remove_item(&slot) {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(err) => warn!(slot = %slot, error = %err, "failed to remove expired slot"),
                }
            }
        }

        removed
    }

    fn owned_slots(&self) -> Vec<String> {
        match self.storage.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|slot| slot.starts_with(&self.prefix))
                .collect(),
            Err(err) => {
                warn!(error = %err, "failed to list persistent cache slots");
                Vec::new()
            }
        }
    }

    fn read_slot(&self, key: &str, slot: &str) -> Option<String> {
        match self.storage.get_item(slot) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "persistent cache read failed");
                None
            }
        }
    }

    fn remove_slot(&mut self, key: &str, slot: &str) -> bool {
        match self.storage.remove_item(slot) {
            Ok(existed) => existed,
            Err(err) => {
                warn!(key, error = %err, "persistent cache delete failed");
                false
            }
        }
    }
}

impl<S: DurableStorage> Sweep for PersistentStore<S> {
    fn name(&self) -> &'static str {
        "persistent"
    }

    fn cleanup(&mut self) -> usize {
        PersistentStore::cleanup(self)
    }
}
