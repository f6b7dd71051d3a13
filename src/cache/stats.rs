//! Cache Statistics Module
//!
//! Point-in-time snapshot of a store's contents, computed by scanning every
//! entry against the current clock. Diagnostic only.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of a cache store's contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently held, expired or not
    pub total_items: usize,
    /// Entries past their expiry that have not been evicted yet
    pub expired_items: usize,
    /// Entries that `get` would still return
    pub valid_items: usize,
    /// Rough size of keys plus serialized values, in bytes
    pub memory_usage_estimate: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Entry ==
    /// Counts one scanned entry.
    pub fn record_entry(&mut self, expired: bool, size_estimate: usize) {
        self.total_items += 1;
        if expired {
            self.expired_items += 1;
        } else {
            self.valid_items += 1;
        }
        self.memory_usage_estimate += size_estimate;
    }

    // == Expired Ratio ==
    /// Share of held entries that are expired, or 0.0 for an empty store.
    pub fn expired_ratio(&self) -> f64 {
        if self.total_items == 0 {
            0.0
        } else {
            self.expired_items as f64 / self.total_items as f64
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.total_items, 0);
        assert_eq!(stats.expired_items, 0);
        assert_eq!(stats.valid_items, 0);
        assert_eq!(stats.memory_usage_estimate, 0);
    }

    #[test]
    fn test_record_entry() {
        let mut stats = CacheStats::new();
        stats.record_entry(false, 10);
        stats.record_entry(true, 5);
        stats.record_entry(false, 1);

        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.valid_items, 2);
        assert_eq!(stats.expired_items, 1);
        assert_eq!(stats.memory_usage_estimate, 16);
    }

    #[test]
    fn test_expired_ratio() {
        let mut stats = CacheStats::new();
        assert_eq!(stats.expired_ratio(), 0.0);

        stats.record_entry(true, 0);
        stats.record_entry(false, 0);
        assert_eq!(stats.expired_ratio(), 0.5);
    }

    #[test]
    fn test_stats_serialize_field_names() {
        let json = serde_json::to_value(CacheStats::new()).unwrap();
        assert!(json.get("total_items").is_some());
        assert!(json.get("memory_usage_estimate").is_some());
    }
}
