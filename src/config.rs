//! Configuration Module
//!
//! Handles loading cache, operations server and backend settings from
//! environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::diagnostics::BackendSettings;

/// Process configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default TTL in seconds for the volatile store
    pub memory_default_ttl: u64,
    /// Default TTL in seconds for the persistent store
    pub persistent_default_ttl: u64,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Directory of the persistent store; platform cache dir when None
    pub cache_dir: Option<PathBuf>,
    /// HTTP port of the operations panel
    pub server_port: u16,
    /// Bound on each diagnostics probe in seconds
    pub probe_timeout: u64,
    /// Backend URL and anon key
    pub backend: BackendSettings,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMORY_DEFAULT_TTL` - Volatile store TTL in seconds (default: 300)
    /// - `PERSISTENT_DEFAULT_TTL` - Persistent store TTL in seconds (default: 86400)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 600)
    /// - `CACHE_DIR` - Persistent store directory (default: platform cache dir)
    /// - `SERVER_PORT` - Operations panel port (default: 3000)
    /// - `PROBE_TIMEOUT` - Diagnostics probe timeout in seconds (default: 10)
    /// - `SUPABASE_URL`, `SUPABASE_ANON_KEY` - Backend connection
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memory_default_ttl: parse_var("MEMORY_DEFAULT_TTL").unwrap_or(defaults.memory_default_ttl),
            persistent_default_ttl: parse_var("PERSISTENT_DEFAULT_TTL")
                .unwrap_or(defaults.persistent_default_ttl),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            probe_timeout: parse_var("PROBE_TIMEOUT").unwrap_or(defaults.probe_timeout),
            backend: BackendSettings::from_env(),
        }
    }

    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_default_ttl)
    }

    pub fn persistent_ttl(&self) -> Duration {
        Duration::from_secs(self.persistent_default_ttl)
    }

    pub fn cleanup_period(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_default_ttl: 300,
            persistent_default_ttl: 86_400,
            cleanup_interval: 600,
            cache_dir: None,
            server_port: 3000,
            probe_timeout: 10,
            backend: BackendSettings::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MEMORY_DEFAULT_TTL, PERSISTENT_DEFAULT_TTL};
    use crate::tasks::DEFAULT_CLEANUP_INTERVAL;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.memory_default_ttl, 300);
        assert_eq!(config.persistent_default_ttl, 86_400);
        assert_eq!(config.cleanup_interval, 600);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.probe_timeout, 10);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_defaults_match_store_constants() {
        let config = Config::default();
        assert_eq!(config.memory_ttl(), MEMORY_DEFAULT_TTL);
        assert_eq!(config.persistent_ttl(), PERSISTENT_DEFAULT_TTL);
        assert_eq!(config.cleanup_period(), DEFAULT_CLEANUP_INTERVAL);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("MEMORY_DEFAULT_TTL");
        env::remove_var("PERSISTENT_DEFAULT_TTL");
        env::remove_var("CLEANUP_INTERVAL");
        env::remove_var("CACHE_DIR");
        env::remove_var("SERVER_PORT");
        env::remove_var("PROBE_TIMEOUT");

        let config = Config::from_env();
        assert_eq!(config.memory_default_ttl, 300);
        assert_eq!(config.persistent_default_ttl, 86_400);
        assert_eq!(config.cleanup_interval, 600);
        assert_eq!(config.server_port, 3000);
        assert!(config.cache_dir.is_none());
    }
}
