//! DRR Cache - TTL caching, cached data bindings and backend diagnostics
//!
//! Provides a volatile and a persistent TTL store, fetch bindings that read
//! through them with stale-while-error semantics, and a health probe for the
//! hosted backend.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fetch;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{MemoryStore, PersistentStore};
pub use config::Config;
pub use diagnostics::{Diagnostics, DiagnosticsReport};
pub use fetch::{FetchBinding, FetchContext};
pub use tasks::{spawn_cleanup_task, CleanupTask};
