//! API Handlers
//!
//! HTTP request handlers for each operations endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::{
    DurableStorage, FileStorage, InMemoryStorage, PersistentStore, SharedPersistentStore,
};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::diagnostics::{Diagnostics, DiagnosticsReport};
use crate::models::{CleanupResponse, ClearResponse, HealthResponse, StatsResponse};

/// Slot storage chosen at startup.
pub type DynStorage = Box<dyn DurableStorage>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Backend probes
    pub diagnostics: Arc<Diagnostics>,
    /// Persistent store shared with the cleanup task
    pub persistent: SharedPersistentStore<DynStorage>,
}

impl AppState {
    /// Creates a new AppState from its parts.
    pub fn new(diagnostics: Diagnostics, persistent: PersistentStore<DynStorage>) -> Self {
        Self {
            diagnostics: Arc::new(diagnostics),
            persistent: Arc::new(RwLock::new(persistent)),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// The persistent store lives in `CACHE_DIR` or the platform cache
    /// directory; without either it falls back to process memory.
    pub fn from_config(config: &Config) -> Self {
        let storage: DynStorage = match config.cache_dir.clone() {
            Some(dir) => Box::new(FileStorage::with_dir(dir)),
            None => match FileStorage::new() {
                Some(storage) => Box::new(storage),
                None => {
                    warn!("No cache directory available, persistent store kept in memory");
                    Box::new(InMemoryStorage::new())
                }
            },
        };

        let persistent =
            PersistentStore::new(storage, config.persistent_ttl(), Arc::new(SystemClock));
        let diagnostics =
            Diagnostics::from_settings(config.backend.clone(), config.probe_timeout());
        Self::new(diagnostics, persistent)
    }
}

/// Handler for GET /health
///
/// Liveness only; backend health is reported by /diagnostics.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Handler for GET /diagnostics
///
/// Always answers 200; a degraded backend is described in the body.
pub async fn diagnostics_handler(State(state): State<AppState>) -> Json<DiagnosticsReport> {
    let report = state.diagnostics.run_diagnostics().await;
    info!(overall = ?report.overall, "Diagnostics requested");
    Json(report)
}

/// Handler for GET /stats
///
/// Returns current persistent store statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let store = state.persistent.read().await;
    Json(StatsResponse::new("persistent", store.stats()))
}

/// Handler for POST /cache/cleanup
///
/// Sweeps expired entries out of the persistent store.
pub async fn cleanup_handler(State(state): State<AppState>) -> Json<CleanupResponse> {
    let removed = state.persistent.write().await.cleanup();
    info!(removed, "Manual sweep of persistent store");
    Json(CleanupResponse { removed })
}

/// Handler for DELETE /cache
///
/// Drops every entry owned by the persistent store.
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    let mut store = state.persistent.write().await;
    let cleared = store.stats().total_items;
    store.clear();
    info!(cleared, "Persistent store cleared");
    Json(ClearResponse::new(cleared))
}
