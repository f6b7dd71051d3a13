//! API Routes
//!
//! Configures the Axum router with all operations endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cleanup_handler, clear_handler, diagnostics_handler, health_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Liveness check
/// - `GET /diagnostics` - Backend diagnostics report
/// - `GET /stats` - Persistent store statistics
/// - `POST /cache/cleanup` - Sweep expired entries
/// - `DELETE /cache` - Clear the persistent store
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/diagnostics", get(diagnostics_handler))
        .route("/stats", get(stats_handler))
        .route("/cache/cleanup", post(cleanup_handler))
        .route("/cache", delete(clear_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
