//! API Module
//!
//! HTTP handlers and routing for the operations panel.
//!
//! # Endpoints
//! - `GET /health` - Liveness check
//! - `GET /diagnostics` - Backend diagnostics report
//! - `GET /stats` - Persistent store statistics
//! - `POST /cache/cleanup` - Sweep expired entries
//! - `DELETE /cache` - Clear the persistent store

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
