//! DRR Cache - operations server
//!
//! Serves backend diagnostics and persistent cache maintenance over HTTP,
//! and sweeps the persistent store in the background.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drr_cache::api::create_router;
use drr_cache::diagnostics::HealthStatus;
use drr_cache::{AppState, CleanupTask, Config};

/// Main entry point for the operations server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the persistent store and build the diagnostics probes
/// 4. Start background TTL cleanup of the persistent store
/// 5. Log an initial diagnostics report
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drr_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting DRR cache operations server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: memory_ttl={}s, persistent_ttl={}s, port={}, cleanup_interval={}s",
        config.memory_default_ttl,
        config.persistent_default_ttl,
        config.server_port,
        config.cleanup_interval
    );

    let state = AppState::from_config(&config);
    info!("Persistent store and diagnostics initialized");

    let mut cleanup = CleanupTask::new(state.persistent.clone(), config.cleanup_period());
    if cleanup.start() {
        info!("Background cleanup task started");
    } else {
        warn!("Cleanup interval is zero, background cleanup disabled");
    }

    let report = state.diagnostics.run_diagnostics().await;
    match report.overall {
        HealthStatus::Healthy => info!("Backend diagnostics: healthy"),
        _ => {
            for recommendation in &report.recommendations {
                warn!(overall = ?report.overall, "{}", recommendation);
            }
        }
    }

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cleanup.stop();
    warn!("Cleanup task stopped");
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
