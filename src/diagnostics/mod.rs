//! Diagnostics Module
//!
//! Point-in-time health report of the hosted backend for the operations
//! panel. Every probe turns its own failures, timeouts and panics into report
//! fields, so producing a report never fails.

mod backend;
mod environment;
mod report;

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, info, warn};

pub use backend::{AuthOutcome, Backend, RestBackend, UnreachableBackend};
pub use environment::{
    verify_environment, BackendSettings, ANON_KEY_VAR, PLACEHOLDER_MARKERS, URL_VAR,
};
pub use report::{AuthStatus, ConnectionStatus, DiagnosticsReport, EnvironmentStatus, HealthStatus};

use crate::clock::{current_timestamp_ms, duration_ms};
use crate::error::BackendError;

/// Tables the portal reads from.
pub const EXPECTED_TABLES: &[&str] = &[
    "news",
    "services",
    "resources",
    "emergency_procedures",
    "incident_reports",
    "contacts",
];

/// Default bound on each probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Password used by the throwaway sign-in.
const PROBE_PASSWORD: &str = "diagnostics-probe-not-a-real-password";

// == Diagnostics ==
/// Runs the backend probes.
#[derive(Clone)]
pub struct Diagnostics {
    backend: Arc<dyn Backend>,
    settings: BackendSettings,
    expected_tables: Vec<String>,
    probe_timeout: Duration,
}

impl Diagnostics {
    pub fn new(backend: Arc<dyn Backend>, settings: BackendSettings) -> Self {
        Self {
            backend,
            settings,
            expected_tables: EXPECTED_TABLES.iter().map(|t| t.to_string()).collect(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Builds a REST backend from `settings`.
    ///
    /// Unusable settings still yield diagnostics; their probes report why.
    pub fn from_settings(settings: BackendSettings, probe_timeout: Duration) -> Self {
        let backend: Arc<dyn Backend> = match (&settings.url, &settings.anon_key) {
            (Some(url), Some(key)) => match RestBackend::new(url, key.clone(), probe_timeout) {
                Ok(backend) => Arc::new(backend),
                Err(err) => Arc::new(UnreachableBackend::new(err.to_string())),
            },
            _ => Arc::new(UnreachableBackend::new(format!(
                "{URL_VAR} and {ANON_KEY_VAR} must both be set"
            ))),
        };
        Self::new(backend, settings).with_probe_timeout(probe_timeout)
    }

    /// Replaces the list of tables probed.
    pub fn with_expected_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    // == Check Connection ==
    /// Pings the backend, then probes each expected table independently.
    ///
    /// Tables are only probed when the ping succeeds.
    pub async fn check_connection(&self) -> ConnectionStatus {
        if let Err(err) = self.guarded(self.backend.ping()).await {
            warn!(error = %err, "backend unreachable");
            return ConnectionStatus {
                is_connected: false,
                error: Some(err.to_string()),
                tables: BTreeMap::new(),
            };
        }

        let probes = self.expected_tables.iter().map(|table| async move {
            let result = self.guarded(self.backend.probe_table(table)).await;
            if let Err(err) = &result {
                debug!(table = %table, error = %err, "table probe failed");
            }
            (table.clone(), result.is_ok())
        });

        ConnectionStatus {
            is_connected: true,
            error: None,
            tables: join_all(probes).await.into_iter().collect(),
        }
    }

    // == Verify Environment ==
    /// Checks the configured backend settings.
    pub fn verify_environment_variables(&self) -> EnvironmentStatus {
        verify_environment(&self.settings)
    }

    // == Test Authentication ==
    /// Signs in with a throwaway credential.
    ///
    /// A refusal proves the auth service is up and counts as working.
    pub async fn test_authentication(&self) -> AuthStatus {
        let email = format!("diagnostics-{}@example.invalid", current_timestamp_ms());

        match self
            .guarded(self.backend.sign_in(&email, PROBE_PASSWORD))
            .await
        {
            Ok(AuthOutcome::Accepted) => AuthStatus {
                working: true,
                error: None,
            },
            Ok(AuthOutcome::Rejected(message)) => {
                debug!(message = %message, "probe credentials rejected as expected");
                AuthStatus {
                    working: true,
                    error: None,
                }
            }
            Err(err) => AuthStatus {
                working: false,
                error: Some(err.to_string()),
            },
        }
    }

    // == Run Diagnostics ==
    /// Runs every probe and derives the overall status.
    pub async fn run_diagnostics(&self) -> DiagnosticsReport {
        let environment = self.verify_environment_variables();
        let (connection, auth) = tokio::join!(self.check_connection(), self.test_authentication());

        let report = DiagnosticsReport::from_parts(connection, environment, auth);
        info!(
            overall = ?report.overall,
            recommendations = report.recommendations.len(),
            "diagnostics complete"
        );
        report
    }

    /// Bounds a probe by the timeout and turns a panic into an error.
    async fn guarded<T, F>(&self, probe: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match tokio::time::timeout(self.probe_timeout, AssertUnwindSafe(probe).catch_unwind()).await
        {
            Err(_) => Err(BackendError::Timeout(duration_ms(self.probe_timeout))),
            Ok(Err(panic)) => Err(BackendError::Internal(panic_message(panic.as_ref()))),
            Ok(Ok(result)) => result,
        }
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("settings", &self.settings)
            .field("expected_tables", &self.expected_tables)
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "probe panicked".to_string()
    }
}
