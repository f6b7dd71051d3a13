//! Diagnostics report types, serialized as JSON for the operations panel.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Overall health derived from the individual probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
}

/// Result of the reachability probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub error: Option<String>,
    /// Expected table name -> readable
    pub tables: BTreeMap<String, bool>,
}

impl ConnectionStatus {
    /// Expected tables that could not be read.
    pub fn missing_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|(_, reachable)| !**reachable)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Result of the configuration check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentStatus {
    pub valid: bool,
    /// One human-readable line per problem
    pub issues: Vec<String>,
}

/// Result of the authentication probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub working: bool,
    pub error: Option<String>,
}

/// Point-in-time summary of backend health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub overall: HealthStatus,
    pub connection: ConnectionStatus,
    pub environment: EnvironmentStatus,
    pub auth: AuthStatus,
    pub recommendations: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl DiagnosticsReport {
    /// Combines probe results into a report.
    ///
    /// `error` when the configuration is invalid or the backend is
    /// unreachable; `warning` when tables are missing or auth is down.
    pub fn from_parts(
        connection: ConnectionStatus,
        environment: EnvironmentStatus,
        auth: AuthStatus,
    ) -> Self {
        let missing = connection.missing_tables();

        let overall = if !environment.valid || !connection.is_connected {
            HealthStatus::Error
        } else if !missing.is_empty() || !auth.working {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        let mut recommendations = Vec::new();
        if !environment.valid {
            recommendations.push(format!(
                "Fix the backend configuration: {}",
                environment.issues.join("; ")
            ));
        }
        if !connection.is_connected {
            let cause = connection.error.as_deref().unwrap_or("no response");
            recommendations.push(format!(
                "Check that the backend URL is reachable and the project is running ({cause})"
            ));
        } else if !missing.is_empty() {
            recommendations.push(format!(
                "Create the missing tables or grant read access to them: {}",
                missing.join(", ")
            ));
        }
        if !auth.working {
            recommendations.push(
                "Check that the authentication service is enabled and the anon key is valid"
                    .to_string(),
            );
        }

        Self {
            overall,
            connection,
            environment,
            auth,
            recommendations,
            checked_at: Utc::now(),
        }
    }
}
