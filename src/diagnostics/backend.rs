//! Backend Probe Module
//!
//! The narrow slice of the hosted backend the diagnostics need: a reachability
//! ping, per-table reads and a sign-in attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::{json, Value};

use crate::error::BackendError;

/// Longest backend error body carried into a report.
const MAX_ERROR_BODY: usize = 200;

// == Auth Outcome ==
/// Answer of the authentication service to a sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials accepted
    Accepted,
    /// Service reachable, credentials refused
    Rejected(String),
}

// == Backend Trait ==
/// Operations probed by the diagnostics.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Minimal request proving the backend answers.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Reads at most one row from `table`.
    async fn probe_table(&self, table: &str) -> Result<(), BackendError>;

    /// Attempts a password sign-in.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthOutcome, BackendError>;
}

// == REST Backend ==
/// Hosted Postgres backend reached over its REST and auth HTTP APIs.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base_url: Url,
    anon_key: String,
}

impl RestBackend {
    /// Creates a client for the project at `base_url`.
    ///
    /// `timeout` bounds every request.
    pub fn new(
        base_url: &str,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut url = Url::parse(base_url)
            .map_err(|err| BackendError::InvalidUrl(format!("{base_url}: {err}")))?;
        if url.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(base_url.to_string()));
        }
        // Keep any path prefix when joining endpoint paths
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: url,
            anon_key: anon_key.into(),
        })
    }

    /// Base URL all endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|err| BackendError::InvalidUrl(format!("{path}: {err}")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        let request = self.authorized(self.client.get(self.endpoint("rest/v1/")?));
        ensure_success(request.send().await?).await?;
        Ok(())
    }

    async fn probe_table(&self, table: &str) -> Result<(), BackendError> {
        let request = self
            .authorized(self.client.get(self.endpoint(&format!("rest/v1/{table}"))?))
            .query(&[("select", "*"), ("limit", "1")]);
        ensure_success(request.send().await?).await?;
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthOutcome, BackendError> {
        let request = self
            .authorized(self.client.post(self.endpoint("auth/v1/token")?))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let response = request.send().await?;

        match response.status() {
            status if status.is_success() => Ok(AuthOutcome::Accepted),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                Ok(AuthOutcome::Rejected(auth_message(&body)))
            }
            _ => Err(status_error(response).await),
        }
    }
}

// == Unreachable Backend ==
/// Stand-in used when the configured backend cannot even be constructed.
///
/// Every probe fails with the construction error, so the diagnostics still
/// produce a report.
#[derive(Debug, Clone)]
pub struct UnreachableBackend {
    reason: String,
}

impl UnreachableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Backend for UnreachableBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        Err(BackendError::InvalidUrl(self.reason.clone()))
    }

    async fn probe_table(&self, _table: &str) -> Result<(), BackendError> {
        Err(BackendError::InvalidUrl(self.reason.clone()))
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<AuthOutcome, BackendError> {
        Err(BackendError::InvalidUrl(self.reason.clone()))
    }
}

// == Utility Functions ==
async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(status_error(response).await)
    }
}

async fn status_error(response: Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::Status {
        status,
        message: truncate(&body, MAX_ERROR_BODY),
    }
}

/// Picks the human-readable message out of an auth error body.
fn auth_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|field| value.get(*field).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| truncate(body, MAX_ERROR_BODY))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
