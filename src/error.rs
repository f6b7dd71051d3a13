//! Error types for the cache and diagnostics layers
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use thiserror::Error;

// == Storage Error ==
/// Failure of the durable storage behind the persistent store.
///
/// Never crosses the store boundary; the store logs it and treats the entry
/// as absent.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying I/O failed (missing directory, quota, permissions)
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key cannot be mapped to a storage slot
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

// == Fetch Error ==
/// Failure reported by a fetcher.
///
/// Cloneable so one failure can be shared by every caller waiting on the same
/// in-flight fetch and kept in the observable binding state.
#[derive(Error, Debug, Clone)]
#[error("Fetch failed: {0}")]
pub struct FetchError(Arc<anyhow::Error>);

impl FetchError {
    /// Wraps an arbitrary fetcher failure.
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    /// Returns the underlying error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err)
    }
}

// == Backend Error ==
/// Failure talking to the hosted backend during diagnostics.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Probe did not finish in time
    #[error("Probe timed out after {0}ms")]
    Timeout(u64),

    /// Configured base URL is unusable
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// Probe panicked or failed in an unexpected way
    #[error("Probe failed: {0}")]
    Internal(String),
}
