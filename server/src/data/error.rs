//! Unified error type for the data layer
//!
//! Wraps failures from the external collaborators (BigData query API, IAM
//! API gateway) while preserving which backend produced them.

use thiserror::Error;

/// Unified error type for data layer operations
#[derive(Error, Debug)]
pub enum DataError {
    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("{backend} returned status {status}")]
    BadStatus { backend: &'static str, status: u16 },

    /// Response body could not be decoded
    #[error("{backend} returned an invalid response: {reason}")]
    InvalidResponse {
        backend: &'static str,
        reason: String,
    },

    /// The collaborator answered with an application-level error code
    #[error("{backend} API error {code}: {message}")]
    Api {
        backend: &'static str,
        code: i64,
        message: String,
    },

    /// Request timeout
    #[error("Request timeout after {timeout_secs}s on {backend}")]
    Timeout {
        backend: &'static str,
        timeout_secs: u64,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DataError {
    pub fn bad_status(backend: &'static str, status: u16) -> Self {
        Self::BadStatus { backend, status }
    }

    pub fn invalid_response(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            backend,
            reason: reason.into(),
        }
    }

    pub fn api(backend: &'static str, code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            backend,
            code,
            message: message.into(),
        }
    }

    pub fn timeout(backend: &'static str, timeout_secs: u64) -> Self {
        Self::Timeout {
            backend,
            timeout_secs,
        }
    }

    /// Map a reqwest error, turning timeouts into `Timeout`
    pub fn from_reqwest(backend: &'static str, timeout_secs: u64, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(backend, timeout_secs)
        } else {
            Self::Http(e)
        }
    }

    /// Check if this is a connection-related error that might be transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::BadStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get the backend name that generated this error
    pub fn backend(&self) -> &'static str {
        match self {
            Self::BadStatus { backend, .. }
            | Self::InvalidResponse { backend, .. }
            | Self::Api { backend, .. }
            | Self::Timeout { backend, .. } => backend,
            Self::Http(_) | Self::Config(_) => "unknown",
        }
    }
}
