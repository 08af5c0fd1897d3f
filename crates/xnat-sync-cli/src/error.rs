//! Error types for xnat-sync
//!
//! Request failures are kept apart from local precondition failures so the
//! failure-response policy in [`crate::api::classify`] can act on them
//! without string matching.

use thiserror::Error;
use xnat_sync_common::CommonError;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The archive answered with a non-2xx status
    #[error("({method}) {path} failed: <{code} {phrase:?}>")]
    Status {
        method: String,
        path: String,
        code: u16,
        phrase: String,
        body: Option<String>,
    },

    /// No response was obtained (connection, TLS, DNS, timeout)
    #[error("({method}) {path} failed: {message}")]
    Transport {
        method: String,
        path: String,
        message: String,
    },

    /// A local precondition does not hold; never retried
    #[error("{0}")]
    Validation(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The archive answered 2xx with a body we could not interpret
    #[error("Unexpected response from {path}: {message}")]
    Decode { path: String, message: String },

    /// A request failure escalated by the `quitter` policy
    #[error(transparent)]
    Fatal(Box<SyncError>),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to build import archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Server status failure, looking through a `Fatal` wrapper.
    pub fn is_status(&self) -> bool {
        match self {
            SyncError::Status { .. } => true,
            SyncError::Fatal(inner) => inner.is_status(),
            _ => false,
        }
    }

    /// Status or transport failure of a request.
    pub fn is_request_failure(&self) -> bool {
        match self {
            SyncError::Status { .. } | SyncError::Transport { .. } => true,
            SyncError::Fatal(inner) => inner.is_request_failure(),
            _ => false,
        }
    }

    /// Response body attached to a status failure, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            SyncError::Status { body, .. } => body.as_deref(),
            SyncError::Fatal(inner) => inner.body(),
            _ => None,
        }
    }
}
