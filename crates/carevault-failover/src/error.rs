//! Error types for record backends.

use carevault_store::StoreError;
use thiserror::Error;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Error variants for record backends and the failover orchestrator.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The remote backend answered with a non-success status.
    #[error("Remote backend returned {status}: {reason}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        reason: String,
    },

    /// The request never completed: connection refused, timeout, TLS.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response or stored record did not have the expected shape.
    #[error("Decode error: {reason}")]
    Decode {
        /// Description of the mismatch.
        reason: String,
    },

    /// The collection name cannot be used as a key segment.
    #[error("Invalid collection '{name}': {reason}")]
    InvalidCollection {
        /// The rejected collection name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configured base URL cannot carry record paths.
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The local store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl BackendError {
    /// Shorthand for a [`BackendError::Decode`].
    pub fn decode(reason: impl Into<String>) -> Self {
        BackendError::Decode {
            reason: reason.into(),
        }
    }
}
