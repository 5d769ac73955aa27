//! Error types for the store subsystem.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error variants for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The sanitization gate rejected the payload.
    #[error("Sanitization failed for '{key}': {reason}")]
    Sanitization {
        /// Key being read or written.
        key: String,
        /// Reason reported by the sanitizer.
        reason: String,
    },

    /// Stored bytes could not be parsed back into a structure.
    #[error("Serialization error for '{key}': {reason}")]
    Serialization {
        /// Key whose contents could not be parsed.
        key: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// The stored structure is not a recognizable envelope and could not be
    /// migrated as legacy data.
    #[error("Unrecognized format for '{key}': {reason}")]
    Format {
        /// Key holding the unrecognized value.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Checksum mismatch with no usable backup.
    #[error("Integrity check failed for '{key}': expected {expected}, actual {actual}")]
    Integrity {
        /// Key that failed verification.
        key: String,
        /// Checksum recorded in the envelope.
        expected: String,
        /// Checksum recomputed from the payload.
        actual: String,
    },

    /// Payload or aggregate usage exceeds the configured limits.
    #[error("Capacity exceeded for '{key}': need {requested} bytes, limit {limit} bytes")]
    Capacity {
        /// Key being written.
        key: String,
        /// Bytes the operation needed.
        requested: u64,
        /// The limit that was hit.
        limit: u64,
    },

    /// The rate limiter denied the operation.
    #[error("Rate limit exceeded for '{key}': {count} operations in current window (max {max})")]
    RateLimited {
        /// Key being throttled.
        key: String,
        /// Operations counted in the current window.
        count: u32,
        /// Configured maximum per window.
        max: u32,
    },

    /// A recovery path was attempted but no backup slot existed.
    #[error("No backup available for '{key}'")]
    BackupUnavailable {
        /// Key that had no backup slot.
        key: String,
    },

    /// The key is empty or uses a prefix reserved for store bookkeeping.
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Wraps standard I/O errors from file-backed media.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the underlying medium.
    #[error("Medium error: {reason}")]
    Medium {
        /// Description of the failure.
        reason: String,
    },
}

impl StoreError {
    /// Returns true for errors caused by stored data being unreadable or
    /// inconsistent, as opposed to limits or I/O.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Serialization { .. }
                | StoreError::Format { .. }
                | StoreError::Integrity { .. }
        )
    }
}
