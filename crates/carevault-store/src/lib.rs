#![warn(missing_docs)]

//! CareVault store subsystem: integrity-checked key/value persistence
//!
//! This crate wraps an unreliable key/value medium with checksummed
//! envelopes, single-slot backups that heal corrupted entries on read,
//! best-effort quota accounting with backup pruning, and a fixed-window
//! rate limiter that fails open.

pub mod backup;
pub mod capacity;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod file_medium;
pub mod keylock;
pub mod medium;
pub mod metrics;
pub mod ratelimit;
pub mod sanitize;
pub mod store;

pub use backup::{backup_key, BackupManager, BackupSlot, BACKUP_PREFIX};
pub use capacity::{StoreStats, UsageReport};
pub use checksum::{Checksum, ChecksumAlgorithm};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use envelope::{StorageEnvelope, FORMAT_VERSION};
pub use error::{StoreError, StoreResult};
pub use file_medium::FileMedium;
pub use medium::{Medium, MediumStats, MemoryMedium};
pub use metrics::StoreMetricsSnapshot;
pub use ratelimit::{rate_key, RateLimitConfig, RateWindow, RATE_LIMIT_PREFIX};
pub use sanitize::{PassthroughSanitizer, SanitizeError, Sanitizer, TextSanitizer, TextSanitizerConfig};
pub use store::IntegrityStore;
