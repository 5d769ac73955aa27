//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::checksum::ChecksumAlgorithm;
use crate::ratelimit::RateLimitConfig;

/// Default maximum serialized payload size (5 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 5 * 1024 * 1024;
/// Default aggregate quota estimate (10 MiB).
pub const DEFAULT_QUOTA_BYTES: u64 = 10 * 1024 * 1024;
/// Default backup retention window (24 hours).
pub const DEFAULT_BACKUP_RETENTION_MS: u64 = 24 * 60 * 60 * 1000;

/// Limits and policies for an [`IntegrityStore`](crate::IntegrityStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Largest serialized payload accepted by `save`.
    pub max_payload_bytes: u64,
    /// Estimated total capacity of the medium; the medium itself does not
    /// report an authoritative quota.
    pub quota_bytes: u64,
    /// Age after which a backup slot is pruned.
    pub backup_retention_ms: u64,
    /// Algorithm used for newly written envelopes.
    pub checksum: ChecksumAlgorithm,
    /// Per-key operation throttling.
    pub rate_limit: RateLimitConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            quota_bytes: DEFAULT_QUOTA_BYTES,
            backup_retention_ms: DEFAULT_BACKUP_RETENTION_MS,
            checksum: ChecksumAlgorithm::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
