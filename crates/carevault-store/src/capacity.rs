//! Best-effort capacity accounting.
//!
//! Media do not expose an authoritative quota, so usage is measured by
//! summing key and value lengths of everything stored, and compared against
//! the configured quota estimate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backup::{backup_key, BACKUP_PREFIX};
use crate::error::StoreResult;
use crate::medium::Medium;
use crate::ratelimit::RATE_LIMIT_PREFIX;

/// Serialized overhead of a backup slot around its envelope.
const SLOT_OVERHEAD_BYTES: u64 = 32;

/// Aggregate usage reported by `stats()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Bytes used by all keys.
    pub used: u64,
    /// Bytes left under the quota estimate.
    pub available: u64,
    /// The quota estimate.
    pub total: u64,
    /// Application entries.
    pub entries: usize,
    /// Backup slots.
    pub backups: usize,
}

impl StoreStats {
    /// Fraction of the quota in use, 0.0 to 1.0 (may exceed 1.0).
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64
        }
    }
}

/// Per-key sizes measured from a medium.
#[derive(Debug, Clone, Default)]
pub struct UsageReport {
    sizes: HashMap<String, u64>,
}

impl UsageReport {
    /// Measures every key in `medium`.
    pub async fn measure<M: Medium>(medium: &M) -> StoreResult<Self> {
        let sizes = medium.sizes().await?.into_iter().collect();
        Ok(Self { sizes })
    }

    /// Drops `key` from the report after it was deleted from the medium.
    pub fn forget(&mut self, key: &str) -> u64 {
        self.sizes.remove(key).unwrap_or(0)
    }

    /// Total bytes used.
    pub fn used(&self) -> u64 {
        self.sizes.values().sum()
    }

    /// Size of `key`, zero when absent.
    pub fn size_of(&self, key: &str) -> u64 {
        self.sizes.get(key).copied().unwrap_or(0)
    }

    /// Usage after writing `new_value_len` bytes to `key`, accounting for the
    /// current value moving into the key's backup slot, or the new value
    /// seeding an empty slot.
    pub fn projected(&self, key: &str, new_value_len: u64) -> u64 {
        let slot_key = backup_key(key);
        let current = self.size_of(key);
        let old_slot = self.size_of(&slot_key);

        let new_entry = key.len() as u64 + new_value_len;
        let new_slot = if current > 0 {
            current - key.len() as u64 + slot_key.len() as u64 + SLOT_OVERHEAD_BYTES
        } else if old_slot > 0 {
            old_slot
        } else {
            slot_key.len() as u64 + new_value_len + SLOT_OVERHEAD_BYTES
        };

        self.used() - current - old_slot + new_entry + new_slot
    }

    /// Summarizes against the quota estimate.
    pub fn stats(&self, quota: u64) -> StoreStats {
        let used = self.used();
        let backups = self
            .sizes
            .keys()
            .filter(|k| k.starts_with(BACKUP_PREFIX))
            .count();
        let entries = self.sizes.keys().filter(|k| is_application_key(k)).count();
        StoreStats {
            used,
            available: quota.saturating_sub(used),
            total: quota,
            entries,
            backups,
        }
    }
}

/// True for keys owned by callers rather than by store bookkeeping.
pub fn is_application_key(key: &str) -> bool {
    !key.starts_with(BACKUP_PREFIX) && !key.starts_with(RATE_LIMIT_PREFIX)
}
