//! Single-slot backup and recovery.
//!
//! Each key has at most one backup slot, stored under `"_recovery_" + key`,
//! holding the envelope that occupied the key just before its most recent
//! overwrite. A key's first verified write seeds its slot, so every stored
//! key is recoverable. There is no history chain: a new backup replaces the
//! old one.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::envelope::{decode, Decoded, StorageEnvelope};
use crate::error::{StoreError, StoreResult};
use crate::medium::Medium;

/// Prefix of backup slot keys.
pub const BACKUP_PREFIX: &str = "_recovery_";

/// Returns the backup slot key for `key`.
pub fn backup_key(key: &str) -> String {
    format!("{}{}", BACKUP_PREFIX, key)
}

/// A persisted backup slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSlot {
    /// When the slot was created, ms since epoch.
    pub backed_up_at: i64,
    /// The last known-good envelope for the key.
    pub envelope: StorageEnvelope,
}

/// Creates, restores and prunes backup slots.
#[derive(Debug, Clone)]
pub struct BackupManager {
    retention_ms: u64,
}

impl BackupManager {
    /// Creates a manager pruning slots older than `retention_ms`.
    pub fn new(retention_ms: u64) -> Self {
        Self { retention_ms }
    }

    /// The retention window in milliseconds.
    pub fn retention_ms(&self) -> u64 {
        self.retention_ms
    }

    /// Copies the envelope currently at `key` into its backup slot.
    ///
    /// Only an intact envelope is copied: a corrupt or legacy value never
    /// overwrites a good slot. Returns whether a backup was written.
    pub async fn create_backup<M: Medium>(
        &self,
        medium: &M,
        key: &str,
        now_ms: i64,
    ) -> StoreResult<bool> {
        let Some(raw) = medium.get(key).await? else {
            return Ok(false);
        };
        let envelope = match decode(&raw) {
            Decoded::Envelope(env) if env.is_intact() => env,
            _ => {
                debug!(key = %key, "current value is not an intact envelope, keeping existing backup");
                return Ok(false);
            }
        };

        self.write_slot(medium, key, envelope, now_ms).await?;
        debug!(key = %key, "created backup slot");
        Ok(true)
    }

    /// Seeds an empty slot for `key` with a freshly verified envelope, so a
    /// key is recoverable from its first write on. An existing slot is kept.
    /// Returns whether a slot was written.
    pub async fn seed<M: Medium>(
        &self,
        medium: &M,
        key: &str,
        envelope: &StorageEnvelope,
        now_ms: i64,
    ) -> StoreResult<bool> {
        if self.read_slot(medium, key).await?.is_some() {
            return Ok(false);
        }
        self.write_slot(medium, key, envelope.clone(), now_ms).await?;
        debug!(key = %key, "seeded backup slot");
        Ok(true)
    }

    async fn write_slot<M: Medium>(
        &self,
        medium: &M,
        key: &str,
        envelope: StorageEnvelope,
        now_ms: i64,
    ) -> StoreResult<()> {
        let slot = BackupSlot {
            backed_up_at: now_ms,
            envelope,
        };
        let raw_slot = serde_json::to_string(&slot).map_err(|e| StoreError::Serialization {
            key: backup_key(key),
            reason: e.to_string(),
        })?;
        medium.put(&backup_key(key), raw_slot).await
    }

    /// Reads the backup slot for `key`. An unreadable slot counts as absent.
    pub async fn read_slot<M: Medium>(&self, medium: &M, key: &str) -> StoreResult<Option<BackupSlot>> {
        let slot_key = backup_key(key);
        let Some(raw) = medium.get(&slot_key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<BackupSlot>(&raw) {
            Ok(slot) => Ok(Some(slot)),
            Err(e) => {
                warn!(key = %key, error = %e, "backup slot is corrupt, ignoring");
                Ok(None)
            }
        }
    }

    /// Copies the backup slot's envelope back over `key`.
    /// Returns whether a backup existed.
    pub async fn restore<M: Medium>(&self, medium: &M, key: &str) -> StoreResult<bool> {
        let Some(slot) = self.read_slot(medium, key).await? else {
            return Ok(false);
        };
        if !slot.envelope.is_intact() {
            warn!(key = %key, "backup slot fails its checksum, not restoring");
            return Ok(false);
        }
        let raw = slot
            .envelope
            .to_json()
            .map_err(|e| StoreError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        medium.put(key, raw).await?;
        info!(key = %key, backed_up_at = slot.backed_up_at, "restored from backup slot");
        Ok(true)
    }

    /// Removes the slot for `key` if it is older than the retention window,
    /// or unconditionally when `force` is set. Returns whether it was removed.
    pub async fn prune<M: Medium>(
        &self,
        medium: &M,
        key: &str,
        now_ms: i64,
        force: bool,
    ) -> StoreResult<bool> {
        if !force {
            match self.read_slot(medium, key).await? {
                Some(slot) if self.is_stale(&slot, now_ms) => {}
                _ => return Ok(false),
            }
        }
        medium.delete(&backup_key(key)).await?;
        debug!(key = %key, force, "pruned backup slot");
        Ok(true)
    }

    /// Deletes the slot for `key` regardless of age.
    pub async fn remove<M: Medium>(&self, medium: &M, key: &str) -> StoreResult<()> {
        medium.delete(&backup_key(key)).await
    }

    /// Removes every slot older than the retention window, and every slot
    /// that can no longer be parsed. Returns the number removed.
    pub async fn prune_stale<M: Medium>(&self, medium: &M, now_ms: i64) -> StoreResult<usize> {
        let mut removed = 0;
        for (slot_key, slot) in self.scan(medium).await? {
            let stale = match &slot {
                Some(slot) => self.is_stale(slot, now_ms),
                None => true,
            };
            if stale {
                medium.delete(&slot_key).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "pruned stale backup slots");
        }
        Ok(removed)
    }

    /// Removes the oldest slot not belonging to `exclude`.
    /// Returns the owning key of the evicted slot, if any.
    pub async fn evict_oldest<M: Medium>(
        &self,
        medium: &M,
        exclude: &str,
    ) -> StoreResult<Option<String>> {
        let excluded = backup_key(exclude);
        let oldest = self
            .scan(medium)
            .await?
            .into_iter()
            .filter(|(slot_key, _)| *slot_key != excluded)
            .min_by_key(|(_, slot)| slot.as_ref().map(|s| s.backed_up_at).unwrap_or(i64::MIN));

        let Some((slot_key, _)) = oldest else {
            return Ok(None);
        };
        medium.delete(&slot_key).await?;
        let owner = slot_key[BACKUP_PREFIX.len()..].to_string();
        warn!(key = %owner, "evicted backup slot to reclaim space");
        Ok(Some(owner))
    }

    fn is_stale(&self, slot: &BackupSlot, now_ms: i64) -> bool {
        now_ms.saturating_sub(slot.backed_up_at) > self.retention_ms as i64
    }

    async fn scan<M: Medium>(&self, medium: &M) -> StoreResult<Vec<(String, Option<BackupSlot>)>> {
        let mut slots = Vec::new();
        for slot_key in medium.keys().await? {
            if !slot_key.starts_with(BACKUP_PREFIX) {
                continue;
            }
            let slot = match medium.get(&slot_key).await? {
                Some(raw) => serde_json::from_str::<BackupSlot>(&raw).ok(),
                None => continue,
            };
            slots.push((slot_key, slot));
        }
        Ok(slots)
    }
}
