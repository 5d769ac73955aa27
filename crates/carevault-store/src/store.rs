//! The integrity-checked store.
//!
//! Every value is wrapped in a [`StorageEnvelope`] carrying a checksum of its
//! serialized payload. Writes snapshot the previous envelope into the key's
//! backup slot, then read back and verify what they wrote. Reads verify the
//! checksum and restore from the backup slot when the stored bytes are
//! unparseable or do not match, so corruption heals locally whenever a
//! backup exists. Only unrecoverable situations surface as errors.
//!
//! Operations on the same key are serialized by a per-key async mutex.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backup::{backup_key, BackupManager, BACKUP_PREFIX};
use crate::capacity::{is_application_key, StoreStats, UsageReport};
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::envelope::{decode, Decoded, StorageEnvelope};
use crate::error::{StoreError, StoreResult};
use crate::keylock::KeyLocks;
use crate::medium::Medium;
use crate::metrics::{StoreMetrics, StoreMetricsSnapshot};
use crate::ratelimit::{RateDecision, RateLimiter, RATE_LIMIT_PREFIX};
use crate::sanitize::{PassthroughSanitizer, Sanitizer};

/// Key/value store with envelopes, backup slots, quotas and rate limiting.
pub struct IntegrityStore<M: Medium> {
    medium: M,
    sanitizer: Arc<dyn Sanitizer>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    limiter: RateLimiter,
    backups: BackupManager,
    locks: KeyLocks,
    metrics: StoreMetrics,
}

impl<M: Medium> IntegrityStore<M> {
    /// Creates a store over `medium` with a passthrough sanitizer and the
    /// system clock.
    pub fn new(medium: M, config: StoreConfig) -> Self {
        info!(
            quota_bytes = config.quota_bytes,
            max_payload_bytes = config.max_payload_bytes,
            checksum = %config.checksum,
            "creating integrity store"
        );
        Self {
            medium,
            sanitizer: Arc::new(PassthroughSanitizer),
            clock: Arc::new(SystemClock),
            limiter: RateLimiter::new(config.rate_limit),
            backups: BackupManager::new(config.backup_retention_ms),
            config,
            locks: KeyLocks::new(),
            metrics: StoreMetrics::new(),
        }
    }

    /// Replaces the sanitization gate.
    pub fn with_sanitizer(mut self, sanitizer: impl Sanitizer + 'static) -> Self {
        self.sanitizer = Arc::new(sanitizer);
        self
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The underlying medium.
    pub fn medium(&self) -> &M {
        &self.medium
    }

    /// The active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current time according to the store's clock.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Current counter values.
    pub fn metrics(&self) -> StoreMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Sanitizes, envelopes and writes `value` at `key`, returning the
    /// sanitized value that was stored.
    pub async fn save(&self, key: &str, value: Value) -> StoreResult<Value> {
        validate_key(key)?;
        let _guard = self.locks.lock(key).await;
        self.save_locked(key, value).await
    }

    /// Reads the value at `key`, recovering from the backup slot if the
    /// stored envelope is unreadable or fails its checksum.
    pub async fn load(&self, key: &str) -> StoreResult<Option<Value>> {
        validate_key(key)?;
        let _guard = self.locks.lock(key).await;
        let result = self.load_locked(key).await;
        if result.is_ok() {
            self.metrics.loads();
        }
        result
    }

    /// Deletes `key` and its backup slot. Idempotent. The key's rate window
    /// survives until it elapses, so removing a key does not reset its limit.
    pub async fn remove(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        let _guard = self.locks.lock(key).await;
        self.remove_locked(key).await?;
        self.metrics.removes();
        debug!(key = %key, "removed entry");
        Ok(())
    }

    /// Deletes application keys starting with any of `prefixes`, together
    /// with their backup slots and any elapsed rate windows. Empty prefixes
    /// are ignored, so this can never wipe the whole medium. Returns the
    /// number of entries removed.
    pub async fn clear_scoped<P: AsRef<str>>(&self, prefixes: &[P]) -> StoreResult<usize> {
        let prefixes: Vec<&str> = prefixes
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| {
                if p.is_empty() {
                    warn!("ignoring empty prefix in scoped clear");
                }
                !p.is_empty()
            })
            .collect();
        if prefixes.is_empty() {
            return Ok(0);
        }
        let in_scope = |key: &str| prefixes.iter().any(|p| key.starts_with(p));

        let mut removed = 0;
        for key in self.medium.keys().await? {
            if is_application_key(&key) {
                if !in_scope(&key) {
                    continue;
                }
                let _guard = self.locks.lock(&key).await;
                self.remove_locked(&key).await?;
                removed += 1;
            } else if let Some(owner) = key.strip_prefix(BACKUP_PREFIX) {
                // Orphaned slot for a key that is already gone.
                if in_scope(owner) {
                    self.medium.delete(&key).await?;
                }
            } else if let Some(owner) = key.strip_prefix(RATE_LIMIT_PREFIX) {
                if in_scope(owner) {
                    self.limiter
                        .release(&self.medium, owner, self.clock.now_ms())
                        .await?;
                }
            }
        }
        info!(removed, prefixes = ?prefixes, "scoped clear complete");
        Ok(removed)
    }

    /// Best-effort usage accounting against the quota estimate.
    pub async fn stats(&self) -> StoreResult<StoreStats> {
        let report = UsageReport::measure(&self.medium).await?;
        Ok(report.stats(self.config.quota_bytes))
    }

    /// Application keys starting with `prefix`, sorted.
    pub async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .medium
            .keys()
            .await?
            .into_iter()
            .filter(|k| is_application_key(k) && k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Restores `key` from its backup slot.
    pub async fn recover(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        let _guard = self.locks.lock(key).await;
        if self.try_recover(key).await? {
            Ok(())
        } else {
            Err(StoreError::BackupUnavailable {
                key: key.to_string(),
            })
        }
    }

    /// Removes every backup slot older than the retention window.
    pub async fn prune_backups(&self) -> StoreResult<usize> {
        let removed = self
            .backups
            .prune_stale(&self.medium, self.clock.now_ms())
            .await?;
        self.metrics.backups_pruned(removed as u64);
        Ok(removed)
    }

    async fn save_locked(&self, key: &str, value: Value) -> StoreResult<Value> {
        let clean = self.sanitize(key, value)?;
        let now = self.clock.now_ms();

        if let RateDecision::Deny { count } = self
            .limiter
            .check_and_increment(&self.medium, key, now)
            .await
        {
            self.metrics.rate_limited();
            return Err(StoreError::RateLimited {
                key: key.to_string(),
                count,
                max: self.config.rate_limit.max_operations,
            });
        }

        let envelope = StorageEnvelope::seal(clean, self.config.checksum, now);
        if envelope.byte_size > self.config.max_payload_bytes {
            self.metrics.capacity_rejections();
            return Err(StoreError::Capacity {
                key: key.to_string(),
                requested: envelope.byte_size,
                limit: self.config.max_payload_bytes,
            });
        }
        let raw = envelope.to_json().map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        self.ensure_space(key, raw.len() as u64, now).await?;
        let backed_up = self.backups.create_backup(&self.medium, key, now).await?;

        if let Err(e) = self.medium.put(key, raw).await {
            if matches!(e, StoreError::Capacity { .. }) {
                self.metrics.capacity_rejections();
            }
            return Err(e);
        }

        self.verify_written(key, &envelope).await?;
        if !backed_up {
            self.backups.seed(&self.medium, key, &envelope, now).await?;
        }

        if self.backups.prune(&self.medium, key, now, false).await? {
            self.metrics.backups_pruned(1);
        }

        self.metrics.saves();
        debug!(key = %key, size = envelope.byte_size, checksum = %envelope.checksum, "saved entry");
        Ok(envelope.payload)
    }

    async fn load_locked(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut recovered = false;
        loop {
            let Some(raw) = self.medium.get(key).await? else {
                return Ok(None);
            };

            match decode(&raw) {
                Decoded::Envelope(envelope) => {
                    let actual = envelope.recompute();
                    if actual == envelope.checksum {
                        return self.sanitize(key, envelope.payload).map(Some);
                    }
                    warn!(
                        key = %key,
                        expected = %envelope.checksum,
                        actual = %actual,
                        "checksum mismatch on load"
                    );
                    if !recovered && self.try_recover(key).await? {
                        recovered = true;
                        continue;
                    }
                    self.metrics.integrity_failures();
                    return Err(StoreError::Integrity {
                        key: key.to_string(),
                        expected: envelope.checksum.to_string(),
                        actual: actual.to_string(),
                    });
                }
                Decoded::Unparseable(reason) => {
                    warn!(key = %key, reason = %reason, "unparseable entry on load");
                    if !recovered && self.try_recover(key).await? {
                        recovered = true;
                        continue;
                    }
                    self.metrics.integrity_failures();
                    return Err(StoreError::Serialization {
                        key: key.to_string(),
                        reason,
                    });
                }
                Decoded::UnsupportedVersion(version) => {
                    return Err(StoreError::Format {
                        key: key.to_string(),
                        reason: format!("unsupported envelope version '{}'", version),
                    });
                }
                Decoded::Legacy(value) => {
                    return self.migrate_legacy(key, value).await.map(Some);
                }
            }
        }
    }

    async fn migrate_legacy(&self, key: &str, value: Value) -> StoreResult<Value> {
        info!(key = %key, "migrating pre-envelope value");
        match self.save_locked(key, value).await {
            Ok(saved) => {
                self.metrics.legacy_migrations();
                Ok(saved)
            }
            Err(e) => Err(StoreError::Format {
                key: key.to_string(),
                reason: format!("legacy value could not be migrated: {}", e),
            }),
        }
    }

    async fn remove_locked(&self, key: &str) -> StoreResult<()> {
        self.medium.delete(key).await?;
        self.backups.remove(&self.medium, key).await?;
        self.limiter
            .release(&self.medium, key, self.clock.now_ms())
            .await?;
        Ok(())
    }

    async fn try_recover(&self, key: &str) -> StoreResult<bool> {
        let restored = self.backups.restore(&self.medium, key).await?;
        if restored {
            self.metrics.recoveries();
            warn!(key = %key, "recovered entry from backup slot");
        }
        Ok(restored)
    }

    async fn verify_written(&self, key: &str, written: &StorageEnvelope) -> StoreResult<()> {
        let readback = self.medium.get(key).await?;
        let actual = match readback.as_deref().map(decode) {
            Some(Decoded::Envelope(stored)) => {
                let actual = stored.recompute();
                if actual == written.checksum && stored.checksum == written.checksum {
                    return Ok(());
                }
                actual.to_string()
            }
            Some(_) => "unreadable".to_string(),
            None => "missing".to_string(),
        };

        warn!(key = %key, expected = %written.checksum, actual = %actual, "write verification failed");
        self.metrics.integrity_failures();
        if self.try_recover(key).await? {
            info!(key = %key, "rolled back failed write");
        }
        Err(StoreError::Integrity {
            key: key.to_string(),
            expected: written.checksum.to_string(),
            actual,
        })
    }

    async fn ensure_space(&self, key: &str, new_len: u64, now: i64) -> StoreResult<()> {
        let quota = self.config.quota_bytes;
        if quota == 0 {
            return Ok(());
        }

        let mut report = UsageReport::measure(&self.medium).await?;
        if report.projected(key, new_len) <= quota {
            return Ok(());
        }

        let pruned = self.backups.prune_stale(&self.medium, now).await?;
        if pruned > 0 {
            self.metrics.backups_pruned(pruned as u64);
            report = UsageReport::measure(&self.medium).await?;
        }

        let mut projected = report.projected(key, new_len);
        while projected > quota {
            match self.backups.evict_oldest(&self.medium, key).await? {
                Some(owner) => {
                    self.metrics.backups_pruned(1);
                    report.forget(&backup_key(&owner));
                    projected = report.projected(key, new_len);
                }
                None => {
                    self.metrics.capacity_rejections();
                    return Err(StoreError::Capacity {
                        key: key.to_string(),
                        requested: projected,
                        limit: quota,
                    });
                }
            }
        }
        Ok(())
    }

    fn sanitize(&self, key: &str, value: Value) -> StoreResult<Value> {
        self.sanitizer
            .clean(value)
            .map_err(|e| StoreError::Sanitization {
                key: key.to_string(),
                reason: e.reason,
            })
    }
}

fn validate_key(key: &str) -> StoreResult<()> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if !is_application_key(key) {
        "prefix is reserved for store bookkeeping"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::medium::MemoryMedium;
    use crate::ratelimit::RateLimitConfig;
    use crate::sanitize::TextSanitizer;
    use serde_json::json;

    const HOUR: i64 = 60 * 60 * 1000;

    fn store() -> (IntegrityStore<MemoryMedium>, ManualClock) {
        store_with(StoreConfig::default())
    }

    fn store_with(config: StoreConfig) -> (IntegrityStore<MemoryMedium>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let store = IntegrityStore::new(MemoryMedium::new(), config).with_clock(clock.clone());
        (store, clock)
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let (store, _) = store();
        let saved = store.save("patient_1", json!({"name": "A", "age": 30})).await.unwrap();
        assert_eq!(saved, json!({"name": "A", "age": 30}));
        let loaded = store.load("patient_1").await.unwrap();
        assert_eq!(loaded, Some(json!({"name": "A", "age": 30})));
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let (store, _) = store();
        assert_eq!(store.load("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stored_form_is_envelope() {
        let (store, clock) = store();
        store.save("k", json!([1, 2])).await.unwrap();
        let raw = store.medium().get("k").await.unwrap().unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["format_version"], "1.0");
        assert_eq!(stored["written_at"], clock.now_ms());
        assert_eq!(stored["payload"], json!([1, 2]));
        assert_eq!(stored["byte_size"], 5);
        assert!(stored["checksum"].as_str().unwrap().starts_with("crc32:"));
    }

    #[tokio::test]
    async fn test_backup_slot_holds_previous_envelope() {
        let (store, _) = store();
        for (value, expected_slot) in [(1, 1), (2, 1), (3, 2)] {
            store.save("k", json!(value)).await.unwrap();
            let slot = store.backups.read_slot(store.medium(), "k").await.unwrap().unwrap();
            assert_eq!(slot.envelope.payload, json!(expected_slot));
        }
    }

    #[tokio::test]
    async fn test_unparseable_entry_recovers_from_backup() {
        let (store, _) = store();
        store.save("k", json!("v1")).await.unwrap();
        store.save("k", json!("v2")).await.unwrap();
        store.medium().put("k", "}}garbage".to_string()).await.unwrap();

        assert_eq!(store.load("k").await.unwrap(), Some(json!("v1")));
        assert_eq!(store.metrics().recoveries, 1);
        // The restored envelope is now the primary value.
        assert_eq!(store.load("k").await.unwrap(), Some(json!("v1")));
    }

    #[tokio::test]
    async fn test_unparseable_without_backup_is_serialization_error() {
        let (store, _) = store();
        store.save("k", json!("v1")).await.unwrap();
        store.backups.remove(store.medium(), "k").await.unwrap();
        store.medium().put("k", "{\"truncated".to_string()).await.unwrap();
        let err = store.load("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_without_backup_is_integrity_error() {
        let (store, _) = store();
        store.save("k", json!({"name": "A"})).await.unwrap();
        store.backups.remove(store.medium(), "k").await.unwrap();
        let raw = store.medium().get("k").await.unwrap().unwrap();
        store.medium().put("k", raw.replace("\"A\"", "\"B\"")).await.unwrap();

        let err = store.load("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Integrity { .. }));
        assert_eq!(store.metrics().integrity_failures, 1);
    }

    #[tokio::test]
    async fn test_corrupt_backup_does_not_loop() {
        let (store, _) = store();
        store.save("k", json!({"name": "A"})).await.unwrap();
        store.save("k", json!({"name": "B"})).await.unwrap();

        // Corrupt the backup's payload while leaving it structurally valid.
        let slot_raw = store.medium().get(&backup_key("k")).await.unwrap().unwrap();
        store
            .medium()
            .put(&backup_key("k"), slot_raw.replace("\"A\"", "\"Z\""))
            .await
            .unwrap();
        let raw = store.medium().get("k").await.unwrap().unwrap();
        store.medium().put("k", raw.replace("\"B\"", "\"C\"")).await.unwrap();

        let err = store.load("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_legacy_value_is_migrated() {
        let (store, _) = store();
        store
            .medium()
            .put("old", r#"{"name":"Legacy"}"#.to_string())
            .await
            .unwrap();

        assert_eq!(store.load("old").await.unwrap(), Some(json!({"name": "Legacy"})));
        let raw = store.medium().get("old").await.unwrap().unwrap();
        assert!(matches!(decode(&raw), Decoded::Envelope(_)));
        assert_eq!(store.metrics().legacy_migrations, 1);
    }

    #[tokio::test]
    async fn test_legacy_migration_failure_is_format_error() {
        let (store, _) = store();
        let store = store.with_sanitizer(TextSanitizer::default());
        store
            .medium()
            .put("old", r#"{"notes":"<script>x</script>"}"#.to_string())
            .await
            .unwrap();
        let err = store.load("old").await.unwrap_err();
        assert!(matches!(err, StoreError::Format { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_version_is_format_error() {
        let (store, _) = store();
        let mut env = StorageEnvelope::seal(json!(1), Default::default(), 0);
        env.format_version = "9.0".to_string();
        store.medium().put("k", env.to_json().unwrap()).await.unwrap();
        assert!(matches!(store.load("k").await, Err(StoreError::Format { .. })));
    }

    #[tokio::test]
    async fn test_sanitizer_applied_on_save() {
        let (store, _) = store();
        let store = store.with_sanitizer(TextSanitizer::default());
        let saved = store.save("k", json!({"name": "A\u{0000}B"})).await.unwrap();
        assert_eq!(saved, json!({"name": "AB"}));

        let err = store.save("k", json!("<script>")).await.unwrap_err();
        assert!(matches!(err, StoreError::Sanitization { .. }));
        assert_eq!(store.load("k").await.unwrap(), Some(json!({"name": "AB"})));
    }

    #[tokio::test]
    async fn test_sanitizer_applied_on_load() {
        let (store, _) = store();
        store.save("k", json!("<script>")).await.unwrap();
        let store = store.with_sanitizer(TextSanitizer::default());
        let err = store.load("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Sanitization { .. }));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_and_previous_kept() {
        let (store, _) = store_with(StoreConfig {
            max_payload_bytes: 16,
            ..StoreConfig::default()
        });
        store.save("k", json!("small")).await.unwrap();
        let err = store.save("k", json!("a string that is far too long")).await.unwrap_err();
        assert!(matches!(err, StoreError::Capacity { limit: 16, .. }));
        assert_eq!(store.load("k").await.unwrap(), Some(json!("small")));
        assert_eq!(store.metrics().capacity_rejections, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_window() {
        let (store, clock) = store_with(StoreConfig {
            rate_limit: RateLimitConfig::new(60_000, 3),
            ..StoreConfig::default()
        });
        for i in 0..3 {
            store.save("k", json!(i)).await.unwrap();
        }
        let err = store.save("k", json!(3)).await.unwrap_err();
        assert!(matches!(err, StoreError::RateLimited { count: 4, max: 3, .. }));

        clock.advance(60_001);
        store.save("k", json!(4)).await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), Some(json!(4)));
    }

    #[tokio::test]
    async fn test_aggregate_quota_evicts_backups_first() {
        let (store, clock) = store_with(StoreConfig {
            quota_bytes: 7_600,
            rate_limit: RateLimitConfig::unlimited(),
            ..StoreConfig::default()
        });
        let filler = "x".repeat(1_000);
        for key in ["a", "b", "c"] {
            store.save(key, json!(filler)).await.unwrap();
            clock.advance(1);
            store.save(key, json!(filler)).await.unwrap();
            clock.advance(1);
        }
        assert_eq!(store.stats().await.unwrap().backups, 3);

        store.save("d", json!(filler)).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert!(stats.used <= 7_600);
        assert!(stats.backups < 3);
        assert!(store.metrics().backups_pruned >= 1);
    }

    #[tokio::test]
    async fn test_aggregate_quota_rejects_when_nothing_to_prune() {
        let (store, _) = store_with(StoreConfig {
            quota_bytes: 600,
            rate_limit: RateLimitConfig::unlimited(),
            ..StoreConfig::default()
        });
        store.save("a", json!("x".repeat(100))).await.unwrap();
        let err = store.save("b", json!("y".repeat(200))).await.unwrap_err();
        assert!(matches!(err, StoreError::Capacity { limit: 600, .. }));
        assert_eq!(store.load("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_backup_pruned_after_save() {
        let (store, clock) = store();
        store.save("k", json!(1)).await.unwrap();
        store.save("k", json!(2)).await.unwrap();
        assert_eq!(store.stats().await.unwrap().backups, 1);

        clock.advance(25 * HOUR);
        assert_eq!(store.prune_backups().await.unwrap(), 1);
        assert_eq!(store.stats().await.unwrap().backups, 0);
    }

    #[tokio::test]
    async fn test_float_payloads_verify_after_write() {
        let (store, _) = store_with(StoreConfig {
            rate_limit: RateLimitConfig::unlimited(),
            ..StoreConfig::default()
        });
        let fees = [0.10619999999999999, 1.0715660391465826e-75, 0.1 + 0.2, -0.0, 1e300];
        for fee in fees {
            let saved = store.save("bill", json!({ "fee": fee })).await.unwrap();
            assert_eq!(saved, json!({ "fee": fee }));
            assert_eq!(store.load("bill").await.unwrap(), Some(json!({ "fee": fee })));
        }
        for cents in 0..2_000u32 {
            let fee = cents as f64 / 100.0 * 1.18;
            store.save("bill", json!(fee)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_remove_deletes_entry_and_backup() {
        let (store, clock) = store();
        store.save("k", json!(1)).await.unwrap();
        store.save("k", json!(2)).await.unwrap();
        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), None);
        assert!(store.medium().get(&backup_key("k")).await.unwrap().is_none());
        assert_eq!(store.medium().len(), 1);

        clock.advance(61_000);
        store.remove("k").await.unwrap();
        assert!(store.medium().is_empty());
    }

    #[tokio::test]
    async fn test_remove_does_not_reset_rate_window() {
        let (store, clock) = store_with(StoreConfig {
            rate_limit: RateLimitConfig::new(60_000, 3),
            ..StoreConfig::default()
        });

        let mut allowed = 0;
        for _ in 0..4 {
            for n in 0..3 {
                if store.save("bill", json!(n)).await.is_ok() {
                    allowed += 1;
                }
            }
            store.remove("bill").await.unwrap();
        }
        assert_eq!(allowed, 3);

        let err = store.save("bill", json!(9)).await.unwrap_err();
        assert!(matches!(err, StoreError::RateLimited { .. }));

        clock.advance(60_001);
        store.save("bill", json!(9)).await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_scoped_does_not_reset_rate_window() {
        let (store, _) = store_with(StoreConfig {
            rate_limit: RateLimitConfig::new(60_000, 1),
            ..StoreConfig::default()
        });
        store.save("patients:1", json!(1)).await.unwrap();
        assert_eq!(store.clear_scoped(&["patients:"]).await.unwrap(), 1);

        let err = store.save("patients:1", json!(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_quota_check_reads_no_stored_values() {
        let (store, _) = store_with(StoreConfig {
            rate_limit: RateLimitConfig::unlimited(),
            ..StoreConfig::default()
        });
        for i in 0..50 {
            store.save(&format!("filler:{}", i), json!(i)).await.unwrap();
        }

        let before = store.medium().stats().reads;
        store.save("patient_1", json!({"name": "A"})).await.unwrap();
        let reads = store.medium().stats().reads - before;
        assert!(reads < 10, "one save read {} values", reads);
    }

    #[tokio::test]
    async fn test_clear_scoped_only_touches_prefixes() {
        let (store, _) = store();
        for key in ["patients:1", "patients:2", "users:1", "settings"] {
            store.save(key, json!(key)).await.unwrap();
            store.save(key, json!(key)).await.unwrap();
        }

        let removed = store.clear_scoped(&["patients:", ""]).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.keys("").await.unwrap(),
            vec!["settings".to_string(), "users:1".to_string()]
        );
        assert!(store.medium().get(&backup_key("patients:1")).await.unwrap().is_none());
        assert!(store.medium().get(&backup_key("users:1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_scoped_with_only_empty_prefix_is_noop() {
        let (store, _) = store();
        store.save("k", json!(1)).await.unwrap();
        assert_eq!(store.clear_scoped(&[""]).await.unwrap(), 0);
        assert_eq!(store.load("k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_recover_requires_backup() {
        let (store, _) = store();
        store.medium().put("k", "0".to_string()).await.unwrap();
        let err = store.recover("k").await.unwrap_err();
        assert!(matches!(err, StoreError::BackupUnavailable { .. }));

        store.save("k", json!(1)).await.unwrap();
        store.save("k", json!(2)).await.unwrap();
        store.recover("k").await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_reserved_and_empty_keys_rejected() {
        let (store, _) = store();
        for key in ["", "_recovery_x", "_rate_limit_x"] {
            let err = store.save(key, json!(1)).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey { .. }), "{:?}", key);
        }
    }

    #[tokio::test]
    async fn test_stats_counts_entries_and_backups() {
        let (store, _) = store();
        store.save("a", json!(1)).await.unwrap();
        store.save("a", json!(2)).await.unwrap();
        store.save("b", json!(3)).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.backups, 2);
        assert_eq!(stats.total, StoreConfig::default().quota_bytes);
        assert_eq!(stats.used + stats.available, stats.total);
    }

    #[tokio::test]
    async fn test_concurrent_saves_same_key_keep_valid_state() {
        let (store, _) = store_with(StoreConfig {
            rate_limit: RateLimitConfig::unlimited(),
            ..StoreConfig::default()
        });
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.save("shared", json!(i)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let value = store.load("shared").await.unwrap().unwrap();
        assert!(value.as_i64().unwrap() < 16);
        let slot = store.backups.read_slot(store.medium(), "shared").await.unwrap().unwrap();
        assert!(slot.envelope.is_intact());
        assert_eq!(store.locks.active(), 0);
    }
}
