//! End-to-end corruption and recovery scenarios.

use std::sync::atomic::{AtomicBool, Ordering};

use carevault_store::{
    backup_key, FileMedium, IntegrityStore, ManualClock, Medium, MediumStats, MemoryMedium,
    StoreConfig, StoreError, StoreResult,
};
use serde_json::json;

const START_MS: i64 = 1_700_000_000_000;

/// Medium that mangles the next write of a record naming Bob after being armed.
#[derive(Default)]
struct FlakyMedium {
    inner: MemoryMedium,
    corrupt_next_write: AtomicBool,
}

impl FlakyMedium {
    fn arm(&self) {
        self.corrupt_next_write.store(true, Ordering::SeqCst);
    }
}

impl Medium for FlakyMedium {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String) -> StoreResult<()> {
        let value = if value.contains("\"Bob\"") && self.corrupt_next_write.swap(false, Ordering::SeqCst) {
            value.replace("\"Bob\"", "\"B0b\"")
        } else {
            value
        };
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        self.inner.keys().await
    }

    fn stats(&self) -> MediumStats {
        self.inner.stats()
    }
}

#[tokio::test]
async fn test_patient_record_survives_file_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let medium = FileMedium::open(dir.path()).await.unwrap().without_sync();
    let store = IntegrityStore::new(medium, StoreConfig::default()).with_clock(ManualClock::new(START_MS));

    store.save("patient_1", json!({"name": "A"})).await.unwrap();
    store.save("patient_1", json!({"name": "B"})).await.unwrap();

    let path = store.medium().entry_path("patient_1");
    tokio::fs::write(&path, b"{\"format_version\":\"1.0\",\"payl").await.unwrap();

    let loaded = store.load("patient_1").await.unwrap();
    assert_eq!(loaded, Some(json!({"name": "A"})));
    assert_eq!(store.metrics().recoveries, 1);
}

#[tokio::test]
async fn test_file_medium_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let medium = FileMedium::open(dir.path()).await.unwrap();
        let store = IntegrityStore::new(medium, StoreConfig::default());
        store.save("settings", json!({"theme": "dark"})).await.unwrap();
        store.save("settings", json!({"theme": "light"})).await.unwrap();
    }

    let medium = FileMedium::open(dir.path()).await.unwrap();
    let store = IntegrityStore::new(medium, StoreConfig::default());
    assert_eq!(
        store.load("settings").await.unwrap(),
        Some(json!({"theme": "light"}))
    );
    store.recover("settings").await.unwrap();
    assert_eq!(
        store.load("settings").await.unwrap(),
        Some(json!({"theme": "dark"}))
    );
}

#[tokio::test]
async fn test_failed_write_verification_rolls_back() {
    let store = IntegrityStore::new(FlakyMedium::default(), StoreConfig::default())
        .with_clock(ManualClock::new(START_MS));

    store.save("patient_2", json!({"name": "Alice"})).await.unwrap();
    store.medium().arm();
    let err = store
        .save("patient_2", json!({"name": "Bob"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Integrity { .. }), "{:?}", err);

    assert_eq!(
        store.load("patient_2").await.unwrap(),
        Some(json!({"name": "Alice"}))
    );
}

#[tokio::test]
async fn test_failed_first_write_leaves_corrupt_entry_detectable() {
    let store = IntegrityStore::new(FlakyMedium::default(), StoreConfig::default())
        .with_clock(ManualClock::new(START_MS));

    store.medium().arm();
    let err = store.save("p", json!({"name": "Bob"})).await.unwrap_err();
    assert!(matches!(err, StoreError::Integrity { .. }));
    assert!(matches!(
        store.load("p").await,
        Err(StoreError::Integrity { .. })
    ));
}

#[tokio::test]
async fn test_backup_retention_is_measured_from_backup_time() {
    let clock = ManualClock::new(START_MS);
    let store = IntegrityStore::new(MemoryMedium::new(), StoreConfig::default())
        .with_clock(clock.clone());

    store.save("k", json!(1)).await.unwrap();
    clock.advance(23 * 60 * 60 * 1000);
    store.save("k", json!(2)).await.unwrap();

    // The backed-up envelope was written 23h ago but the slot itself is new.
    clock.advance(2 * 60 * 60 * 1000);
    assert_eq!(store.prune_backups().await.unwrap(), 0);
    assert!(store.medium().get(&backup_key("k")).await.unwrap().is_some());

    clock.advance(23 * 60 * 60 * 1000);
    assert_eq!(store.prune_backups().await.unwrap(), 1);
    assert!(matches!(
        store.recover("k").await,
        Err(StoreError::BackupUnavailable { .. })
    ));
}
