//! Local fallback backend over the integrity-checked store.
//!
//! Each record is one store entry under `"{namespace}{collection}:{id}"`,
//! so it inherits envelope checksums, backup slots and rate limiting.

use std::sync::Arc;

use carevault_store::{IntegrityStore, Medium};
use serde_json::Value;
use tracing::debug;

use crate::backend::{validate_collection, RecordBackend};
use crate::error::{BackendError, BackendResult};
use crate::record::Record;

/// Default key namespace for records.
pub const DEFAULT_NAMESPACE: &str = "records:";

/// Records stored in an [`IntegrityStore`].
pub struct LocalBackend<M: Medium> {
    store: Arc<IntegrityStore<M>>,
    namespace: String,
}

impl<M: Medium> LocalBackend<M> {
    /// Creates a backend using [`DEFAULT_NAMESPACE`].
    pub fn new(store: Arc<IntegrityStore<M>>) -> Self {
        Self::with_namespace(store, DEFAULT_NAMESPACE)
    }

    /// Creates a backend storing records under `namespace`.
    pub fn with_namespace(store: Arc<IntegrityStore<M>>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<IntegrityStore<M>> {
        &self.store
    }

    /// Store key prefix for `collection`.
    pub fn collection_prefix(&self, collection: &str) -> String {
        format!("{}{}:", self.namespace, collection)
    }

    fn record_key(&self, collection: &str, id: &str) -> String {
        format!("{}{}", self.collection_prefix(collection), id)
    }

    async fn read(&self, key: &str) -> BackendResult<Option<Record>> {
        match self.store.load(key).await? {
            Some(value) => decode_record(key, value).map(Some),
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, record: &Record) -> BackendResult<Record> {
        let value = serde_json::to_value(record).map_err(|e| BackendError::decode(e.to_string()))?;
        let saved = self.store.save(key, value).await?;
        decode_record(key, saved)
    }
}

fn decode_record(key: &str, value: Value) -> BackendResult<Record> {
    serde_json::from_value(value)
        .map_err(|e| BackendError::decode(format!("entry '{}' is not a record: {}", key, e)))
}

impl<M: Medium> RecordBackend for LocalBackend<M> {
    fn name(&self) -> &str {
        "local"
    }

    async fn create(&self, collection: &str, data: Value) -> BackendResult<Record> {
        validate_collection(collection)?;
        let record = Record::new(collection, data, self.store.now_ms());
        let key = self.record_key(collection, &record.id);
        let saved = self.write(&key, &record).await?;
        debug!(collection = %collection, id = %saved.id, "created local record");
        Ok(saved)
    }

    async fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Record>> {
        validate_collection(collection)?;
        self.read(&self.record_key(collection, id)).await
    }

    async fn list(&self, collection: &str) -> BackendResult<Vec<Record>> {
        validate_collection(collection)?;
        let mut records = Vec::new();
        for key in self.store.keys(&self.collection_prefix(collection)).await? {
            if let Some(record) = self.read(&key).await? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> BackendResult<Option<Record>> {
        validate_collection(collection)?;
        let key = self.record_key(collection, id);
        let Some(mut record) = self.read(&key).await? else {
            return Ok(None);
        };
        record.apply_patch(patch, self.store.now_ms());
        self.write(&key, &record).await.map(Some)
    }

    async fn delete(&self, collection: &str, id: &str) -> BackendResult<bool> {
        validate_collection(collection)?;
        let key = self.record_key(collection, id);
        let existed = self.store.keys(&key).await?.iter().any(|k| *k == key);
        self.store.remove(&key).await?;
        Ok(existed)
    }

    async fn count(&self, collection: &str) -> BackendResult<usize> {
        validate_collection(collection)?;
        Ok(self.store.keys(&self.collection_prefix(collection)).await?.len())
    }
}
