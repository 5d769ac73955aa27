//! The record backend seam.
//!
//! The orchestrator is generic over [`RecordBackend`], so the remote primary,
//! the local fallback and test doubles are interchangeable.

use std::future::Future;

use serde_json::Value;

use crate::error::{BackendError, BackendResult};
use crate::record::Record;

/// Collection-oriented record storage.
pub trait RecordBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Creates a record in `collection`.
    fn create(
        &self,
        collection: &str,
        data: Value,
    ) -> impl Future<Output = BackendResult<Record>> + Send;

    /// Fetches one record, or `None` when it does not exist.
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = BackendResult<Option<Record>>> + Send;

    /// Lists every record in `collection`, oldest first.
    fn list(&self, collection: &str) -> impl Future<Output = BackendResult<Vec<Record>>> + Send;

    /// Applies `patch` to a record, returning the updated record or `None`
    /// when it does not exist.
    fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> impl Future<Output = BackendResult<Option<Record>>> + Send;

    /// Deletes a record. Returns whether it existed.
    fn delete(&self, collection: &str, id: &str) -> impl Future<Output = BackendResult<bool>> + Send;

    /// Number of records in `collection`.
    fn count(&self, collection: &str) -> impl Future<Output = BackendResult<usize>> + Send {
        async move { Ok(self.list(collection).await?.len()) }
    }
}

/// Rejects collection names that cannot be used as a key segment.
pub fn validate_collection(name: &str) -> BackendResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains(':') || name.contains('/') {
        "name must not contain ':' or '/'"
    } else {
        return Ok(());
    };
    Err(BackendError::InvalidCollection {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}
