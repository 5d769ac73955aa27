//! Raw string key/value media underneath the envelope layer.
//!
//! This module provides the [`Medium`] trait, the seam between the
//! integrity-checked store and whatever actually holds the bytes, plus an
//! in-memory implementation used for tests and ephemeral fallback storage.
//! The file-backed implementation lives in [`crate::file_medium`].

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Medium operation statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediumStats {
    /// Reads served.
    pub reads: u64,
    /// Writes completed.
    pub writes: u64,
    /// Deletes completed.
    pub deletes: u64,
    /// Operations that failed.
    pub errors: u64,
}

/// A flat string namespace. Keys are opaque to the medium.
pub trait Medium: Send + Sync {
    /// Reads the value stored at `key`, or `None` when absent.
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<String>>> + Send;

    /// Stores `value` at `key`, replacing any previous value.
    fn put(&self, key: &str, value: String) -> impl Future<Output = StoreResult<()>> + Send;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Lists every key currently stored.
    fn keys(&self) -> impl Future<Output = StoreResult<Vec<String>>> + Send;

    /// Every stored key with its accounted size, `key.len() + value.len()`.
    ///
    /// The default reads every value; media that know their sizes override it.
    fn sizes(&self) -> impl Future<Output = StoreResult<Vec<(String, u64)>>> + Send {
        async move {
            let mut sizes = Vec::new();
            for key in self.keys().await? {
                if let Some(value) = self.get(&key).await? {
                    let size = (key.len() + value.len()) as u64;
                    sizes.push((key, size));
                }
            }
            Ok(sizes)
        }
    }

    /// Current operation statistics.
    fn stats(&self) -> MediumStats;
}

impl<M: Medium> Medium for Arc<M> {
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<String>>> + Send {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: String) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).delete(key)
    }

    fn keys(&self) -> impl Future<Output = StoreResult<Vec<String>>> + Send {
        (**self).keys()
    }

    fn sizes(&self) -> impl Future<Output = StoreResult<Vec<(String, u64)>>> + Send {
        (**self).sizes()
    }

    fn stats(&self) -> MediumStats {
        (**self).stats()
    }
}

/// In-memory medium backed by a concurrent map.
///
/// An optional byte limit mimics a quota-enforcing browser-style store: a
/// write that would push the sum of key and value lengths past the limit
/// fails with [`StoreError::Capacity`].
pub struct MemoryMedium {
    entries: DashMap<String, String>,
    limit_bytes: Option<u64>,
    stats: Mutex<MediumStats>,
}

impl Default for MemoryMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMedium {
    /// Creates an unbounded in-memory medium.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            limit_bytes: None,
            stats: Mutex::new(MediumStats::default()),
        }
    }

    /// Creates an in-memory medium that rejects writes beyond `limit_bytes`.
    pub fn with_limit(limit_bytes: u64) -> Self {
        Self {
            limit_bytes: Some(limit_bytes),
            ..Self::new()
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn used_bytes_excluding(&self, key: &str) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.key() != key)
            .map(|e| (e.key().len() + e.value().len()) as u64)
            .sum()
    }

    fn update_stats<F>(&self, f: F)
    where
        F: FnOnce(&mut MediumStats),
    {
        f(&mut self.stats.lock());
    }
}

impl Medium for MemoryMedium {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self.entries.get(key).map(|v| v.value().clone());
        self.update_stats(|s| s.reads += 1);
        Ok(value)
    }

    async fn put(&self, key: &str, value: String) -> StoreResult<()> {
        if let Some(limit) = self.limit_bytes {
            let projected = self.used_bytes_excluding(key) + (key.len() + value.len()) as u64;
            if projected > limit {
                debug!(key = %key, projected, limit, "memory medium quota exceeded");
                self.update_stats(|s| s.errors += 1);
                return Err(StoreError::Capacity {
                    key: key.to_string(),
                    requested: projected,
                    limit,
                });
            }
        }
        self.entries.insert(key.to_string(), value);
        self.update_stats(|s| s.writes += 1);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        self.update_stats(|s| s.deletes += 1);
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }

    async fn sizes(&self) -> StoreResult<Vec<(String, u64)>> {
        Ok(self
            .entries
            .iter()
            .map(|e| (e.key().clone(), (e.key().len() + e.value().len()) as u64))
            .collect())
    }

    fn stats(&self) -> MediumStats {
        self.stats.lock().clone()
    }
}
