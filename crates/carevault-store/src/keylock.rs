//! Per-key async mutual exclusion.
//!
//! Serializes the backup/write/verify sequence of concurrent operations on
//! the same key. Operations on different keys never contend. Idle lock
//! entries are dropped as soon as their last holder releases them.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A table of async mutexes keyed by store key.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl KeyLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_default()
            .value()
            .clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            locks: &self.locks,
            guard: Some(guard),
        }
    }

    /// Number of keys with a live lock entry.
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive access to one key, released on drop.
pub struct KeyGuard<'a> {
    key: String,
    locks: &'a DashMap<String, Arc<AsyncMutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyGuard<'_> {
    /// The locked key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
