//! Store operation counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic counters updated by the store.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    saves: AtomicU64,
    loads: AtomicU64,
    removes: AtomicU64,
    recoveries: AtomicU64,
    integrity_failures: AtomicU64,
    rate_limited: AtomicU64,
    capacity_rejections: AtomicU64,
    backups_pruned: AtomicU64,
    legacy_migrations: AtomicU64,
}

/// Point-in-time copy of [`StoreMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetricsSnapshot {
    /// Successful saves.
    pub saves: u64,
    /// Successful loads (including misses).
    pub loads: u64,
    /// Remove calls.
    pub removes: u64,
    /// Values restored from a backup slot.
    pub recoveries: u64,
    /// Corruption that could not be recovered.
    pub integrity_failures: u64,
    /// Operations denied by the rate limiter.
    pub rate_limited: u64,
    /// Writes rejected for size or quota.
    pub capacity_rejections: u64,
    /// Backup slots removed by pruning or eviction.
    pub backups_pruned: u64,
    /// Pre-envelope values rewritten as envelopes.
    pub legacy_migrations: u64,
}

macro_rules! counter {
    ($name:ident) => {
        #[doc = concat!("Increments `", stringify!($name), "`.")]
        pub fn $name(&self) {
            self.$name.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl StoreMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    counter!(saves);
    counter!(loads);
    counter!(removes);
    counter!(recoveries);
    counter!(integrity_failures);
    counter!(rate_limited);
    counter!(capacity_rejections);
    counter!(legacy_migrations);

    /// Adds `n` pruned backup slots.
    pub fn backups_pruned(&self, n: u64) {
        self.backups_pruned.fetch_add(n, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            saves: self.saves.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            backups_pruned: self.backups_pruned.load(Ordering::Relaxed),
            legacy_migrations: self.legacy_migrations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let m = StoreMetrics::new();
        m.saves();
        m.saves();
        m.recoveries();
        m.backups_pruned(3);
        let s = m.snapshot();
        assert_eq!(s.saves, 2);
        assert_eq!(s.recoveries, 1);
        assert_eq!(s.backups_pruned, 3);
        assert_eq!(s.loads, 0);
    }
}
