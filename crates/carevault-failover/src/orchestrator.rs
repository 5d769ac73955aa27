//! Sticky primary/fallback dispatch.
//!
//! Every operation goes to the primary while the shared [`ModeState`] says
//! [`ServiceMode::Primary`]. The first primary error flips the state to
//! fallback and the same operation is re-run against the fallback. From then
//! on the primary is never called again. The fallback is seeded with the
//! default dataset once, before its first use.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::backend::RecordBackend;
use crate::error::BackendResult;
use crate::mode::{ModeState, ServiceMode};
use crate::record::Record;
use crate::seed::{seed_backend, SeedData};

/// Point-in-time orchestrator counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverMetricsSnapshot {
    /// Operations answered by the primary.
    pub primary_successes: u64,
    /// Primary errors that triggered fallback.
    pub primary_failures: u64,
    /// Operations answered by the fallback.
    pub fallback_calls: u64,
    /// Current mode.
    pub mode: ServiceMode,
}

#[derive(Debug, Default)]
struct FailoverMetrics {
    primary_successes: AtomicU64,
    primary_failures: AtomicU64,
    fallback_calls: AtomicU64,
}

/// Routes record operations to a primary backend, switching permanently to
/// a fallback backend on the first primary failure.
pub struct Failover<P: RecordBackend, F: RecordBackend> {
    primary: P,
    fallback: F,
    mode: Arc<ModeState>,
    seed: SeedData,
    seeded: OnceCell<()>,
    metrics: FailoverMetrics,
}

impl<P: RecordBackend, F: RecordBackend> Failover<P, F> {
    /// Creates an orchestrator sharing `mode`, seeding with the default
    /// dataset.
    pub fn new(primary: P, fallback: F, mode: Arc<ModeState>) -> Self {
        info!(
            primary = primary.name(),
            fallback = fallback.name(),
            mode = %mode.current(),
            "creating failover orchestrator"
        );
        Self {
            primary,
            fallback,
            mode,
            seed: SeedData::default(),
            seeded: OnceCell::new(),
            metrics: FailoverMetrics::default(),
        }
    }

    /// Replaces the dataset used to seed the fallback.
    pub fn with_seed(mut self, seed: SeedData) -> Self {
        self.seed = seed;
        self
    }

    /// The current service mode.
    pub fn mode(&self) -> ServiceMode {
        self.mode.current()
    }

    /// The primary backend.
    pub fn primary(&self) -> &P {
        &self.primary
    }

    /// The fallback backend.
    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    /// Current counter values.
    pub fn metrics(&self) -> FailoverMetricsSnapshot {
        FailoverMetricsSnapshot {
            primary_successes: self.metrics.primary_successes.load(Ordering::Relaxed),
            primary_failures: self.metrics.primary_failures.load(Ordering::Relaxed),
            fallback_calls: self.metrics.fallback_calls.load(Ordering::Relaxed),
            mode: self.mode.current(),
        }
    }

    /// Seeds the fallback if that has not happened yet. Failures are logged
    /// and not retried.
    pub async fn ensure_seeded(&self) {
        self.seeded
            .get_or_init(|| async {
                match seed_backend(&self.fallback, &self.seed).await {
                    Ok(created) => debug!(created, "fallback seeding finished"),
                    Err(e) => warn!(error = %e, "failed to seed fallback backend"),
                }
            })
            .await;
    }

    /// Runs `on_primary` unless the fallback is active; on error, or in
    /// fallback mode, runs `on_fallback`. Futures are lazy, so the side not
    /// chosen never executes.
    async fn dispatch<T>(
        &self,
        op: &'static str,
        on_primary: impl Future<Output = BackendResult<T>>,
        on_fallback: impl Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        if !self.mode.is_fallback() {
            match on_primary.await {
                Ok(value) => {
                    self.metrics.primary_successes.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(e) => {
                    self.metrics.primary_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(op, backend = self.primary.name(), error = %e, "primary backend failed");
                    if self.mode.enter_fallback() {
                        warn!(
                            fallback = self.fallback.name(),
                            "switching to fallback mode for the rest of this session"
                        );
                    }
                }
            }
        }

        self.ensure_seeded().await;
        self.metrics.fallback_calls.fetch_add(1, Ordering::Relaxed);
        on_fallback.await
    }

    /// Creates a record.
    pub async fn create(&self, collection: &str, data: Value) -> BackendResult<Record> {
        self.dispatch(
            "create",
            self.primary.create(collection, data.clone()),
            self.fallback.create(collection, data),
        )
        .await
    }

    /// Fetches a record.
    pub async fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Record>> {
        self.dispatch(
            "get",
            self.primary.get(collection, id),
            self.fallback.get(collection, id),
        )
        .await
    }

    /// Lists a collection.
    pub async fn list(&self, collection: &str) -> BackendResult<Vec<Record>> {
        self.dispatch(
            "list",
            self.primary.list(collection),
            self.fallback.list(collection),
        )
        .await
    }

    /// Applies a patch to a record.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> BackendResult<Option<Record>> {
        self.dispatch(
            "update",
            self.primary.update(collection, id, patch.clone()),
            self.fallback.update(collection, id, patch),
        )
        .await
    }

    /// Deletes a record.
    pub async fn delete(&self, collection: &str, id: &str) -> BackendResult<bool> {
        self.dispatch(
            "delete",
            self.primary.delete(collection, id),
            self.fallback.delete(collection, id),
        )
        .await
    }

    /// Counts a collection.
    pub async fn count(&self, collection: &str) -> BackendResult<usize> {
        self.dispatch(
            "count",
            self.primary.count(collection),
            self.fallback.count(collection),
        )
        .await
    }
}
