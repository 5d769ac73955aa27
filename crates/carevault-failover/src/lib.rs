#![warn(missing_docs)]

//! CareVault failover subsystem: record backends and sticky primary/fallback orchestration
//!
//! A hosted REST backend serves records while it is healthy. The first
//! failure switches a shared [`ModeState`] to fallback for good, and all
//! further operations are served from a [`LocalBackend`] on top of the
//! integrity-checked store, seeded with a default dataset on first use.

pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod local;
pub mod mode;
pub mod orchestrator;
pub mod record;
pub mod seed;

pub use backend::RecordBackend;
pub use config::FailoverConfig;
pub use error::{BackendError, BackendResult};
pub use http::{HttpBackend, HttpBackendConfig};
pub use local::{LocalBackend, DEFAULT_NAMESPACE};
pub use mode::{ModeState, ServiceMode};
pub use orchestrator::{Failover, FailoverMetricsSnapshot};
pub use record::Record;
pub use seed::{seed_backend, SeedData, DEFAULT_DEPARTMENTS};
