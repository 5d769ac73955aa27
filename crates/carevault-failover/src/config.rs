//! Failover configuration.

use serde::{Deserialize, Serialize};

use crate::http::HttpBackendConfig;
use crate::local::DEFAULT_NAMESPACE;
use crate::seed::SeedData;

/// Settings for the primary/fallback pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// The remote primary.
    pub primary: HttpBackendConfig,
    /// Store key namespace for records held by the fallback.
    pub namespace: String,
    /// Start in fallback mode without contacting the primary.
    pub offline: bool,
    /// Dataset created in an empty fallback.
    pub seed: SeedData,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            primary: HttpBackendConfig::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            offline: false,
            seed: SeedData::default(),
        }
    }
}
