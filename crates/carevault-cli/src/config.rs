use std::path::{Path, PathBuf};

use carevault_failover::FailoverConfig;
use carevault_store::{StoreConfig, TextSanitizerConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sanitization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerSettings {
    /// Run the text sanitizer on every save and load.
    pub enabled: bool,
    /// Rules applied when enabled.
    #[serde(flatten)]
    pub rules: TextSanitizerConfig,
}

impl Default for SanitizerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: TextSanitizerConfig::default(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the file-backed store.
    pub data_dir: PathBuf,
    /// Store limits and policies.
    pub store: StoreConfig,
    /// Sanitization gate.
    pub sanitizer: SanitizerSettings,
    /// Primary/fallback record backends.
    pub failover: FailoverConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./carevault-data"),
            store: StoreConfig::default(),
            sanitizer: SanitizerSettings::default(),
            failover: FailoverConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads a `.toml` or `.json` configuration file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: AppConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: AppConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Reads `path` if given and present, otherwise returns defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) if path.exists() => Self::from_file(path),
            Some(path) => {
                warn!("Config file not found, using defaults: {}", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }
}
