use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use carevault_failover::{Failover, HttpBackend, LocalBackend, ModeState, RecordBackend};
use carevault_store::{FileMedium, IntegrityStore, Medium, PassthroughSanitizer, TextSanitizer};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing::info;

use crate::config::AppConfig;

/// Log output format.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "carevault")]
#[command(about = "CareVault resilient persistence admin CLI", long_about = None)]
pub struct Cli {
    /// Configuration file (.toml or .json).
    #[arg(short, long, env = "CAREVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides the configured data directory.
    #[arg(short, long, env = "CAREVAULT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Overrides the primary backend's bearer token.
    #[arg(short, long, env = "CAREVAULT_TOKEN")]
    pub token: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Store a JSON value (bare text is stored as a string).
    Put {
        /// Key to write.
        key: String,
        /// JSON value.
        value: String,
    },
    /// Print the value at a key.
    Get {
        /// Key to read.
        key: String,
    },
    /// Delete a key with its backup slot.
    Rm {
        /// Key to delete.
        key: String,
    },
    /// List application keys.
    Keys {
        /// Only keys starting with this prefix.
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Delete every key under the given prefixes.
    Clear {
        /// Key prefixes; empty prefixes are ignored.
        #[arg(required = true)]
        prefixes: Vec<String>,
    },
    /// Show usage against the quota and operation counters.
    Stats,
    /// Restore a key from its backup slot.
    Recover {
        /// Key to restore.
        key: String,
    },
    /// Remove backup slots older than the retention window.
    Prune,
    /// Record operations through the primary/fallback orchestrator.
    Records {
        /// Skip the primary and use the local fallback directly.
        #[arg(long)]
        offline: bool,
        /// Record operation.
        #[command(subcommand)]
        cmd: RecordsCmd,
    },
}

/// Record operations.
#[derive(Subcommand, Debug, Clone)]
pub enum RecordsCmd {
    /// List a collection.
    List {
        /// Collection name.
        collection: String,
    },
    /// Count a collection.
    Count {
        /// Collection name.
        collection: String,
    },
    /// Create a record from a JSON document.
    Create {
        /// Collection name.
        collection: String,
        /// JSON document.
        data: String,
    },
    /// Fetch one record.
    Get {
        /// Collection name.
        collection: String,
        /// Record id.
        id: String,
    },
    /// Merge a JSON patch into a record.
    Update {
        /// Collection name.
        collection: String,
        /// Record id.
        id: String,
        /// JSON patch.
        patch: String,
    },
    /// Delete a record.
    Delete {
        /// Collection name.
        collection: String,
        /// Record id.
        id: String,
    },
}

impl Cli {
    /// Loads configuration, opens the store and runs the command, printing
    /// its result as JSON.
    pub async fn run(self) -> Result<()> {
        let config = self.resolve_config()?;
        let store = Arc::new(open_store(&config).await?);

        let output = match self.command {
            Command::Records { offline, ref cmd } => {
                let mode = Arc::new(ModeState::new());
                if offline || config.failover.offline {
                    mode.enter_fallback();
                }
                let primary = HttpBackend::new(&config.failover.primary)?;
                let fallback =
                    LocalBackend::with_namespace(Arc::clone(&store), &config.failover.namespace);
                let failover =
                    Failover::new(primary, fallback, mode).with_seed(config.failover.seed.clone());
                let output = execute_records(&failover, cmd).await?;
                info!(mode = %failover.mode(), "records command finished");
                output
            }
            ref cmd => execute(&*store, cmd).await?,
        };

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    /// The configuration file merged with command-line overrides.
    pub fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load_or_default(self.config.as_deref())?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(token) = &self.token {
            config.failover.primary.token = Some(token.clone());
        }
        Ok(config)
    }
}

/// Opens the file-backed store described by `config`.
pub async fn open_store(config: &AppConfig) -> Result<IntegrityStore<FileMedium>> {
    let medium = FileMedium::open(&config.data_dir)
        .await
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
    let store = IntegrityStore::new(medium, config.store.clone());
    Ok(if config.sanitizer.enabled {
        store.with_sanitizer(TextSanitizer::new(config.sanitizer.rules.clone()))
    } else {
        store.with_sanitizer(PassthroughSanitizer)
    })
}

/// Runs a store command and returns its JSON output.
pub async fn execute<M: Medium>(store: &IntegrityStore<M>, command: &Command) -> Result<Value> {
    let output = match command {
        Command::Put { key, value } => {
            let saved = store.save(key, parse_value(value)).await?;
            json!({ "key": key, "value": saved })
        }
        Command::Get { key } => json!({ "key": key, "value": store.load(key).await? }),
        Command::Rm { key } => {
            store.remove(key).await?;
            json!({ "removed": key })
        }
        Command::Keys { prefix } => json!(store.keys(prefix).await?),
        Command::Clear { prefixes } => {
            let removed = store.clear_scoped(prefixes.as_slice()).await?;
            json!({ "removed": removed })
        }
        Command::Stats => json!({
            "usage": store.stats().await?,
            "operations": store.metrics(),
            "medium": store.medium().stats(),
        }),
        Command::Recover { key } => {
            store.recover(key).await?;
            json!({ "recovered": key, "value": store.load(key).await? })
        }
        Command::Prune => json!({ "pruned": store.prune_backups().await? }),
        Command::Records { .. } => {
            anyhow::bail!("records commands need the failover orchestrator")
        }
    };
    Ok(output)
}

/// Runs a record command through `failover` and returns its JSON output.
pub async fn execute_records<P, F>(failover: &Failover<P, F>, cmd: &RecordsCmd) -> Result<Value>
where
    P: RecordBackend,
    F: RecordBackend,
{
    let output = match cmd {
        RecordsCmd::List { collection } => json!(failover.list(collection).await?),
        RecordsCmd::Count { collection } => json!({ "count": failover.count(collection).await? }),
        RecordsCmd::Create { collection, data } => {
            json!(failover.create(collection, parse_value(data)).await?)
        }
        RecordsCmd::Get { collection, id } => json!(failover.get(collection, id).await?),
        RecordsCmd::Update {
            collection,
            id,
            patch,
        } => json!(failover.update(collection, id, parse_value(patch)).await?),
        RecordsCmd::Delete { collection, id } => {
            json!({ "deleted": failover.delete(collection, id).await? })
        }
    };
    Ok(output)
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
