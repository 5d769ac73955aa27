//! CareVault admin CLI.
//!
//! Loads an [`AppConfig`], opens a file-backed integrity store and runs
//! store or record commands against it, printing JSON results.

#![warn(missing_docs)]

pub mod cli;
pub mod config;

pub use cli::{execute, execute_records, open_store, Cli, Command, LogFormat, RecordsCmd};
pub use config::{AppConfig, SanitizerSettings};
