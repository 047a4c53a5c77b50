//! Application configuration
//!
//! Structures deserialized from `config/default.toml` plus overrides, and
//! conversions into the library option types.

mod loader;

pub use loader::load_config;

use eventide_core::{default_db_path, SqliteOptions, DEFAULT_TABLE};
use eventide_replay::CdcConfig;
use eventide_subscriptions::WebhookConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventideConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cdc: CdcSettings,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event log backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: Option<PathBuf>,
    pub table: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: None,
            table: DEFAULT_TABLE.to_string(),
            max_connections: 5,
        }
    }
}

impl StorageConfig {
    /// Database file, falling back to `~/.eventide/events.db`
    pub fn db_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_db_path)
    }

    pub fn sqlite_options(&self) -> SqliteOptions {
        SqliteOptions {
            table: self.table.clone(),
            max_connections: self.max_connections,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CdcSettings {
    pub batch_size: usize,
    pub poll_interval_ms: u64,
}

impl Default for CdcSettings {
    fn default() -> Self {
        let defaults = CdcConfig::default();
        Self {
            batch_size: defaults.batch_size,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
        }
    }
}

impl CdcSettings {
    pub fn cdc_config(&self) -> CdcConfig {
        CdcConfig {
            batch_size: self.batch_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output
    pub json: bool,
}
