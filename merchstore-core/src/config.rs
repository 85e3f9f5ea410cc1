//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "ledger": { "initialBalance": 100000, "operationTimeoutMs": 5000 },
//!   "logging": { "mode": "text", "level": "info", "eventLog": true }
//! }
//! ```
//! Environment variables override the file. Keys this crate does not know
//! about are kept when the file is saved again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::services::{DEFAULT_INITIAL_BALANCE, DEFAULT_OPERATION_TIMEOUT};

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_DB_FILE: &str = "merchstore.duckdb";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    ledger: LedgerSettings,
    #[serde(default)]
    logging: LoggingSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    db_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial_balance: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operation_timeout_ms: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoggingSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<LogMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_log: Option<bool>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Output format of the process log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    #[default]
    Text,
    Json,
}

impl FromStr for LogMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogMode::Text),
            "json" => Ok(LogMode::Json),
            other => bail!("unknown log mode '{}', expected 'text' or 'json'", other),
        }
    }
}

/// Merch store configuration (resolved view of settings + environment)
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub initial_balance: i64,
    pub operation_timeout: Duration,
    pub log_mode: LogMode,
    pub log_level: String,
    /// Persist ledger events to logs.duckdb
    pub event_log: bool,
}

impl Config {
    /// Defaults for a data directory, ignoring any settings file
    pub fn defaults(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            db_path: data_dir.join(DEFAULT_DB_FILE),
            initial_balance: DEFAULT_INITIAL_BALANCE,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            log_mode: LogMode::Text,
            log_level: "info".to_string(),
            event_log: true,
        }
    }

    /// Load config from the data directory
    ///
    /// Reads settings.json if present, then applies `MERCH_*` environment
    /// overrides.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self::from_file(data_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
        let settings_path = data_dir.join(SETTINGS_FILE);
        if !settings_path.exists() {
            return Ok(SettingsFile::default());
        }
        let content = std::fs::read_to_string(&settings_path)
            .with_context(|| format!("Failed to read {}", settings_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", settings_path.display()))
    }

    fn from_file(data_dir: &Path) -> Result<Self> {
        let raw = Self::read_settings(data_dir)?;
        let mut config = Self::defaults(data_dir);

        if let Some(path) = raw.ledger.db_path {
            config.db_path = resolve_path(data_dir, &path);
        }
        if let Some(balance) = raw.ledger.initial_balance {
            config.initial_balance = balance;
        }
        if let Some(ms) = raw.ledger.operation_timeout_ms {
            config.operation_timeout = Duration::from_millis(ms);
        }
        if let Some(mode) = raw.logging.mode {
            config.log_mode = mode;
        }
        if let Some(level) = raw.logging.level {
            config.log_level = level;
        }
        if let Some(event_log) = raw.logging.event_log {
            config.event_log = event_log;
        }
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("MERCH_DB_PATH") {
            self.db_path = resolve_path(&self.data_dir, &path);
        }
        if let Some(value) = lookup("MERCH_INITIAL_BALANCE") {
            self.initial_balance = value
                .trim()
                .parse()
                .with_context(|| format!("MERCH_INITIAL_BALANCE is not an integer: {}", value))?;
        }
        if let Some(value) = lookup("MERCH_OPERATION_TIMEOUT_MS") {
            let ms: u64 = value.trim().parse().with_context(|| {
                format!("MERCH_OPERATION_TIMEOUT_MS is not a number: {}", value)
            })?;
            self.operation_timeout = Duration::from_millis(ms);
        }
        if let Some(value) = lookup("MERCH_LOG_MODE") {
            self.log_mode = value.parse()?;
        }
        if let Some(value) = lookup("MERCH_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = lookup("MERCH_EVENT_LOG") {
            self.event_log = match value.as_str() {
                "true" | "1" | "yes" | "TRUE" | "YES" => true,
                "false" | "0" | "no" | "FALSE" | "NO" => false,
                other => bail!("MERCH_EVENT_LOG must be a boolean, got '{}'", other),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_balance < 0 {
            bail!("initial balance cannot be negative ({})", self.initial_balance);
        }
        if self.operation_timeout.is_zero() {
            bail!("operation timeout must be greater than zero");
        }
        Ok(())
    }

    /// Save config to the data directory
    /// Preserves other settings that this crate doesn't manage
    pub fn save(&self) -> Result<()> {
        let settings_path = self.data_dir.join(SETTINGS_FILE);
        let mut settings = Self::read_settings(&self.data_dir)?;

        // Update only the fields we manage
        settings.ledger.db_path = if self.db_path == self.data_dir.join(DEFAULT_DB_FILE) {
            None
        } else {
            Some(self.db_path.to_string_lossy().into_owned())
        };
        settings.ledger.initial_balance = Some(self.initial_balance);
        settings.ledger.operation_timeout_ms = Some(self.operation_timeout.as_millis() as u64);
        settings.logging.mode = Some(self.log_mode);
        settings.logging.level = Some(self.log_level.clone());
        settings.logging.event_log = Some(self.event_log);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }
}

fn resolve_path(data_dir: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        data_dir.join(path)
    }
}
