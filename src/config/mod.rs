//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup and fails fast on invalid values. The database URL
//! is wrapped in secrecy::SecretString to keep it out of logs.

use std::path::Path;
use std::str::FromStr;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::storage::DEFAULT_MAX_SIZE;

/// Which storage backend the binary builds its queue on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Pgmq,
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "pgmq" => Ok(Self::Pgmq),
            other => Err(Error::Config(format!(
                "unknown storage kind {other:?} (expected \"memory\" or \"pgmq\")"
            ))),
        }
    }
}

/// Settings the queue itself needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of workers.
    pub threads: usize,
    /// Store capacity. 0 means unbounded.
    pub max_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            threads: 2,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub queue: QueueConfig,
    pub storage: StorageKind,
    /// Required when `storage` is `Pgmq`.
    pub database_url: Option<SecretString>,
    pub pgmq_queue: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = QueueConfig::default();
        Self {
            queue: QueueConfig {
                threads: parsed_var("CRAWLQ_THREADS", defaults.threads)?,
                max_size: parsed_var("CRAWLQ_MAX_SIZE", defaults.max_size)?,
            },
            storage: parsed_var("CRAWLQ_STORAGE", StorageKind::Memory)?,
            database_url: std::env::var("DATABASE_URL").ok().map(SecretString::from),
            pgmq_queue: std::env::var("CRAWLQ_PGMQ_QUEUE").unwrap_or_else(|_| "crawlq".to_string()),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
        .validated()
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let file: FileConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config {}: {e}", path.display())))?;
        Self::from_file_config(file)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        Self::from_file_config(file)
    }

    fn from_file_config(file: FileConfig) -> Result<Self> {
        Self {
            queue: file.queue,
            storage: file.storage.kind,
            database_url: file.storage.database_url,
            pgmq_queue: file.storage.queue_name,
            otel_endpoint: file.otel_endpoint,
            log_level: file.log_level,
        }
        .validated()
    }

    fn validated(self) -> Result<Self> {
        if self.queue.threads == 0 {
            return Err(Error::Config("threads must be at least 1".to_string()));
        }
        if self.storage == StorageKind::Pgmq && self.database_url.is_none() {
            return Err(Error::Config(
                "pgmq storage requires DATABASE_URL to be set".to_string(),
            ));
        }
        Ok(self)
    }
}

/// On-disk layout.
#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default)]
    queue: QueueConfig,
    #[serde(default)]
    storage: FileStorage,
    otel_endpoint: Option<String>,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct FileStorage {
    #[serde(default = "default_storage_kind")]
    kind: StorageKind,
    database_url: Option<SecretString>,
    #[serde(default = "default_pgmq_queue")]
    queue_name: String,
}

impl Default for FileStorage {
    fn default() -> Self {
        Self {
            kind: default_storage_kind(),
            database_url: None,
            queue_name: default_pgmq_queue(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Memory
}

fn default_pgmq_queue() -> String {
    "crawlq".to_string()
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {name}={raw:?}: {e}"))),
        Err(_) => Ok(default),
    }
}
