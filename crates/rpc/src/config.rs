//! Application configuration
//!
//! Loaded from an optional JSON file, then overridden by `TRADEFLOW_*`
//! environment variables. Missing fields take their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tradeflow_store::RetryPolicy;
use tradeflow_workflow::WorkflowPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Holds `tradeflow.db` and the `blobs/` directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Retry for transient SQLite faults
    #[serde(default)]
    pub persistence_retry: RetryPolicy,

    /// Retry for blob reads during verification
    #[serde(default)]
    pub blob_retry: RetryPolicy,

    #[serde(default)]
    pub workflow: WorkflowPolicy,

    /// Rows shown by `leaderboard` when no limit is given
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_leaderboard_size() -> usize {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persistence_retry: RetryPolicy::default(),
            blob_retry: RetryPolicy::default(),
            workflow: WorkflowPolicy::default(),
            leaderboard_size: default_leaderboard_size(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// File (if any) plus process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `TRADEFLOW_*` overrides read through `var`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(dir) = var("TRADEFLOW_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(n) = parsed(&var, "TRADEFLOW_RETRY_ATTEMPTS")? {
            self.persistence_retry.max_attempts = n;
        }
        if let Some(ms) = parsed(&var, "TRADEFLOW_RETRY_BACKOFF_MS")? {
            self.persistence_retry.backoff_ms = ms;
        }
        if let Some(n) = parsed(&var, "TRADEFLOW_BLOB_RETRY_ATTEMPTS")? {
            self.blob_retry.max_attempts = n;
        }
        if let Some(ms) = parsed(&var, "TRADEFLOW_BLOB_RETRY_BACKOFF_MS")? {
            self.blob_retry.backoff_ms = ms;
        }
        if let Some(on) = parsed(&var, "TRADEFLOW_REQUIRE_AUDIT")? {
            self.workflow.require_audit_before_payment = on;
        }
        if let Some(n) = parsed(&var, "TRADEFLOW_LEADERBOARD_SIZE")? {
            self.leaderboard_size = n;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("tradeflow.db")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

fn parsed<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match var(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            }),
    }
}
