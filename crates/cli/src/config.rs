//! Engine configuration
//!
//! Loaded from a JSON file; every field has a default so an empty object is
//! a valid config. `TRANCHE_OWNERSHIP_SOURCE` overrides the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tranche_audit::{EmissionConfig, RetentionConfig};
use tranche_core::OwnerId;
use tranche_ownership::OwnershipSource;

pub const OWNERSHIP_SOURCE_ENV: &str = "TRANCHE_OWNERSHIP_SOURCE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Which store is authoritative for ownership
    #[serde(default)]
    pub ownership_source: OwnershipSource,

    /// Bound on every ledger call
    #[serde(default = "default_ledger_timeout_ms")]
    pub ledger_timeout_ms: u64,

    /// SQLite file shared by transfers, ownership and audit events
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// JSONL file the emission worker pushes audit events to
    #[serde(default = "default_sink_path")]
    pub sink_path: PathBuf,

    /// Registered investors
    #[serde(default)]
    pub investors: Vec<OwnerId>,

    #[serde(default)]
    pub emission: EmissionConfig,

    #[serde(default)]
    pub retention: RetentionConfig,
}

fn default_ledger_timeout_ms() -> u64 {
    5_000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/tranche.db")
}

fn default_sink_path() -> PathBuf {
    PathBuf::from("./data/audit-sink.jsonl")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ownership_source: OwnershipSource::default(),
            ledger_timeout_ms: default_ledger_timeout_ms(),
            database_path: default_database_path(),
            sink_path: default_sink_path(),
            investors: Vec::new(),
            emission: EmissionConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// File (or defaults), then environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_override(std::env::var(OWNERSHIP_SOURCE_ENV).ok().as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply a `TRANCHE_OWNERSHIP_SOURCE` value
    pub fn with_env_override(mut self, ownership_source: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(raw) = ownership_source.map(str::trim).filter(|s| !s.is_empty()) {
            self.ownership_source = raw.parse().map_err(|_| {
                ConfigError::Validation(format!("{OWNERSHIP_SOURCE_ENV}={raw:?} is not 'ledger' or 'local'"))
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger_timeout_ms == 0 {
            return Err(ConfigError::Validation("ledger_timeout_ms must be positive".to_string()));
        }
        self.emission
            .validate()
            .and_then(|_| self.retention.validate())
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }
}
