//! Runtime configuration.
//!
//! Loaded from TOML. Every field has a default so an empty file is a valid
//! configuration; `[genesis]` is optional and, when present, describes the
//! `initialize` transaction a fresh session starts with.
//!
//! ```toml
//! data_dir = "data"
//! snapshot_interval = 100
//! log_filter = "org_runtime=info"
//!
//! [genesis]
//! root = "0x00000000000000000000000000000000000000a0"
//!
//! [[genesis.allocations]]
//! holder = "0x00000000000000000000000000000000000000a0"
//! amount = 1000
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use org_kernel::domain::Address;
use org_kernel::events::{Allocation, Transaction, TxEnvelope};

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Directory holding one subdirectory per session.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Take a snapshot every N committed transactions. 0 disables snapshots.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u64,

    /// `tracing` filter directive for binaries embedding the runtime.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub genesis: Option<GenesisConfig>,
}

/// Bootstrap parameters for new sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisConfig {
    /// Receives `CREATE_PERMISSIONS_ROLE` on the ACL.
    pub root: Address,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

const fn default_snapshot_interval() -> u64 {
    100
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            snapshot_interval: default_snapshot_interval(),
            log_filter: default_log_filter(),
            genesis: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation("data_dir must not be empty".to_string()));
        }
        self.env_filter()?;
        if let Some(genesis) = &self.genesis {
            if genesis.root.is_zero() {
                return Err(ConfigError::Validation(
                    "genesis.root must not be the null address".to_string(),
                ));
            }
            let mut seen = BTreeSet::new();
            for a in &genesis.allocations {
                if !seen.insert(a.holder) {
                    return Err(ConfigError::Validation(format!(
                        "genesis allocation for {} listed twice",
                        a.holder
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parse `log_filter` into a `tracing` filter.
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        EnvFilter::try_new(&self.log_filter).map_err(|e| {
            ConfigError::Validation(format!("log_filter {:?}: {}", self.log_filter, e))
        })
    }

    /// Install a stderr `fmt` subscriber filtered by `log_filter`.
    ///
    /// Returns `Ok(false)` if a global subscriber was already installed.
    pub fn init_tracing(&self) -> Result<bool, ConfigError> {
        let filter = self.env_filter()?;
        Ok(tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok())
    }

    /// The first transaction of a fresh session, if genesis is configured.
    pub fn genesis_envelope(&self) -> Option<TxEnvelope> {
        self.genesis.as_ref().map(|g| {
            TxEnvelope::new(
                1,
                g.root,
                Transaction::Initialize {
                    root: g.root,
                    allocations: g.allocations.clone(),
                },
            )
        })
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
