//! Store and node configuration.
//!
//! [`ChainConfig`] tunes the block store itself. [`NodeConfig`] wraps it with
//! the data directory and logging settings used by the `canon-node` binary,
//! and can be layered from a config file and `CANON__*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use canon_core::constants::DEFAULT_MAX_REORG_DEPTH;

/// Block store behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Run the block validator and PoW verifier on ingestion.
    pub validate: bool,
    /// Upper bound on ancestor steps for one reorganization or deletion.
    pub max_reorg_depth: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            validate: true,
            max_reorg_depth: DEFAULT_MAX_REORG_DEPTH,
        }
    }
}

impl ChainConfig {
    /// Configuration with validation disabled, for trusted imports and tests.
    pub fn trusted() -> Self {
        Self {
            validate: false,
            ..Self::default()
        }
    }
}

/// Configuration for a node process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "debug", "canon_store=trace").
    pub log_level: String,
    /// Log output format: "text" or "json".
    pub log_format: String,
    /// Block store settings.
    pub chain: ChainConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("canon");

        Self {
            data_dir,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            chain: ChainConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Path to the RocksDB chain data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chaindata")
    }

    /// Defaults, overlaid by an optional config file, overlaid by
    /// `CANON__*` environment variables (`CANON__CHAIN__VALIDATE=false`).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(
                config::Environment::with_prefix("CANON")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
