//! metal.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_STORE_PATH: &str = "/var/lib/metal/metal.redb";
const DEFAULT_CLAIM_ATTEMPTS: u32 = 3;
const DEFAULT_LOG_FILTER: &str = "info,metal=debug";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetalConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AllocationConfig {
    /// Select-and-claim rounds a caller makes when it loses a claim race.
    pub claim_attempts: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            claim_attempts: DEFAULT_CLAIM_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl MetalConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: MetalConfig = toml::from_str(content)?;
        config.allocation.claim_attempts = config.allocation.claim_attempts.max(1);
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a config that keeps its store below the given data directory.
    pub fn scaffold(data_dir: &Path) -> Self {
        MetalConfig {
            store: StoreConfig {
                path: data_dir.join("metal.redb"),
            },
            ..Default::default()
        }
    }
}
