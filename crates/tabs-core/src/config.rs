use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

pub const DEFAULT_KIND: &str = "tabs";
pub const DEFAULT_PATH: &str = "/tabs";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub log_path: Option<PathBuf>,
    pub snapshot_every: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            snapshot_every: 64,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub kind: String,
    pub path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kind: DEFAULT_KIND.to_string(),
            path: DEFAULT_PATH.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
