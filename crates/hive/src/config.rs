//! Hive configuration.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use bzz_kademlia::KademliaConfig;
use bzz_net_hive::MAX_PEERS_PER_RESPONSE;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::ConfigError;

/// Default period of the maintenance scheduler.
pub const DEFAULT_CALL_INTERVAL: Duration = Duration::from_secs(3);

/// File name of the persisted node records inside the data directory.
pub const PERSIST_FILE_NAME: &str = "bzz-peers.json";

/// Configuration for the [`Hive`](crate::Hive).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    /// Maintenance scheduler tick period.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub call_interval: Duration,

    /// Upper bound on peers returned to a single probe.
    pub max_peers_per_response: usize,

    /// Where node records are persisted. `None` disables persistence.
    pub persist_path: Option<PathBuf>,

    /// Routing table parameters.
    pub kademlia: KademliaConfig,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            call_interval: DEFAULT_CALL_INTERVAL,
            max_peers_per_response: MAX_PEERS_PER_RESPONSE,
            persist_path: None,
            kademlia: KademliaConfig::default(),
        }
    }
}

impl HiveConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Persist node records as [`PERSIST_FILE_NAME`] inside `datadir`.
    pub fn init_path(&mut self, datadir: impl AsRef<Path>) {
        self.persist_path = Some(datadir.as_ref().join(PERSIST_FILE_NAME));
    }

    pub fn with_call_interval(mut self, interval: Duration) -> Self {
        self.call_interval = interval;
        self
    }

    pub fn with_max_peers_per_response(mut self, max: usize) -> Self {
        self.max_peers_per_response = max;
        self
    }

    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    pub fn with_kademlia(mut self, kademlia: KademliaConfig) -> Self {
        self.kademlia = kademlia;
        self
    }
}
