use bzz_kademlia::KademliaError;

/// Hive lifecycle and routing table errors.
#[derive(Debug, thiserror::Error)]
pub enum HiveError {
    #[error("hive is not running")]
    NotRunning,

    #[error("hive is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Kademlia(#[from] KademliaError),

    #[error("persistence task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failure reported by the dial callback.
#[derive(Debug, thiserror::Error)]
#[error("dial {url} failed: {reason}")]
pub struct DialError {
    pub url: String,
    pub reason: String,
}

impl DialError {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { url: url.into(), reason: reason.into() }
    }
}

/// Errors reading or writing a [`HiveConfig`](crate::HiveConfig) file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialization failed: {0}")]
    Serialize(#[from] toml::ser::Error),
}
