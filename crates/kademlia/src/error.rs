use bzz_primitives::Address;

/// Error returned by sync-state hooks supplied to the routing table.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Routing table errors.
#[derive(Debug, thiserror::Error)]
pub enum KademliaError {
    /// The node does not satisfy the capability contract.
    #[error("invalid node {addr}: {reason}")]
    InvalidNode { addr: Address, reason: &'static str },

    /// The sync-state hook rejected the node's stored metadata.
    #[error("sync hook failed for {addr}: {source}")]
    SyncHook {
        addr: Address,
        #[source]
        source: HookError,
    },

    /// Reading or writing the persisted node records failed.
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted node records could not be (de)serialized.
    #[error("persistence serialization error: {0}")]
    Serialization(String),
}

impl KademliaError {
    /// Whether this error came from the persistence layer.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Serialization(_))
    }
}
