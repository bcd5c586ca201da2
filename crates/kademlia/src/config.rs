//! Kademlia routing table configuration.
//!
//! # Bins and buckets
//!
//! The table keeps `max_prox + 1` bins. Bin `po` holds the nodes whose
//! proximity order to the local address is `po`; the deepest bin also
//! collects everything closer than `max_prox`.
//!
//! - **Bucket size** (`bucket_size`, default 4): connected nodes per bin. A
//!   bin below this level is under-populated and drives dialing and
//!   discovery; a connection landing in a full bin evicts the least recently
//!   active node of that bin.
//!
//! # Retry backoff
//!
//! A known-offline record may be dialed once its `after` time has passed.
//! Each time a record is suggested for dialing its retry delay is multiplied
//! by `conn_retry_exp`, starting at `initial_retry_interval` and capped at
//! `max_retry_interval`.
//!
//! # Compaction
//!
//! Offline records not seen for longer than `purge_interval` are dropped
//! when the table is saved.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};

/// Default highest proximity order with a dedicated bin.
pub const DEFAULT_MAX_PROX: u8 = 8;

/// Default number of connected nodes per bin.
pub const DEFAULT_BUCKET_SIZE: usize = 4;

/// Default delay before the first retry of a known-offline node.
pub const DEFAULT_INITIAL_RETRY_INTERVAL: Duration = Duration::from_millis(42);

/// Default multiplier applied to the retry delay after each suggestion.
pub const DEFAULT_CONN_RETRY_EXP: u32 = 2;

/// Default upper bound on the retry delay.
pub const DEFAULT_MAX_RETRY_INTERVAL: Duration = Duration::from_secs(42);

/// Default age after which unseen offline records are purged on save.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(42 * 60 * 60);

/// Configuration for the Kademlia routing table.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KademliaConfig {
    /// Highest proximity order with a dedicated bin (bin count - 1).
    pub max_prox: u8,

    /// Connected nodes per bin.
    pub bucket_size: usize,

    /// Delay before the first retry of a known-offline node.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub initial_retry_interval: Duration,

    /// Multiplier applied to the retry delay after each dial suggestion.
    pub conn_retry_exp: u32,

    /// Upper bound on the retry delay.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_retry_interval: Duration,

    /// Offline records unseen for longer than this are purged on save.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub purge_interval: Duration,
}

impl KademliaConfig {
    /// Number of bins in the table.
    pub fn num_bins(&self) -> usize {
        self.max_prox as usize + 1
    }
}

impl Default for KademliaConfig {
    fn default() -> Self {
        Self {
            max_prox: DEFAULT_MAX_PROX,
            bucket_size: DEFAULT_BUCKET_SIZE,
            initial_retry_interval: DEFAULT_INITIAL_RETRY_INTERVAL,
            conn_retry_exp: DEFAULT_CONN_RETRY_EXP,
            max_retry_interval: DEFAULT_MAX_RETRY_INTERVAL,
            purge_interval: DEFAULT_PURGE_INTERVAL,
        }
    }
}

impl KademliaConfig {
    /// Set the highest proximity order with a dedicated bin.
    pub fn with_max_prox(mut self, max_prox: u8) -> Self {
        self.max_prox = max_prox;
        self
    }

    /// Set the number of connected nodes per bin.
    pub fn with_bucket_size(mut self, size: usize) -> Self {
        self.bucket_size = size;
        self
    }

    /// Set the initial retry delay.
    pub fn with_initial_retry_interval(mut self, interval: Duration) -> Self {
        self.initial_retry_interval = interval;
        self
    }

    /// Set the retry delay multiplier.
    pub fn with_conn_retry_exp(mut self, exp: u32) -> Self {
        self.conn_retry_exp = exp;
        self
    }

    /// Set the retry delay cap.
    pub fn with_max_retry_interval(mut self, interval: Duration) -> Self {
        self.max_retry_interval = interval;
        self
    }

    /// Set the purge age for offline records.
    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }
}
