use std::time::Duration;

use bzz_primitives::{Address, Bytes, unix_millis};
use serde::{Deserialize, Serialize};

use crate::KademliaConfig;

/// Persistent knowledge about a node, connected or not.
///
/// Timestamps are unix milliseconds. `after` is the earliest time the node
/// may be dialed again; `meta` carries the opaque sync state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub addr: Address,
    pub url: String,
    pub seen: u64,
    pub after: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Bytes>,
}

impl NodeRecord {
    /// Fresh record, seen and dialable now.
    pub fn new(addr: Address, url: impl Into<String>) -> Self {
        let now = unix_millis();
        Self { addr, url: url.into(), seen: now, after: now, meta: None }
    }

    pub fn is_dialable(&self, now: u64) -> bool {
        self.after <= now
    }

    /// Delay to wait before the next dial attempt.
    ///
    /// The current delay (`after - seen`, at least the initial interval) is
    /// multiplied by `conn_retry_exp` and capped at `max_retry_interval`.
    pub fn next_retry_delay(&self, config: &KademliaConfig) -> Duration {
        let initial = initial_retry_millis(config);
        let cap = (config.max_retry_interval.as_millis() as u64).max(initial);
        let current = self.after.saturating_sub(self.seen).max(initial);
        let next = current.saturating_mul(u64::from(config.conn_retry_exp));
        Duration::from_millis(next.clamp(initial, cap))
    }

    /// Mark the node as just gone offline: dialable again after the initial interval.
    pub(crate) fn mark_offline(&mut self, config: &KademliaConfig, now: u64) {
        self.seen = now;
        self.after = now.saturating_add(initial_retry_millis(config));
    }

    /// Push `after` forward by the next backoff step.
    pub(crate) fn back_off(&mut self, config: &KademliaConfig, now: u64) {
        let delay = self.next_retry_delay(config).as_millis() as u64;
        self.after = now.saturating_add(delay);
    }
}

fn initial_retry_millis(config: &KademliaConfig) -> u64 {
    (config.initial_retry_interval.as_millis() as u64).max(1)
}
