//! Per-peer sync state and the routing table hooks persisting it.

use bzz_kademlia::{HookError, NodeRecord};
use bzz_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Peer;

/// Progress of content synchronisation with a peer, kept across sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// First key of the synced range.
    pub start: Address,
    /// Last key of the synced range.
    pub stop: Address,
    /// First storage index covered.
    pub first: u64,
    /// Last storage index covered.
    pub last: u64,
    /// Unix millis when the syncing session started.
    pub session_at: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid sync state: {0}")]
pub struct SyncStateError(#[from] serde_json::Error);

pub fn encode_sync(state: &SyncState) -> Result<Bytes, SyncStateError> {
    Ok(serde_json::to_vec(state)?.into())
}

pub fn decode_sync(data: &[u8]) -> Result<SyncState, SyncStateError> {
    Ok(serde_json::from_slice(data)?)
}

/// Restore a reconnecting peer's sync state from its record.
///
/// A record without metadata yields the default state.
pub fn load_sync(record: &NodeRecord, peer: &Peer) -> Result<(), HookError> {
    let state = match &record.meta {
        Some(meta) => decode_sync(meta)?,
        None => SyncState::default(),
    };
    peer.set_sync_state(state);
    Ok(())
}

/// Snapshot a peer's sync state into its record. Encoding failures keep the
/// previous metadata.
pub fn save_sync(record: &mut NodeRecord, peer: &Peer) {
    match encode_sync(&peer.sync_state()) {
        Ok(meta) => record.meta = Some(meta),
        Err(e) => warn!(addr = %record.addr, error = %e, "failed to encode sync state"),
    }
}
