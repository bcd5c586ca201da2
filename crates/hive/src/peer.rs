//! Adapter between a transport connection and the routing table.

use std::{
    fmt,
    net::IpAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use auto_impl::auto_impl;
use bzz_kademlia::Node;
use bzz_net_hive::{HiveMessage, PeerAddr, PeerListResponse, ProbeRequest};
use bzz_primitives::{Address, unix_millis};
use parking_lot::Mutex;

use crate::SyncState;

/// Error enqueueing a message on a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("send queue full")]
    QueueFull,
}

/// Transport-side view of a handshaked connection.
#[auto_impl(&, Arc, Box)]
pub trait PeerConnection: Send + Sync {
    /// Address the peer advertised during the handshake.
    fn remote(&self) -> &PeerAddr;

    /// IP the connection was actually observed from.
    fn observed_ip(&self) -> IpAddr;

    /// Enqueue a message without blocking.
    fn send(&self, msg: HiveMessage) -> Result<(), SendError>;

    /// Close the connection.
    fn close(&self);
}

/// A connected peer as seen by the hive.
pub struct Peer {
    conn: Arc<dyn PeerConnection>,
    last_active: AtomicU64,
    sync: Mutex<SyncState>,
}

impl Peer {
    pub fn new(conn: Arc<dyn PeerConnection>) -> Self {
        Self {
            conn,
            last_active: AtomicU64::new(unix_millis()),
            sync: Mutex::new(SyncState::default()),
        }
    }

    pub fn remote(&self) -> &PeerAddr {
        self.conn.remote()
    }

    pub fn observed_ip(&self) -> IpAddr {
        self.conn.observed_ip()
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        self.last_active.store(unix_millis(), Ordering::Relaxed);
    }

    pub fn send_probe(&self, req: ProbeRequest) -> Result<(), SendError> {
        self.conn.send(req.into())
    }

    pub fn send_peers(&self, resp: PeerListResponse) -> Result<(), SendError> {
        self.conn.send(resp.into())
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.lock().clone()
    }

    pub fn set_sync_state(&self, state: SyncState) {
        *self.sync.lock() = state;
    }
}

impl Node for Peer {
    fn addr(&self) -> Address {
        self.conn.remote().overlay
    }

    fn url(&self) -> String {
        self.conn.remote().url()
    }

    fn last_active(&self) -> u64 {
        self.last_active.load(Ordering::Relaxed)
    }

    fn disconnect(&self) {
        self.conn.close();
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("remote", self.remote())
            .field("last_active", &self.last_active())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let overlay = self.addr().to_string();
        write!(f, "{}", overlay.get(..10).unwrap_or(overlay.as_str()))
    }
}
