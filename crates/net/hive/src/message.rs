use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

use alloy_primitives::hex;
use bzz_primitives::{Address, NodeId};
use serde::{Deserialize, Serialize};

/// Network address of a peer as advertised in peer lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr {
    /// Overlay address in the routing table.
    pub overlay: Address,
    /// Stable node identifier (public key).
    pub node_id: NodeId,
    /// Claimed IP, checked against the relaying peer's observed IP.
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(overlay: Address, node_id: NodeId, ip: IpAddr, port: u16) -> Self {
        Self { overlay, node_id, ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Dialable `enode://<node id hex>@<ip>:<port>` URL.
    pub fn url(&self) -> String {
        format!("{ENODE_SCHEME}{}@{}", hex::encode(self.node_id), self.socket_addr())
    }

    /// Parse a URL produced by [`PeerAddr::url`]. Query parameters are ignored.
    pub fn from_url(overlay: Address, url: &str) -> Result<Self, PeerUrlError> {
        let rest = url.strip_prefix(ENODE_SCHEME).ok_or(PeerUrlError::Scheme)?;
        let (id, host) = rest.split_once('@').ok_or(PeerUrlError::MissingHost)?;
        let node_id: NodeId = id.parse().map_err(|_| PeerUrlError::NodeId)?;
        let host = host.split_once('?').map_or(host, |(host, _)| host);
        let socket: SocketAddr = host.parse().map_err(|_| PeerUrlError::SocketAddr)?;
        Ok(Self::new(overlay, node_id, socket.ip(), socket.port()))
    }
}

const ENODE_SCHEME: &str = "enode://";

/// Error parsing a peer URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PeerUrlError {
    #[error("missing enode:// scheme")]
    Scheme,
    #[error("missing @host:port")]
    MissingHost,
    #[error("invalid node id")]
    NodeId,
    #[error("invalid ip:port")]
    SocketAddr,
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Request for peers close to `key`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    /// Target key. Zero means "peers close to me".
    pub key: Address,
    /// Peers wanted. Zero lets the responder choose.
    pub max_peers: u32,
    /// Request id, echoed in the response.
    pub id: u64,
    /// Unix millis after which the request must be ignored.
    pub deadline: Option<u64>,
}

impl ProbeRequest {
    /// The empty probe sent to every newly connected peer.
    pub fn hello() -> Self {
        Self::default()
    }

    pub fn lookup(key: Address, max_peers: u32, id: u64) -> Self {
        Self { key, max_peers, id, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: u64) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether the deadline is strictly before `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.deadline.is_some_and(|deadline| deadline < now)
    }

    pub fn is_self_lookup(&self) -> bool {
        self.key.is_zero()
    }
}

/// Peers returned for a [`ProbeRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerListResponse {
    pub peers: Vec<PeerAddr>,
    /// Echo of the request key, `None` for self lookups.
    pub key: Option<Address>,
    pub id: u64,
    pub deadline: Option<u64>,
}

impl PeerListResponse {
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }
}

/// A hive protocol frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HiveMessage {
    Probe(ProbeRequest),
    Peers(PeerListResponse),
}

impl From<ProbeRequest> for HiveMessage {
    fn from(req: ProbeRequest) -> Self {
        Self::Probe(req)
    }
}

impl From<PeerListResponse> for HiveMessage {
    fn from(resp: PeerListResponse) -> Self {
        Self::Peers(resp)
    }
}
