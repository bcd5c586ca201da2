use std::sync::Arc;

use auto_impl::auto_impl;
use bzz_primitives::Address;

use crate::NodeRecord;

/// Capability a connected peer must provide to live in the routing table.
#[auto_impl(&, Arc, Box)]
pub trait Node: Send + Sync {
    /// Overlay address.
    fn addr(&self) -> Address;

    /// Dialable URL, stored in the node's record.
    fn url(&self) -> String;

    /// Last time the node was active, in unix milliseconds.
    fn last_active(&self) -> u64;

    /// Tear down the underlying connection.
    fn disconnect(&self);
}

/// A routing table entry: either a live connection or a known-offline record.
#[derive(Debug)]
pub enum KnownNode<N> {
    Connected(Arc<N>),
    Offline(NodeRecord),
}

impl<N> Clone for KnownNode<N> {
    fn clone(&self) -> Self {
        match self {
            Self::Connected(node) => Self::Connected(Arc::clone(node)),
            Self::Offline(record) => Self::Offline(record.clone()),
        }
    }
}

impl<N: Node> KnownNode<N> {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

impl<N: Node> Node for KnownNode<N> {
    fn addr(&self) -> Address {
        match self {
            Self::Connected(node) => node.addr(),
            Self::Offline(record) => record.addr,
        }
    }

    fn url(&self) -> String {
        match self {
            Self::Connected(node) => node.url(),
            Self::Offline(record) => record.url.clone(),
        }
    }

    fn last_active(&self) -> u64 {
        match self {
            Self::Connected(node) => node.last_active(),
            Self::Offline(record) => record.seen,
        }
    }

    /// No-op for offline records.
    fn disconnect(&self) {
        if let Self::Connected(node) = self {
            node.disconnect();
        }
    }
}
