//! Overlay membership for bzz nodes.
//!
//! The [`Hive`] owns the node's Kademlia routing table and keeps it
//! populated: it registers connections reported by the transport, gossips
//! peer addresses with connected peers, and periodically asks the transport
//! to dial known-offline nodes for under-populated bins.
//!
//! # Collaborators
//!
//! - the transport wraps each handshaked connection in a [`Peer`] through the
//!   [`PeerConnection`] trait and reports it with [`Hive::add_peer`] and
//!   [`Hive::remove_peer`]
//! - inbound hive frames are passed to [`Hive::handle_message`]
//! - outbound dials go through the `connect` callback given to [`Hive::start`]
//!
//! # Persistence
//!
//! With a `persist_path` configured, node records are restored on start and
//! saved on stop, each connected peer's [`SyncState`] stored alongside its
//! record.

mod config;
mod error;
mod hive;
mod metrics;
mod peer;
mod relay;
mod scheduler;
mod sync;

pub use config::{DEFAULT_CALL_INTERVAL, HiveConfig, PERSIST_FILE_NAME};
pub use error::{ConfigError, DialError, HiveError};
pub use hive::{Hive, RelayCheck};
pub use peer::{Peer, PeerConnection, SendError};
pub use relay::{RelayIpError, check_relay_ip, is_lan, is_special_network};
pub use scheduler::Scheduler;
pub use sync::{SyncState, SyncStateError, decode_sync, encode_sync, load_sync, save_sync};
