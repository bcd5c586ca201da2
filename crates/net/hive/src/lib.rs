//! Hive peer-exchange protocol for the bzz overlay.
//!
//! The hive protocol lets connected peers gossip known peer addresses so a
//! node can fill under-populated regions of its routing table.
//!
//! # Protocol
//!
//! - Path: `/bzz/hive/1.0.0`
//! - Request: [`ProbeRequest`], asking for peers close to a key (or to the
//!   requester when the key is zero)
//! - Response: [`PeerListResponse`], carrying at most
//!   [`MAX_PEERS_PER_RESPONSE`] [`PeerAddr`] entries and echoing the request id
//!
//! # Flow
//!
//! 1. On connect, each side sends an empty probe (a "hello") to learn about
//!    peers near itself
//! 2. The receiver answers with the closest peers it knows, unless the
//!    probe's deadline has passed
//! 3. The requester validates each advertised IP and merges the rest into
//!    its routing table
//!
//! Frames are a 4-byte big-endian length followed by a postcard body, see
//! [`HiveCodec`].

mod codec;
mod message;

pub use codec::{HiveCodec, HiveCodecError};
pub use message::{HiveMessage, PeerAddr, PeerListResponse, PeerUrlError, ProbeRequest};

/// Protocol name for hive.
pub const PROTOCOL_NAME: &str = "/bzz/hive/1.0.0";

/// Maximum size of a hive frame body (accommodates a full peer list).
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024; // 32 KB

/// Maximum number of peers in a single response.
pub const MAX_PEERS_PER_RESPONSE: usize = 30;
