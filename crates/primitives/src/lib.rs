//! Address space and proximity metric for the bzz overlay network.
//!
//! # Types
//!
//! - [`Address`] - 32-byte overlay address, same width as content keys
//! - [`NodeId`] - stable 64-byte node identifier used in dialable URLs
//!
//! # Metric
//!
//! Two addresses are compared through their XOR distance ([`distance`],
//! [`distance_cmp`]) and its logarithmic scaling, the proximity order
//! ([`Proximity`]): the number of leading bits two addresses share.

use std::time::{SystemTime, UNIX_EPOCH};

mod distance;
mod overlay;
mod proximity;

pub use distance::{Distance, distance, distance_cmp};
pub use overlay::{address_from_key, is_zero, random_address_at, random_address_at_with};
pub use proximity::Proximity;

pub use alloy_primitives::{B256, B512, Bytes, U256};

/// Size of an overlay address in bytes.
pub const ADDRESS_SIZE: usize = 32;

/// Maximum proximity order representable for 256-bit addresses.
pub const MAX_PO: u8 = 255;

/// Overlay address for routing and proximity calculations.
pub type Address = B256;

/// Stable node identifier (the node's public key).
pub type NodeId = B512;

/// Current wall-clock time as milliseconds since the unix epoch.
///
/// All timestamps persisted by the overlay use this unit.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
