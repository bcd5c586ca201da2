//! Anti-spoofing check for addresses relayed through peer exchange.
//!
//! A peer may only advertise addresses the sender could plausibly reach:
//! no unspecified or special-purpose addresses, no loopback addresses unless
//! the sender itself is on loopback, and no LAN addresses unless the sender
//! is on a LAN.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};

/// Reason a relayed address was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RelayIpError {
    #[error("unspecified address")]
    Unspecified,
    #[error("special network address")]
    SpecialNetwork,
    #[error("loopback address relayed by non-loopback host")]
    LoopbackFromRemote,
    #[error("LAN address relayed by WAN host")]
    LanFromWan,
}

/// LAN ranges (RFC 1918 and friends).
const LAN_V4: &[Ipv4Net] = &[
    Ipv4Net::new_assert(Ipv4Addr::new(0, 0, 0, 0), 8),
    Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 8),
    Ipv4Net::new_assert(Ipv4Addr::new(172, 16, 0, 0), 12),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 168, 0, 0), 16),
];

const LAN_V6: &[Ipv6Net] = &[
    Ipv6Net::new_assert(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
    Ipv6Net::new_assert(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
];

/// IANA special-purpose ranges that are never valid peer addresses.
const SPECIAL_V4: &[Ipv4Net] = &[
    Ipv4Net::new_assert(Ipv4Addr::new(192, 0, 0, 0), 29),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 0, 0, 9), 32),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 0, 0, 170), 32),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 0, 0, 171), 32),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 0, 2, 0), 24),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 31, 196, 0), 24),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 52, 193, 0), 24),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 88, 99, 0), 24),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 175, 48, 0), 24),
    Ipv4Net::new_assert(Ipv4Addr::new(198, 18, 0, 0), 15),
    Ipv4Net::new_assert(Ipv4Addr::new(198, 51, 100, 0), 24),
    Ipv4Net::new_assert(Ipv4Addr::new(203, 0, 113, 0), 24),
    Ipv4Net::new_assert(Ipv4Addr::new(255, 255, 255, 255), 32),
];

const SPECIAL_V6: &[Ipv6Net] = &[
    Ipv6Net::new_assert(Ipv6Addr::new(0x0100, 0, 0, 0, 0, 0, 0, 0), 64),
    Ipv6Net::new_assert(Ipv6Addr::new(0x2001, 0, 0, 0, 0, 0, 0, 0), 32),
    Ipv6Net::new_assert(Ipv6Addr::new(0x2001, 0x1, 0, 0, 0, 0, 0, 0x1), 128),
    Ipv6Net::new_assert(Ipv6Addr::new(0x2001, 0x2, 0, 0, 0, 0, 0, 0), 48),
    Ipv6Net::new_assert(Ipv6Addr::new(0x2001, 0x3, 0, 0, 0, 0, 0, 0), 32),
    Ipv6Net::new_assert(Ipv6Addr::new(0x2001, 0x4, 0x112, 0, 0, 0, 0, 0), 48),
    Ipv6Net::new_assert(Ipv6Addr::new(0x2001, 0x5, 0, 0, 0, 0, 0, 0), 32),
    Ipv6Net::new_assert(Ipv6Addr::new(0x2001, 0x10, 0, 0, 0, 0, 0, 0), 28),
    Ipv6Net::new_assert(Ipv6Addr::new(0x2001, 0x20, 0, 0, 0, 0, 0, 0), 28),
    Ipv6Net::new_assert(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0), 32),
    Ipv6Net::new_assert(Ipv6Addr::new(0x2002, 0, 0, 0, 0, 0, 0, 0), 16),
];

/// Validate `addr`, advertised by a peer observed at `sender`.
pub fn check_relay_ip(sender: IpAddr, addr: IpAddr) -> Result<(), RelayIpError> {
    let sender = sender.to_canonical();
    let addr = addr.to_canonical();

    if addr.is_unspecified() {
        return Err(RelayIpError::Unspecified);
    }
    if is_special_network(addr) {
        return Err(RelayIpError::SpecialNetwork);
    }
    if addr.is_loopback() && !sender.is_loopback() {
        return Err(RelayIpError::LoopbackFromRemote);
    }
    if is_lan(addr) && !is_lan(sender) {
        return Err(RelayIpError::LanFromWan);
    }
    Ok(())
}

/// Loopback or private/link-local range.
pub fn is_lan(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }
    match ip {
        IpAddr::V4(v4) => LAN_V4.iter().any(|net| net.contains(&v4)),
        IpAddr::V6(v6) => LAN_V6.iter().any(|net| net.contains(&v6)),
    }
}

/// Multicast, broadcast, documentation, benchmarking or otherwise reserved.
pub fn is_special_network(ip: IpAddr) -> bool {
    if ip.is_multicast() {
        return true;
    }
    match ip {
        IpAddr::V4(v4) => SPECIAL_V4.iter().any(|net| net.contains(&v4)),
        IpAddr::V6(v6) => SPECIAL_V6.iter().any(|net| net.contains(&v6)),
    }
}
