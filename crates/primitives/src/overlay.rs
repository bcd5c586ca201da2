use rand::Rng;

use crate::{ADDRESS_SIZE, Address};

/// Returns a uniformly random address whose proximity order to `base` is exactly `po`.
///
/// The first `po` bits are copied from `base`, bit `po` is flipped and the
/// remaining bits are random. A `po` beyond the address width returns `base`.
pub fn random_address_at(base: &Address, po: usize) -> Address {
    random_address_at_with(&mut rand::rng(), base, po)
}

/// Same as [`random_address_at`] with a caller-supplied RNG.
pub fn random_address_at_with<R: Rng + ?Sized>(rng: &mut R, base: &Address, po: usize) -> Address {
    let mut addr = *base;
    if po >= ADDRESS_SIZE * 8 {
        return addr;
    }

    let pos = po / 8;
    let trans = po % 8;
    // bits [0, trans] of the byte at `pos` are fixed, bit `trans` is the flipped one
    let keep_mask: u8 = 0xff << (7 - trans);
    let flip: u8 = 0x80 >> trans;
    let random: u8 = rng.random();

    if let Some(byte) = addr.0.get_mut(pos) {
        *byte = ((*byte & keep_mask) ^ flip) | (random & !keep_mask);
    }
    for byte in addr.0.iter_mut().skip(pos + 1) {
        *byte = rng.random();
    }
    addr
}

/// Converts a storage key into the address space.
///
/// Keys longer than an address are truncated, shorter ones are right-padded with zeros.
pub fn address_from_key(key: &[u8]) -> Address {
    let len = key.len().min(ADDRESS_SIZE);
    Address::right_padding_from(key.get(..len).unwrap_or_default())
}

/// The all-zero address, used on the wire to mean "near the requester".
pub fn is_zero(addr: &Address) -> bool {
    addr.is_zero()
}
