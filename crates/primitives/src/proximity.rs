use crate::{Address, MAX_PO};

/// Proximity order between two addresses in the overlay.
pub trait Proximity {
    /// Proximity order capped at [`MAX_PO`].
    fn proximity(&self, other: &Address) -> u8;

    /// Proximity order capped at `limit`. Identical addresses yield `limit`.
    fn proximity_with_limit(&self, other: &Address, limit: u8) -> u8;
}

impl Proximity for Address {
    fn proximity(&self, other: &Address) -> u8 {
        proximity_impl(self, other, MAX_PO)
    }

    fn proximity_with_limit(&self, other: &Address, limit: u8) -> u8 {
        proximity_impl(self, other, limit)
    }
}

// Proximity returns the proximity order of the MSB distance between x and y
//
// The distance metric MSB(x, y) of two equal length bit sequences x an y is the
// value of the binary integer cast of the x^y, ie., x and y bitwise xor-ed.
// the binary cast is big endian: most significant bit first (=MSB).
//
// Proximity(x, y) is a discrete logarithmic scaling of the MSB distance.
// It is calculated by counting the number of common leading zeros in the (MSB)
// binary representation of the x^y.
//
// (0 farthest, limit closest or self)
fn proximity_impl(one: &Address, other: &Address, limit: u8) -> u8 {
    let bytes = (limit as usize / 8 + 1).min(one.len());
    for (i, (a, b)) in one.iter().zip(other.iter()).take(bytes).enumerate() {
        let oxo = a ^ b;
        if oxo != 0 {
            let po = i * 8 + oxo.leading_zeros() as usize;
            return po.min(limit as usize) as u8;
        }
    }
    limit
}
