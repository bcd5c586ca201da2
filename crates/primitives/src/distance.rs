use std::cmp::Ordering;

use alloy_primitives::U256;

use crate::Address;

pub trait Distance {
    /// Returns true if self is closer to `a` than `y` is.
    fn closer(&self, a: &Self, y: &Self) -> bool;
}

impl Distance for Address {
    fn closer(&self, a: &Self, y: &Self) -> bool {
        matches!(distance_cmp(a, self, y), Ordering::Greater)
    }
}

/// Returns the distance between address `x` and address `y` in big-endian.
#[inline(always)]
pub fn distance(x: &Address, y: &Address) -> U256 {
    let mut result = [0u8; 32];
    for (r, (a, b)) in result.iter_mut().zip(x.iter().zip(y.iter())) {
        *r = a ^ b;
    }
    U256::from_be_bytes(result)
}

/// Compares `x` and `y` to `a` in terms of the XOR distance metric.
/// It returns:
///   - `Ordering::Greater` if `x` is closer to `a` than `y`
///   - `Ordering::Equal` if `x` and `y` are equidistant from `a` (this means that `x` and `y`
///     are the same address)
///   - `Ordering::Less` if `x` is farther from `a` than `y`
#[inline(always)]
pub fn distance_cmp(a: &Address, x: &Address, y: &Address) -> Ordering {
    for ((ab, xb), yb) in a.iter().zip(x.iter()).zip(y.iter()) {
        let dx = xb ^ ab;
        let dy = yb ^ ab;

        if dx != dy {
            return match dx < dy {
                true => Ordering::Greater,
                false => Ordering::Less,
            };
        }
    }

    Ordering::Equal
}
