//! Proximity between 32-byte addresses.
//!
//! Proximity is the number of leading bits two addresses share, i.e. the
//! leading zeros of their XOR distance. A channel address satisfies a
//! proximity depth `d` toward an overlay when `proximity(address, overlay) >= d`.

use crate::types::{ID_BITS, ID_LEN};

/// Number of leading bits shared by `a` and `b` (256 when equal).
pub fn proximity(a: &[u8; ID_LEN], b: &[u8; ID_LEN]) -> u32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| x ^ y)
        .enumerate()
        .find(|&(_, diff)| diff != 0)
        .map_or(ID_BITS, |(i, diff)| i as u32 * 8 + diff.leading_zeros())
}

/// Whether `address` lies within `depth` leading bits of `target`.
pub fn within_depth(address: &[u8; ID_LEN], target: &[u8; ID_LEN], depth: u8) -> bool {
    proximity(address, target) >= u32::from(depth)
}
