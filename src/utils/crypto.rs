use sha1::{Digest, Sha1};

use crate::utils::types::HashPos;

/// Number of positions on a ring with the given bit width.
pub fn ring_size(bits: u8) -> u64 {
    1u64 << bits
}

/// SHA-1 of `bytes`, reduced mod 2^bits. Matches truncating the 160-bit
/// big-endian digest, so only the low `bits` bits of the tail survive.
pub fn hash_id(bytes: &[u8], bits: u8) -> HashPos {
    let digest = Sha1::digest(bytes);
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[12..20]);
    u64::from_be_bytes(tail) % ring_size(bits)
}

/// True iff `x` lies strictly between `a` and `b` going clockwise.
/// The arc from a position to itself is empty.
pub fn in_open_arc(x: HashPos, a: HashPos, b: HashPos) -> bool {
    if a < b {
        a < x && x < b
    } else if a > b {
        x > a || x < b
    } else {
        false
    }
}

/// True iff `x` lies on the clockwise arc (a, b], i.e. strictly after `a`
/// and at or before `b`. When a == b the arc collapses to the single
/// position b.
pub fn in_half_open_arc(x: HashPos, a: HashPos, b: HashPos) -> bool {
    if a < b {
        a < x && x <= b
    } else if a > b {
        x > a || x <= b
    } else {
        x == b
    }
}
