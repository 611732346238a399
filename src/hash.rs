//! Key hashing for directory addressing.
//!
//! Records are placed by a 32-bit FNV-1a hash of the key bytes, reduced to
//! its top `depth` bits. Keeping the *high* bits is what makes directory
//! doubling cheap: the bucket addressed by prefix `p` at depth `d` is
//! addressed by prefixes `2p` and `2p + 1` at depth `d + 1`, so a doubled
//! directory is built by duplicating every slot and renumbering.

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 0x0100_0193;

/// Hashes a record id down to its top `depth` bits.
///
/// Returns a value in `[0, 2^depth)`; `depth == 0` always yields 0.
/// For any id, `prefix_hash(id, d) == prefix_hash(id, d + 1) >> 1`.
///
/// # Panics
///
/// Panics in debug builds if `depth > 32`.
pub fn prefix_hash(id: i32, depth: u32) -> u32 {
    debug_assert!(depth <= 32, "depth {} exceeds the 32-bit hash width", depth);

    let mut h = FNV_OFFSET_BASIS;
    for byte in id.to_le_bytes() {
        h = (h ^ u32::from(byte)).wrapping_mul(FNV_PRIME);
    }

    if depth == 0 {
        0
    } else {
        h >> (32 - depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_zero_yields_zero() {
        for id in [i32::MIN, -1, 0, 1, 42, i32::MAX] {
            assert_eq!(prefix_hash(id, 0), 0);
        }
    }

    #[test]
    fn test_result_fits_depth() {
        for depth in 1..=10 {
            for id in -500..500 {
                assert!(prefix_hash(id, depth) < (1 << depth));
            }
        }
    }

    #[test]
    fn test_deterministic() {
        for id in [-7, 0, 123, 99_999] {
            assert_eq!(prefix_hash(id, 8), prefix_hash(id, 8));
        }
    }

    #[test]
    fn test_prefix_property_under_doubling() {
        // A depth-d value must be the depth-(d+1) value with its lowest
        // bit dropped, otherwise doubling would reshuffle records.
        for depth in 0..=16 {
            for id in -200..200 {
                assert_eq!(prefix_hash(id, depth), prefix_hash(id, depth + 1) >> 1);
            }
        }
    }

    #[test]
    fn test_full_width_matches_manual_fnv() {
        let id: i32 = 0x0403_0201;
        let mut h: u32 = FNV_OFFSET_BASIS;
        for byte in [0x01u8, 0x02, 0x03, 0x04] {
            h = (h ^ u32::from(byte)).wrapping_mul(FNV_PRIME);
        }
        assert_eq!(prefix_hash(id, 32), h);
    }

    #[test]
    fn test_spread_over_small_depth() {
        // Sequential ids should not all collapse into one prefix.
        let mut seen = std::collections::HashSet::new();
        for id in 0..64 {
            seen.insert(prefix_hash(id, 3));
        }
        assert!(seen.len() > 1, "sequential ids all hashed to one prefix");
    }
}
