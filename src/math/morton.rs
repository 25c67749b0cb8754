//! Morton encoding (Z-order curve) for implicit quadtree indexing
//!
//! The `k`-th node of a quadtree level sits at the cell whose Morton code is
//! `k`: child `c` of a node lands at `4k + c`, which with bit 0 = x and
//! bit 1 = y yields the bottom-left, bottom-right, top-left, top-right order.

/// Spread the low 16 bits of `x` into the even bits of a 32-bit integer
fn spread_bits(x: u32) -> u32 {
    let mut x = x & 0x0000_ffff;
    x = (x | (x << 8)) & 0x00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333;
    x = (x | (x << 1)) & 0x5555_5555;
    x
}

/// Compact the even bits of a 32-bit integer into a 16-bit integer
fn compact_bits(x: u32) -> u32 {
    let mut x = x & 0x5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333;
    x = (x | (x >> 2)) & 0x0f0f_0f0f;
    x = (x | (x >> 4)) & 0x00ff_00ff;
    x = (x | (x >> 8)) & 0x0000_ffff;
    x
}

/// Encode 2D coordinates into a Morton code.
/// Each coordinate can be up to 16 bits.
pub fn encode_morton_2d(x: u32, y: u32) -> u32 {
    spread_bits(x) | (spread_bits(y) << 1)
}

/// Decode a Morton code back to 2D coordinates
pub fn decode_morton_2d(code: u32) -> (u32, u32) {
    (compact_bits(code), compact_bits(code >> 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for x in [0, 1, 10, 100, 500, 1000, 65535] {
            for y in [0, 1, 10, 100, 500, 1000, 65535] {
                let code = encode_morton_2d(x, y);
                assert_eq!(decode_morton_2d(code), (x, y), "Failed for ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_ordering() {
        // Child order within a parent: bottom-left, bottom-right, top-left, top-right
        assert_eq!(encode_morton_2d(0, 0), 0);
        assert_eq!(encode_morton_2d(1, 0), 1);
        assert_eq!(encode_morton_2d(0, 1), 2);
        assert_eq!(encode_morton_2d(1, 1), 3);
        assert_eq!(encode_morton_2d(2, 0), 4);
    }
}
