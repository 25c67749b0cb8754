//! Height map storage
//!
//! A height map of size `n` (a power of two) stores `(n + 1) x (n + 1)` byte
//! elevations row-major. The last row and column duplicate the first so the
//! map tiles seamlessly.

use std::path::Path;

use crate::core::{Error, Result};

/// Immutable byte height field
#[derive(Clone, PartialEq, Eq)]
pub struct HeightMap {
    size: u32,
    data: Vec<u8>,
}

impl HeightMap {
    /// Wrap an already edge-duplicated `(size + 1)^2` buffer
    pub fn from_wrapped(size: u32, data: Vec<u8>) -> Result<Self> {
        Self::check_size(size)?;
        let expected = ((size + 1) * (size + 1)) as usize;
        if data.len() != expected {
            return Err(Error::HeightMap(format!(
                "expected {} bytes for a {}x{} map, got {}",
                expected, size, size, data.len()
            )));
        }

        // vertex arrays read the far edge through column and row 0
        let n = size as usize;
        let stride = n + 1;
        let row_wraps = data[n * stride..] == data[..stride];
        let column_wraps = (0..stride).all(|y| data[y * stride + n] == data[y * stride]);
        if !(row_wraps && column_wraps) {
            return Err(Error::HeightMap(
                "last row and column must repeat the first for a wrapped map".to_string(),
            ));
        }
        Ok(Self { size, data })
    }

    /// Build from a `size x size` tile, duplicating row and column 0 at the far edges
    pub fn from_tile(size: u32, tile: &[u8]) -> Result<Self> {
        Self::check_size(size)?;
        let n = size as usize;
        if tile.len() != n * n {
            return Err(Error::HeightMap(format!(
                "expected {} bytes for a {}x{} tile, got {}",
                n * n, size, size, tile.len()
            )));
        }

        let stride = n + 1;
        let mut data = vec![0u8; stride * stride];
        for y in 0..=n {
            let src_row = (y % n) * n;
            for x in 0..=n {
                data[y * stride + x] = tile[src_row + x % n];
            }
        }
        Ok(Self { size, data })
    }

    /// Uniform elevation everywhere
    pub fn flat(size: u32, height: u8) -> Result<Self> {
        Self::check_size(size)?;
        let stride = (size + 1) as usize;
        Ok(Self { size, data: vec![height; stride * stride] })
    }

    /// Load an 8-bit grayscale image. Square power-of-two images are treated as
    /// tiles; `2^n + 1` images are taken as already edge-duplicated.
    pub fn from_image(path: &Path) -> Result<Self> {
        let image = image::open(path)?.to_luma8();
        let (width, height) = image.dimensions();
        if width != height {
            return Err(Error::HeightMap(format!(
                "{}: height map must be square, got {}x{}",
                path.display(), width, height
            )));
        }

        let pixels = image.into_raw();
        if width.is_power_of_two() {
            Self::from_tile(width, &pixels)
        } else {
            Self::from_wrapped(width.saturating_sub(1), pixels)
        }
    }

    fn check_size(size: u32) -> Result<()> {
        if size < 2 || !size.is_power_of_two() || size > 1 << 15 {
            return Err(Error::HeightMap(format!(
                "height map size {} must be a power of two in 2..=32768",
                size
            )));
        }
        Ok(())
    }

    /// Cells per side (vertices per side minus one)
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Raw `(size + 1)^2` bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Elevation at vertex `(x, y)` with `x, y <= size`
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y * (self.size + 1) + x) as usize]
    }

    /// Elevation at any integer vertex, wrapping toroidally
    #[inline]
    pub fn sample_wrapped(&self, x: i64, y: i64) -> u8 {
        let n = self.size as i64;
        self.get(x.rem_euclid(n) as u32, y.rem_euclid(n) as u32)
    }

    /// Min and max elevation over the inclusive vertex rectangle
    pub fn min_max(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> (u8, u8) {
        let mut lo = u8::MAX;
        let mut hi = u8::MIN;
        for y in y0..=y1 {
            let row = (y * (self.size + 1)) as usize;
            for &h in &self.data[row + x0 as usize..=row + x1 as usize] {
                lo = lo.min(h);
                hi = hi.max(h);
            }
        }
        (lo, hi)
    }

    /// FNV-1a hash of size and contents, used to key derived caches
    pub fn checksum(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = OFFSET;
        for byte in self.size.to_le_bytes().iter().chain(self.data.iter()) {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
        hash
    }
}

impl std::fmt::Debug for HeightMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeightMap")
            .field("size", &self.size)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tile_duplicates_edges() {
        let tile: Vec<u8> = (0..16).collect();
        let hm = HeightMap::from_tile(4, &tile).expect("tile");
        assert_eq!(hm.data().len(), 25);
        assert_eq!(hm.get(4, 0), hm.get(0, 0));
        assert_eq!(hm.get(2, 4), hm.get(2, 0));
        assert_eq!(hm.get(4, 4), 0);
        assert_eq!(hm.get(3, 2), 11);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(HeightMap::flat(12, 0).is_err());
        assert!(HeightMap::from_wrapped(4, vec![0; 16]).is_err());
        assert!(HeightMap::from_tile(4, &[0; 15]).is_err());
    }

    #[test]
    fn test_from_wrapped_requires_duplicated_edges() {
        let wrapped = HeightMap::from_tile(4, &(0..16).collect::<Vec<u8>>()).expect("tile");
        assert!(HeightMap::from_wrapped(4, wrapped.data().to_vec()).is_ok());

        let mut column = wrapped.data().to_vec();
        column[2 * 5 + 4] = 99;
        assert!(HeightMap::from_wrapped(4, column).is_err());

        let mut row = wrapped.data().to_vec();
        row[4 * 5 + 1] = 99;
        assert!(HeightMap::from_wrapped(4, row).is_err());
    }

    #[test]
    fn test_sample_wrapped() {
        let tile: Vec<u8> = (0..16).collect();
        let hm = HeightMap::from_tile(4, &tile).expect("tile");
        assert_eq!(hm.sample_wrapped(-1, 0), hm.get(3, 0));
        assert_eq!(hm.sample_wrapped(5, 9), hm.get(1, 1));
    }

    #[test]
    fn test_min_max() {
        let mut tile = vec![10u8; 64];
        tile[9] = 200;
        tile[63] = 3;
        let hm = HeightMap::from_tile(8, &tile).expect("tile");
        assert_eq!(hm.min_max(0, 0, 2, 2), (10, 200));
        assert_eq!(hm.min_max(4, 4, 8, 8), (3, 10));
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let a = HeightMap::flat(4, 0).expect("flat");
        let b = HeightMap::flat(4, 1).expect("flat");
        assert_ne!(a.checksum(), b.checksum());
        assert_eq!(a.checksum(), a.clone().checksum());
    }
}
