//! Per-patch geometric error for each mip level
//!
//! Dropping from level 0 to level `L` replaces the heights inside every
//! `2^L` cell by the two triangles spanning its corners (split along the
//! `(x, y)`-`(x + 2^L, y + 2^L)` diagonal). The error of a level is the
//! largest (or mean) vertical distance between that surface and the true
//! heights, in elevation units, and never smaller than the error of the
//! level below it.

use rayon::prelude::*;

use super::config::ErrorMode;
use super::heightmap::HeightMap;
use super::quadtree::count_patch_levels;

/// Error of the `step`-cell cell at `(x0, y0)`: (sum, max, samples)
fn cell_error(hm: &HeightMap, x0: u32, y0: u32, step: u32) -> (f64, f32, u32) {
    let h00 = hm.get(x0, y0) as f32;
    let h10 = hm.get(x0 + step, y0) as f32;
    let h01 = hm.get(x0, y0 + step) as f32;
    let h11 = hm.get(x0 + step, y0 + step) as f32;
    let inv = 1.0 / step as f32;

    let mut sum = 0.0f64;
    let mut max = 0.0f32;
    let mut samples = 0;
    for j in 0..=step {
        for i in 0..=step {
            let (u, v) = (i as f32 * inv, j as f32 * inv);
            let approx = if i >= j {
                h00 + (h10 - h00) * u + (h11 - h10) * v
            } else {
                h00 + (h11 - h01) * u + (h01 - h00) * v
            };
            let err = (approx - hm.get(x0 + i, y0 + j) as f32).abs();
            sum += err as f64;
            max = max.max(err);
            samples += 1;
        }
    }
    (sum, max, samples)
}

/// Monotone error array for the patch at tile cell `(x0, y0)`
pub fn patch_errors(
    hm: &HeightMap,
    x0: u32,
    y0: u32,
    patch_size: u32,
    mode: ErrorMode,
) -> Vec<f32> {
    let levels = count_patch_levels(patch_size);
    let mut errors = Vec::with_capacity(levels as usize);
    errors.push(0.0);

    for level in 1..levels {
        let step = 1 << level;
        let mut sum = 0.0f64;
        let mut max = 0.0f32;
        let mut samples = 0u32;
        for cy in (0..patch_size).step_by(step as usize) {
            for cx in (0..patch_size).step_by(step as usize) {
                let (s, m, n) = cell_error(hm, x0 + cx, y0 + cy, step);
                sum += s;
                max = max.max(m);
                samples += n;
            }
        }

        let err = match mode {
            ErrorMode::Max => max,
            ErrorMode::Average => (sum / samples.max(1) as f64) as f32,
        };
        let prev = errors[level as usize - 1];
        errors.push(err.max(prev));
    }
    errors
}

/// Error arrays for every patch of one height map tile
#[derive(Clone, Debug)]
pub struct ErrorTable {
    patches_per_side: u32,
    levels: u32,
    errors: Vec<f32>,
}

impl ErrorTable {
    pub fn build(hm: &HeightMap, patch_size: u32, mode: ErrorMode) -> Self {
        let patches_per_side = hm.size() / patch_size;
        let levels = count_patch_levels(patch_size);

        let errors: Vec<f32> = (0..patches_per_side * patches_per_side)
            .into_par_iter()
            .flat_map_iter(|p| {
                let (px, py) = (p % patches_per_side, p / patches_per_side);
                patch_errors(hm, px * patch_size, py * patch_size, patch_size, mode)
            })
            .collect();

        Self { patches_per_side, levels, errors }
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Errors of tile patch `(px, py)`, indexed by level
    pub fn patch(&self, px: u32, py: u32) -> &[f32] {
        let start = ((py * self.patches_per_side + px) * self.levels) as usize;
        &self.errors[start..start + self.levels as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spike_map() -> HeightMap {
        let mut tile = vec![0u8; 16 * 16];
        tile[4 * 16 + 4] = 255;
        HeightMap::from_tile(16, &tile).expect("tile")
    }

    #[test]
    fn test_flat_patch_has_no_error() {
        let hm = HeightMap::flat(16, 40).expect("flat");
        let table = ErrorTable::build(&hm, 8, ErrorMode::Max);
        for py in 0..2 {
            for px in 0..2 {
                assert!(table.patch(px, py).iter().all(|e| *e == 0.0));
            }
        }
    }

    #[test]
    fn test_planar_slope_has_no_error() {
        // the slope only wraps outside the first 16x16 patch
        let mut tile = vec![0u8; 32 * 32];
        for y in 0..32 {
            for x in 0..32 {
                tile[y * 32 + x] = (x * 3 + y * 5) as u8;
            }
        }
        let hm = HeightMap::from_tile(32, &tile).expect("tile");
        let errors = patch_errors(&hm, 0, 0, 16, ErrorMode::Max);
        assert!(errors.iter().all(|e| *e == 0.0));
    }

    #[test]
    fn test_spike_error() {
        let hm = spike_map();
        let table = ErrorTable::build(&hm, 8, ErrorMode::Max);
        let spiky = table.patch(0, 0);
        let flat = table.patch(1, 0);

        assert_eq!(spiky[0], 0.0);
        // (4, 4) vanishes from level 3 onward
        assert_eq!(spiky[3], 255.0);
        assert!(spiky[table.levels() as usize - 1] > flat[table.levels() as usize - 1]);
        assert!(flat.iter().all(|e| *e == 0.0));
    }

    #[test]
    fn test_errors_monotone() {
        let mut tile = vec![0u8; 32 * 32];
        for (i, h) in tile.iter_mut().enumerate() {
            *h = ((i * 7919) % 256) as u8;
        }
        let hm = HeightMap::from_tile(32, &tile).expect("tile");

        for mode in [ErrorMode::Max, ErrorMode::Average] {
            let table = ErrorTable::build(&hm, 16, mode);
            for py in 0..2 {
                for px in 0..2 {
                    let errors = table.patch(px, py);
                    assert_eq!(errors[0], 0.0);
                    assert!(errors.windows(2).all(|w| w[0] <= w[1]), "{:?}", errors);
                }
            }
        }
    }

    #[test]
    fn test_average_not_above_max() {
        let hm = spike_map();
        let max = patch_errors(&hm, 0, 0, 8, ErrorMode::Max);
        let avg = patch_errors(&hm, 0, 0, 8, ErrorMode::Average);
        for (a, m) in avg.iter().zip(&max) {
            assert!(a <= m);
        }
        assert!(avg[3] > 0.0);
    }
}
