//! Horizon ray casting over the toroidal height map

use crate::terrain::HeightMap;

/// Highest point seen along one ray
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Horizon {
    /// Rise over horizontal run from the source to `point`, in cell units
    pub slope: f64,
    /// Unwrapped `(x, y, z)` of the horizon point, z in cell units
    pub point: (f64, f64, f64),
}

/// Walk `length` steps from vertex `(x, y)` along direction `(c, s)`.
///
/// The walk steps one cell along the dominant axis per iteration and keeps
/// the minor axis in 16.16 fixed point. Heights wrap across tile edges.
/// `z_ratio` converts elevation steps into cell units.
pub fn cast_ray(
    hm: &HeightMap,
    x: i64,
    y: i64,
    (c, s): (f64, f64),
    length: u32,
    z_ratio: f64,
) -> Horizon {
    let z0 = hm.sample_wrapped(x, y) as f64 * z_ratio;
    let x_major = c.abs() >= s.abs();
    let (major, minor) = if x_major { (c, s) } else { (s, c) };

    let major_step: i64 = if major >= 0.0 { 1 } else { -1 };
    let minor_fixed = ((minor / major.abs()) * 65536.0).round() as i64;
    let run_per_step = (1.0 + (minor / major).powi(2)).sqrt();

    let mut best = Horizon {
        slope: f64::NEG_INFINITY,
        point: (x as f64, y as f64, z0),
    };
    let mut acc: i64 = 0;
    for t in 1..=length.max(1) as i64 {
        acc += minor_fixed;
        let offset = (acc + 0x8000) >> 16;
        let (dx, dy) = if x_major {
            (t * major_step, offset)
        } else {
            (offset, t * major_step)
        };

        let (hx, hy) = (x + dx, y + dy);
        let z = hm.sample_wrapped(hx, hy) as f64 * z_ratio;
        let slope = (z - z0) / (t as f64 * run_per_step);
        if slope > best.slope {
            best = Horizon {
                slope,
                point: (hx as f64, hy as f64, z),
            };
        }
    }
    best
}

/// Horizon for the sector sampled by `rays`: the sub-direction with the
/// lowest horizon, which never over-states occlusion inside the sector
pub fn sector_horizon(
    hm: &HeightMap,
    x: i64,
    y: i64,
    rays: &[(f64, f64)],
    length: u32,
    z_ratio: f64,
) -> Horizon {
    rays.iter()
        .map(|&dir| cast_ray(hm, x, y, dir, length, z_ratio))
        .min_by(|a, b| a.slope.total_cmp(&b.slope))
        .unwrap_or(Horizon {
            slope: f64::INFINITY,
            point: (x as f64, y as f64, hm.sample_wrapped(x, y) as f64 * z_ratio),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ridge_map() -> HeightMap {
        // wall of height 100 along x = 10
        let mut tile = vec![0u8; 32 * 32];
        for y in 0..32 {
            tile[y * 32 + 10] = 100;
        }
        HeightMap::from_tile(32, &tile).expect("tile")
    }

    #[test]
    fn test_flat_horizon() {
        let hm = HeightMap::flat(16, 20).expect("flat");
        let h = cast_ray(&hm, 3, 3, (1.0, 0.0), 8, 1.0);
        assert_eq!(h.slope, 0.0);
    }

    #[test]
    fn test_ridge_found() {
        let hm = ridge_map();
        let h = cast_ray(&hm, 5, 7, (1.0, 0.0), 16, 0.5);
        assert_eq!(h.point.0, 10.0);
        assert_eq!(h.point.1, 7.0);
        assert!((h.slope - 50.0 / 5.0).abs() < 1e-9);

        // facing away, the ridge wraps around the tile at distance 27
        let back = cast_ray(&hm, 5, 7, (-1.0, 0.0), 32, 0.5);
        assert_eq!(back.point.0, -22.0);
        assert!((back.slope - 50.0 / 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_diagonal_run_length() {
        let mut tile = vec![0u8; 16 * 16];
        tile[4 * 16 + 4] = 10;
        let hm = HeightMap::from_tile(16, &tile).expect("tile");
        let d = std::f64::consts::FRAC_1_SQRT_2;
        let h = cast_ray(&hm, 1, 1, (d, d), 6, 1.0);
        assert_eq!((h.point.0, h.point.1), (4.0, 4.0));
        assert!((h.slope - 10.0 / (3.0 * std::f64::consts::SQRT_2)).abs() < 1e-6);
    }

    #[test]
    fn test_sector_takes_lowest() {
        let hm = ridge_map();
        let rays = [(1.0, 0.0), (0.0, 1.0)];
        let h = sector_horizon(&hm, 5, 7, &rays, 16, 1.0);
        // along +y the ground stays flat
        assert_eq!(h.slope, 0.0);
    }
}
