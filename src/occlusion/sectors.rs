//! Azimuthal sector tables

use std::f64::consts::TAU;

/// Trig lookup for `sectors` evenly spaced azimuth bands, each sampled by
/// `sub_sectors` ray directions
#[derive(Clone, Debug)]
pub struct SectorTable {
    sectors: u32,
    sub_sectors: u32,
    /// `(cos, sin)` of each sector's centre: the direction of its plane
    centers: Vec<(f64, f64)>,
    /// `(cos, sin)` of each sub-sector ray, grouped by sector
    rays: Vec<(f64, f64)>,
}

impl SectorTable {
    pub fn new(sectors: u32, sub_sectors: u32) -> Self {
        let width = TAU / sectors as f64;
        let centers = (0..sectors)
            .map(|k| {
                let a = (k as f64 + 0.5) * width;
                (a.cos(), a.sin())
            })
            .collect();
        let rays = (0..sectors)
            .flat_map(|k| {
                (0..sub_sectors).map(move |j| {
                    let a = (k as f64 + (j as f64 + 0.5) / sub_sectors as f64) * width;
                    (a.cos(), a.sin())
                })
            })
            .collect();

        Self { sectors, sub_sectors, centers, rays }
    }

    pub fn sectors(&self) -> u32 {
        self.sectors
    }

    pub fn sub_sectors(&self) -> u32 {
        self.sub_sectors
    }

    /// Angular width of one sector in radians
    pub fn width(&self) -> f64 {
        TAU / self.sectors as f64
    }

    /// Direction of sector `k`'s projection plane
    pub fn center(&self, k: usize) -> (f64, f64) {
        self.centers[k]
    }

    /// Ray directions sampled for sector `k`
    pub fn rays(&self, k: usize) -> &[(f64, f64)] {
        let n = self.sub_sectors as usize;
        &self.rays[k * n..(k + 1) * n]
    }

    /// Position of `(x, y)` along sector `k`'s plane
    #[inline]
    pub fn project(&self, k: usize, x: f64, y: f64) -> f64 {
        let (c, s) = self.centers[k];
        x * c + y * s
    }

    /// Sector containing azimuth `angle` (any real angle)
    pub fn sector_of(&self, angle: f64) -> usize {
        let k = (angle.rem_euclid(TAU) / self.width()).floor() as usize;
        k.min(self.sectors as usize - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rays_stay_in_their_sector() {
        let table = SectorTable::new(8, 3);
        for k in 0..8 {
            for &(c, s) in table.rays(k) {
                assert_eq!(table.sector_of(s.atan2(c)), k);
            }
            let (c, s) = table.center(k);
            assert_eq!(table.sector_of(s.atan2(c)), k);
        }
    }

    #[test]
    fn test_sector_of_wraps() {
        let table = SectorTable::new(4, 1);
        assert_eq!(table.sector_of(0.1), 0);
        assert_eq!(table.sector_of(-0.1), 3);
        assert_eq!(table.sector_of(TAU + 0.1), 0);
        assert_eq!(table.sector_of(std::f64::consts::PI + 0.1), 2);
    }

    #[test]
    fn test_project() {
        let table = SectorTable::new(4, 1);
        // sector 0 plane points along 45 degrees
        let p = table.project(0, 1.0, 1.0);
        assert!((p - std::f64::consts::SQRT_2).abs() < 1e-9);
    }
}
