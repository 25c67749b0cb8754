//! Per-node, per-sector occlusion envelopes and the visibility query

use std::f64::consts::PI;
use std::time::Instant;

use rayon::prelude::*;

use crate::core::types::Vec3;
use crate::core::{Error, Result};
use crate::terrain::quadtree::{children, level_start, QuadTree};
use crate::terrain::{HeightMap, OcclusionConfig};

use super::envelope::{self, HorizonLine};
use super::horizon::sector_horizon;
use super::sectors::SectorTable;

/// Parameters an occlusion map was built with
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OcclusionParams {
    pub hm_size: u32,
    pub occ_patch_size: u32,
    pub sectors: u32,
    pub sub_sectors: u32,
    pub max_occ_pts: u32,
    pub max_ray_length: u32,
    /// Elevation step expressed in cells (`scale.z / scale.x`)
    pub z_ratio: f32,
}

impl OcclusionParams {
    pub fn new(hm_size: u32, config: &OcclusionConfig, z_ratio: f32) -> Self {
        Self {
            hm_size,
            occ_patch_size: config.occ_patch_size,
            sectors: config.sectors,
            sub_sectors: config.sub_sectors,
            max_occ_pts: config.max_occ_pts,
            max_ray_length: config.max_ray_length,
            z_ratio,
        }
    }

    /// Leaves per side of the occlusion tree
    pub fn leaves_per_side(&self) -> u32 {
        self.hm_size / self.occ_patch_size
    }

    /// Stored `[s, z]` pairs across all nodes and sectors
    pub fn point_count(&self) -> usize {
        let nodes = level_start(self.leaves_per_side().trailing_zeros() + 1);
        nodes * self.sectors as usize * self.max_occ_pts as usize
    }
}

/// Horizon envelopes for every occlusion node of one height map tile
#[derive(Clone, Debug)]
pub struct OcclusionMap {
    params: OcclusionParams,
    table: SectorTable,
    tree: QuadTree,
    points: Vec<[i32; 2]>,
}

impl OcclusionMap {
    /// Cast horizons for every point and build envelopes bottom-up
    pub fn compute(hm: &HeightMap, params: OcclusionParams) -> Result<Self> {
        let mut map = Self::empty(params)?;
        if hm.size() != params.hm_size {
            return Err(Error::OcclusionCache(format!(
                "height map size {} does not match occlusion size {}",
                hm.size(),
                params.hm_size
            )));
        }

        let start = Instant::now();
        let per_node = params.sectors as usize * params.max_occ_pts as usize;
        let side = params.leaves_per_side();
        let leaf_start = level_start(map.tree.depth());

        let leaves: Vec<(usize, Vec<[i32; 2]>)> = (0..side * side)
            .into_par_iter()
            .map(|i| {
                let (ox, oy) = (i % side, i / side);
                let node = map.tree.leaf_index(ox, oy);
                (node, map.leaf_envelopes(hm, ox, oy))
            })
            .collect();
        for (node, slots) in leaves {
            map.points[node * per_node..(node + 1) * per_node].copy_from_slice(&slots);
        }

        for n in (0..leaf_start).rev() {
            map.merge_children(n);
        }

        log::info!(
            "Computed occlusion for {}x{} map: {} nodes, {} sectors in {:.2}s",
            params.hm_size,
            params.hm_size,
            map.tree.len(),
            params.sectors,
            start.elapsed().as_secs_f64()
        );
        Ok(map)
    }

    /// Wrap previously computed points
    pub fn from_points(params: OcclusionParams, points: Vec<[i32; 2]>) -> Result<Self> {
        let mut map = Self::empty(params)?;
        if points.len() != map.points.len() {
            return Err(Error::OcclusionCache(format!(
                "expected {} occlusion points, got {}",
                map.points.len(),
                points.len()
            )));
        }
        map.points = points;
        Ok(map)
    }

    fn empty(params: OcclusionParams) -> Result<Self> {
        if params.occ_patch_size == 0
            || !params.occ_patch_size.is_power_of_two()
            || !params.hm_size.is_power_of_two()
            || params.occ_patch_size > params.hm_size
            || params.sectors == 0
            || params.max_occ_pts < 2
        {
            return Err(Error::OcclusionCache(format!("invalid occlusion parameters {:?}", params)));
        }

        Ok(Self {
            params,
            table: SectorTable::new(params.sectors, params.sub_sectors.max(1)),
            tree: QuadTree::new(params.leaves_per_side()),
            points: vec![envelope::EMPTY_POINT; params.point_count()],
        })
    }

    pub fn params(&self) -> &OcclusionParams {
        &self.params
    }

    pub fn points(&self) -> &[[i32; 2]] {
        &self.points
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    /// Stored envelope of `node` in `sector`
    pub fn envelope(&self, node: usize, sector: usize) -> &[[i32; 2]] {
        let max = self.params.max_occ_pts as usize;
        let start = (node * self.params.sectors as usize + sector) * max;
        &self.points[start..start + max]
    }

    fn envelope_mut(&mut self, node: usize, sector: usize) -> &mut [[i32; 2]] {
        let max = self.params.max_occ_pts as usize;
        let start = (node * self.params.sectors as usize + sector) * max;
        &mut self.points[start..start + max]
    }

    fn leaf_envelopes(&self, hm: &HeightMap, ox: u32, oy: u32) -> Vec<[i32; 2]> {
        let p = &self.params;
        let max = p.max_occ_pts as usize;
        let size = p.occ_patch_size as i64;
        let (x0, y0) = (ox as i64 * size, oy as i64 * size);
        let z_ratio = p.z_ratio as f64;

        let mut out = vec![envelope::EMPTY_POINT; p.sectors as usize * max];
        let mut lines = Vec::with_capacity(((size + 1) * (size + 1)) as usize);
        for k in 0..p.sectors as usize {
            lines.clear();
            let rays = self.table.rays(k);
            for y in y0..=y0 + size {
                for x in x0..=x0 + size {
                    let horizon = sector_horizon(hm, x, y, rays, p.max_ray_length, z_ratio);
                    let z = hm.sample_wrapped(x, y) as f64 * z_ratio;
                    let (hx, hy, hz) = horizon.point;
                    let s0 = self.table.project(k, x as f64, y as f64);
                    let s1 = self.table.project(k, hx, hy);
                    if let Some(line) = HorizonLine::through(s0, z, s1, hz) {
                        lines.push(line);
                    }
                }
            }

            let mut env = envelope::lower_envelope(&lines, p.max_ray_length as f64);
            envelope::simplify(&mut env);
            envelope::compress(&mut env, max);
            envelope::store(&env, &mut out[k * max..(k + 1) * max]);
        }
        out
    }

    fn merge_children(&mut self, n: usize) {
        let max = self.params.max_occ_pts as usize;
        for k in 0..self.params.sectors as usize {
            let mut merged: Option<Vec<(f64, f64)>> = None;
            for c in children(n) {
                let child = envelope::load(self.envelope(c, k));
                merged = Some(match merged {
                    None => child,
                    Some(m) => envelope::min_polylines(&m, &child),
                });
            }
            let mut env = merged.unwrap_or_default();
            envelope::simplify(&mut env);
            envelope::compress(&mut env, max);
            envelope::store(&env, self.envelope_mut(n, k));
        }
    }

    /// Occlusion node covering the render patch at `(x, y)` on tree `level`,
    /// where `level` counts from a root spanning one height map tile
    pub fn node_for(&self, level: u32, x: u32, y: u32) -> usize {
        let depth = self.tree.depth();
        if level <= depth {
            self.tree.index(level, x, y)
        } else {
            let shift = level - depth;
            self.tree.index(depth, x >> shift, y >> shift)
        }
    }

    /// Can `viewer` see any part of `rect` (`[x0, y0, x1, y1]`)?
    ///
    /// Coordinates are tile-local cells, viewer height in cell units. A
    /// viewer inside the rectangle always sees it; otherwise every sector
    /// subtended by the rectangle must hide the viewer for the patch to be
    /// occluded.
    pub fn is_patch_visible(&self, node: usize, rect: [f32; 4], viewer: Vec3) -> bool {
        let (vx, vy, vz) = (viewer.x as f64, viewer.y as f64, viewer.z as f64);
        let [x0, y0, x1, y1] = rect.map(|v| v as f64);
        if vx >= x0 && vx <= x1 && vy >= y0 && vy <= y1 {
            return true;
        }

        let (cx, cy) = ((x0 + x1) * 0.5, (y0 + y1) * 0.5);
        let center_angle = (vy - cy).atan2(vx - cx);
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for (kx, ky) in [(x0, y0), (x1, y0), (x0, y1), (x1, y1)] {
            let mut delta = (vy - ky).atan2(vx - kx) - center_angle;
            if delta > PI {
                delta -= 2.0 * PI;
            } else if delta <= -PI {
                delta += 2.0 * PI;
            }
            lo = lo.min(delta);
            hi = hi.max(delta);
        }

        let width = self.table.width();
        let first = ((center_angle + lo) / width).floor() as i64;
        let last = ((center_angle + hi) / width).floor() as i64;
        let sectors = self.params.sectors as i64;

        for k in first..=last.min(first + sectors - 1) {
            let sector = k.rem_euclid(sectors) as usize;
            let s = self.table.project(sector, vx, vy);
            if !envelope::hides(self.envelope(node, sector), s, vz) {
                return true;
            }
        }
        false
    }
}
