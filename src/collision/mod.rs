//! Swept box collision against the landscape mesh
//!
//! The landscape quadtree is walked nearest child first. A subtree is
//! skipped when the move misses its bounds grown by the mover's half
//! extent, or when it can only be entered after the best hit so far.
//! Leaves test the full-resolution triangles of the cells the move can
//! reach.

pub mod triangle;

use crate::core::types::Vec3;
use crate::math::{Plane, Segment};
use crate::terrain::clip::NodeBounds;
use crate::terrain::quadtree::children;
use crate::terrain::{HeightMap, QuadTree};

pub use triangle::Triangle;

/// Distance kept between the mover and the terrain after [`TerrainCollider::clip_move`]
pub const CONTACT_OFFSET: f32 = 0.01;

/// Earliest contact along a move
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionHit {
    /// Fraction of the move completed at contact, in `[0, 1]`
    pub fraction: f32,
    pub normal: Vec3,
    /// Plane of the triangle that was hit
    pub plane: Plane,
    /// Mover centre at contact
    pub position: Vec3,
}

/// Collision queries over a landscape's quadtree and height map
pub struct TerrainCollider<'a> {
    tree: &'a QuadTree,
    heightmap: &'a HeightMap,
    bounds: NodeBounds,
}

struct Sweep {
    path: Segment,
    half_extent: Vec3,
    best: Option<(f32, Triangle)>,
}

impl Sweep {
    fn limit(&self) -> f32 {
        self.best.map_or(1.0, |(t, _)| t)
    }
}

impl<'a> TerrainCollider<'a> {
    pub fn new(tree: &'a QuadTree, heightmap: &'a HeightMap, bounds: NodeBounds) -> Self {
        Self { tree, heightmap, bounds }
    }

    /// Move a box of `half_extent` from `start` to `end` and report the first contact
    pub fn sweep(&self, start: Vec3, end: Vec3, half_extent: Vec3) -> Option<CollisionHit> {
        if self.tree.is_empty() {
            return None;
        }

        let mut sweep = Sweep {
            path: Segment::new(start, end),
            half_extent,
            best: None,
        };
        self.visit(0, &mut sweep);

        let (fraction, tri) = sweep.best?;
        let normal = tri.normal();
        Some(CollisionHit {
            fraction,
            normal,
            plane: Plane::from_point_normal(tri.a, normal),
            position: sweep.path.at(fraction),
        })
    }

    /// Furthest position along the move that stays clear of the terrain
    pub fn clip_move(&self, start: Vec3, end: Vec3, half_extent: Vec3) -> Vec3 {
        let Some(hit) = self.sweep(start, end, half_extent) else {
            return end;
        };
        let length = (end - start).length();
        if length <= f32::EPSILON {
            return start;
        }
        let fraction = (hit.fraction - CONTACT_OFFSET / length).max(0.0);
        start + (end - start) * fraction
    }

    fn visit(&self, n: usize, sweep: &mut Sweep) {
        if self.tree.is_leaf(n) {
            self.test_leaf(n, sweep);
            return;
        }

        let mut order: Vec<(f32, usize)> = children(n)
            .into_iter()
            .filter_map(|c| {
                let aabb = self.bounds.aabb(self.tree, c).enlarged(sweep.half_extent);
                sweep.path.intersects_aabb(&aabb).map(|(t_near, _)| (t_near, c))
            })
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (t_near, c) in order {
            if t_near > sweep.limit() {
                break;
            }
            self.visit(c, sweep);
        }
    }

    fn test_leaf(&self, n: usize, sweep: &mut Sweep) {
        let patch = self.bounds.patch_size;
        let (lx, ly, _) = self.tree.footprint(n);
        let (x0, y0) = (lx * patch, ly * patch);

        // cells the shortened move can still reach
        let reach = sweep
            .path
            .truncated(sweep.limit())
            .bounds()
            .enlarged(sweep.half_extent);
        let scale = self.bounds.scale;
        let cell_range = |lo: f32, hi: f32, origin: u32, step: f32| {
            let first = ((lo / step).floor() as i64).max(origin as i64);
            let last = ((hi / step).floor() as i64).min((origin + patch) as i64 - 1);
            (first, last)
        };
        let (cx0, cx1) = cell_range(reach.min.x, reach.max.x, x0, scale.x);
        let (cy0, cy1) = cell_range(reach.min.y, reach.max.y, y0, scale.y);

        for cy in cy0..=cy1 {
            for cx in cx0..=cx1 {
                let (x, y) = (cx as u32, cy as u32);
                let a = self.vertex(x, y);
                let b = self.vertex(x + 1, y);
                let c = self.vertex(x + 1, y + 1);
                let d = self.vertex(x, y + 1);
                for tri in [Triangle::new(a, b, c), Triangle::new(a, c, d)] {
                    if let Some((t, _)) = tri.sweep_box(&sweep.path, sweep.half_extent) {
                        if sweep.best.map_or(true, |(best, _)| t < best) {
                            sweep.best = Some((t, tri));
                        }
                    }
                }
            }
        }
    }

    fn vertex(&self, x: u32, y: u32) -> Vec3 {
        let size = self.heightmap.size();
        let h = self.heightmap.get(x % size, y % size);
        let scale = self.bounds.scale;
        Vec3::new(x as f32 * scale.x, y as f32 * scale.y, h as f32 * scale.z)
    }
}
