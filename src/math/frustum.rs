//! View frustum and clip flags for hierarchical culling
//!
//! Clip flags are one byte per quadtree node:
//! - `0`: fully inside, nothing left to test
//! - `1` ([`CLIP_OUTSIDE`]): fully outside
//! - bits 1-6: plane `i` (bit `i + 1`) still straddled, must be tested on descent

use crate::core::types::{Mat4, Vec3, Vec4};
use super::aabb::{Aabb, PlaneSide};

/// Node is entirely outside the frustum
pub const CLIP_OUTSIDE: u8 = 0x01;
/// Every plane still needs a test (fresh node)
pub const CLIP_ALL: u8 = 0x7E;
/// Node is entirely inside the frustum
pub const CLIP_INSIDE: u8 = 0x00;

/// Plane order inside [`Frustum::planes`]
pub const PLANE_TOP: usize = 0;
pub const PLANE_BOTTOM: usize = 1;
pub const PLANE_RIGHT: usize = 2;
pub const PLANE_LEFT: usize = 3;
pub const PLANE_NEAR: usize = 4;
pub const PLANE_FAR: usize = 5;

/// Clip-flag bit for plane `index`
#[inline]
pub const fn plane_bit(index: usize) -> u8 {
    1 << (index + 1)
}

/// A plane defined by normal and distance from origin.
///
/// `signbits` has bit `i` set when `normal[i]` is negative; it selects the
/// box corners for [`Aabb::classify_plane`] without per-axis branching.
/// `axis` is set when the normal is exactly `±1` along one axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
    pub signbits: u8,
    pub axis: Option<u8>,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self {
            normal,
            distance,
            signbits: Self::compute_signbits(normal),
            axis: Self::compute_axis(normal),
        }
    }

    /// Plane through `point` facing `normal` (normalized here)
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self::new(normal, -normal.dot(point))
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    fn compute_signbits(normal: Vec3) -> u8 {
        let mut bits = 0;
        for i in 0..3 {
            if normal[i] < 0.0 {
                bits |= 1 << i;
            }
        }
        bits
    }

    fn compute_axis(normal: Vec3) -> Option<u8> {
        (0..3u8).find(|&i| normal[i as usize].abs() == 1.0)
    }
}

/// View frustum with 6 planes (top, bottom, right, left, near, far), all facing inwards
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn from_planes(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix (Gribb/Hartmann).
    /// glam's `perspective_rh` maps depth to `[0, 1]`, so near is row 2 alone.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let raw = [
            rows[3] - rows[1], // top
            rows[3] + rows[1], // bottom
            rows[3] - rows[0], // right
            rows[3] + rows[0], // left
            rows[2],           // near
            rows[3] - rows[2], // far
        ];

        let planes = raw.map(Self::normalize_plane);
        Self { planes }
    }

    fn normalize_plane(plane: Vec4) -> Plane {
        let normal = Vec3::new(plane.x, plane.y, plane.z);
        let len = normal.length();
        if len > 0.0 {
            Plane::new(normal / len, plane.w / len)
        } else {
            Plane::new(Vec3::Z, f32::MAX)
        }
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if AABB intersects frustum (conservative test)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes
            .iter()
            .all(|plane| aabb.classify_plane(plane) != PlaneSide::Outside)
    }

    /// Test `aabb` against the planes still flagged in `flags` and return the
    /// node's new flags. Planes the box is wholly inside are cleared; a box
    /// wholly outside any tested plane collapses to [`CLIP_OUTSIDE`].
    /// `plane_tests` is bumped once per plane evaluated.
    pub fn clip_aabb(&self, aabb: &Aabb, flags: u8, plane_tests: &mut u32) -> u8 {
        if flags == CLIP_INSIDE || flags == CLIP_OUTSIDE {
            return flags;
        }

        let mut result = flags;
        for (i, plane) in self.planes.iter().enumerate() {
            let bit = plane_bit(i);
            if flags & bit == 0 {
                continue;
            }
            *plane_tests += 1;
            match aabb.classify_plane(plane) {
                PlaneSide::Outside => return CLIP_OUTSIDE,
                PlaneSide::Inside => result &= !bit,
                PlaneSide::Intersecting => {}
            }
        }
        result
    }
}
