//! Line segment type and operations

use crate::core::types::Vec3;
use super::aabb::Aabb;

/// A line segment from `start` to `end`, parameterised over `t` in `[0, 1]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start: Vec3,
    pub end: Vec3,
}

impl Segment {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    /// Vector from start to end
    pub fn delta(&self) -> Vec3 {
        self.end - self.start
    }

    /// Get point along segment at parameter t
    pub fn at(&self, t: f32) -> Vec3 {
        self.start + self.delta() * t
    }

    /// Segment truncated to the `[0, t]` portion
    pub fn truncated(&self, t: f32) -> Segment {
        Segment::new(self.start, self.at(t))
    }

    /// Bounding box of the segment
    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.start.min(self.end), self.start.max(self.end))
    }

    /// Segment-AABB intersection using the slab method.
    /// Returns Some((t_near, t_far)) clamped to `[0, 1]` if they overlap.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> Option<(f32, f32)> {
        let delta = self.delta();
        let mut t_near = 0.0f32;
        let mut t_far = 1.0f32;

        for i in 0..3 {
            if delta[i].abs() < f32::EPSILON {
                if self.start[i] < aabb.min[i] || self.start[i] > aabb.max[i] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / delta[i];
            let t1 = (aabb.min[i] - self.start[i]) * inv;
            let t2 = (aabb.max[i] - self.start[i]) * inv;
            t_near = t_near.max(t1.min(t2));
            t_far = t_far.min(t1.max(t2));
            if t_near > t_far {
                return None;
            }
        }

        Some((t_near, t_far))
    }

    /// Closest point on the segment to `point`
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let delta = self.delta();
        let len_sq = delta.length_squared();
        if len_sq <= f32::EPSILON {
            return self.start;
        }
        let t = ((point - self.start).dot(delta) / len_sq).clamp(0.0, 1.0);
        self.at(t)
    }
}
