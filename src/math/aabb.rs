//! Axis-aligned bounding box

use crate::core::types::Vec3;
use super::frustum::Plane;

/// Result of classifying a box against a plane
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneSide {
    /// Every corner is behind the plane
    Outside,
    /// Every corner is in front of (or on) the plane
    Inside,
    /// The plane cuts the box
    Intersecting,
}

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create AABB from center and half-extents
    pub fn from_center_half_extent(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get half-extents
    pub fn half_extent(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Check if point is inside AABB
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y &&
        p.z >= self.min.z && p.z <= self.max.z
    }

    /// Check if two AABBs intersect
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Expand AABB to include point
    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Return a copy grown by `half_extent` on every side (Minkowski sum with a box)
    pub fn enlarged(&self, half_extent: Vec3) -> Aabb {
        Aabb {
            min: self.min - half_extent,
            max: self.max + half_extent,
        }
    }

    /// Return merged AABB containing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Corners furthest along and against the plane normal, picked by `signbits`
    #[inline]
    fn support_corners(&self, signbits: u8) -> (Vec3, Vec3) {
        let mut positive = self.max;
        let mut negative = self.min;
        for i in 0..3 {
            if signbits & (1 << i) != 0 {
                positive[i] = self.min[i];
                negative[i] = self.max[i];
            }
        }
        (positive, negative)
    }

    /// Classify the box against a plane (inside = positive half-space)
    pub fn classify_plane(&self, plane: &Plane) -> PlaneSide {
        let (positive, negative) = self.support_corners(plane.signbits);

        let (far, near) = match plane.axis {
            Some(axis) => {
                let axis = axis as usize;
                let n = plane.normal[axis];
                (n * positive[axis] + plane.distance, n * negative[axis] + plane.distance)
            }
            None => (plane.distance_to_point(positive), plane.distance_to_point(negative)),
        };

        if far < 0.0 {
            PlaneSide::Outside
        } else if near >= 0.0 {
            PlaneSide::Inside
        } else {
            PlaneSide::Intersecting
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(aabb.center(), Vec3::splat(0.5));
        assert_eq!(aabb.size(), Vec3::ONE);
    }

    #[test]
    fn test_contains_point() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.contains_point(Vec3::splat(0.5)));
        assert!(!aabb.contains_point(Vec3::splat(2.0)));
    }

    #[test]
    fn test_intersects() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(1.5));
        let c = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_enlarged() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE).enlarged(Vec3::new(1.0, 2.0, 0.5));
        assert_eq!(a.min, Vec3::new(-1.0, -2.0, -0.5));
        assert_eq!(a.max, Vec3::new(2.0, 3.0, 1.5));
    }

    #[test]
    fn test_classify_axis_plane() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(aabb.classify_plane(&Plane::new(Vec3::Z, 1.0)), PlaneSide::Inside);
        assert_eq!(aabb.classify_plane(&Plane::new(Vec3::Z, -0.5)), PlaneSide::Intersecting);
        assert_eq!(aabb.classify_plane(&Plane::new(Vec3::Z, -2.0)), PlaneSide::Outside);
        assert_eq!(aabb.classify_plane(&Plane::new(Vec3::NEG_X, 2.0)), PlaneSide::Inside);
        assert_eq!(aabb.classify_plane(&Plane::new(Vec3::NEG_X, -0.5)), PlaneSide::Outside);
    }

    #[test]
    fn test_classify_oblique_plane_matches_corners() {
        let aabb = Aabb::new(Vec3::new(-1.0, 2.0, 0.0), Vec3::new(3.0, 4.0, 1.0));
        let normals = [
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 0.5, 2.0),
            Vec3::new(0.3, -1.0, -0.2),
        ];
        for normal in normals {
            for d in [-8.0, -3.0, -1.0, 0.0, 2.0, 6.0] {
                let plane = Plane::new(normal.normalize(), d);
                let dists: Vec<f32> = (0..8)
                    .map(|i| {
                        let corner = Vec3::new(
                            if i & 1 != 0 { aabb.max.x } else { aabb.min.x },
                            if i & 2 != 0 { aabb.max.y } else { aabb.min.y },
                            if i & 4 != 0 { aabb.max.z } else { aabb.min.z },
                        );
                        plane.distance_to_point(corner)
                    })
                    .collect();
                let expected = if dists.iter().all(|&d| d < 0.0) {
                    PlaneSide::Outside
                } else if dists.iter().all(|&d| d >= 0.0) {
                    PlaneSide::Inside
                } else {
                    PlaneSide::Intersecting
                };
                assert_eq!(aabb.classify_plane(&plane), expected, "normal {:?} d {}", normal, d);
            }
        }
    }
}
