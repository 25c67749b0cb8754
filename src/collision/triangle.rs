//! Swept box against a single triangle

use crate::core::types::Vec3;
use crate::math::Segment;

/// Slack for starting contacts and inside tests
const EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Unit normal, facing +Z for counter-clockwise triangles seen from above
    pub fn normal(&self) -> Vec3 {
        (self.b - self.a).cross(self.c - self.a).normalize_or_zero()
    }

    /// Is `p`, projected onto the triangle's plane, inside the triangle?
    pub fn contains_projected(&self, p: Vec3) -> bool {
        let v0 = self.c - self.a;
        let v1 = self.b - self.a;
        let v2 = p - self.a;

        let dot00 = v0.dot(v0);
        let dot01 = v0.dot(v1);
        let dot02 = v0.dot(v2);
        let dot11 = v1.dot(v1);
        let dot12 = v1.dot(v2);

        let denom = dot00 * dot11 - dot01 * dot01;
        if denom.abs() <= f32::EPSILON {
            return false;
        }
        let inv = 1.0 / denom;
        let u = (dot11 * dot02 - dot01 * dot12) * inv;
        let v = (dot00 * dot12 - dot01 * dot02) * inv;
        u >= -EPSILON && v >= -EPSILON && u + v <= 1.0 + EPSILON
    }

    /// Point on the triangle's edges nearest to `p`
    pub fn closest_perimeter_point(&self, p: Vec3) -> Vec3 {
        [
            Segment::new(self.a, self.b),
            Segment::new(self.b, self.c),
            Segment::new(self.c, self.a),
        ]
        .iter()
        .map(|edge| edge.closest_point(p))
        .min_by(|x, y| x.distance_squared(p).total_cmp(&y.distance_squared(p)))
        .unwrap_or(self.a)
    }

    /// Earliest fraction of `path` at which a box of `half_extent` centred on
    /// the path touches the triangle from its front side.
    ///
    /// The triangle's plane is pushed out by the box's support distance along
    /// the normal. Where the path crosses that plane, the contact counts if
    /// the centre projects inside the triangle, or if the box there still
    /// holds the nearest point of the triangle's perimeter.
    pub fn sweep_box(&self, path: &Segment, half_extent: Vec3) -> Option<(f32, Vec3)> {
        let normal = self.normal();
        if normal == Vec3::ZERO {
            return None;
        }

        let reach = normal.abs().dot(half_extent);
        let d0 = normal.dot(path.start - self.a) - reach;
        let d1 = normal.dot(path.end - self.a) - reach;
        if d0 < -EPSILON || d1 >= d0 || d1 > 0.0 {
            return None;
        }

        let t = (d0 / (d0 - d1)).clamp(0.0, 1.0);
        let center = path.at(t);
        if self.contains_projected(center) {
            return Some((t, normal));
        }

        let nearest = self.closest_perimeter_point(center);
        let offset = (nearest - center).abs();
        let slack = Vec3::splat(EPSILON);
        if offset.cmple(half_extent + slack).all() {
            return Some((t, normal));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground() -> Triangle {
        Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y)
    }

    #[test]
    fn test_normal_faces_up() {
        assert_eq!(ground().normal(), Vec3::Z);
    }

    #[test]
    fn test_contains_projected() {
        let t = ground();
        assert!(t.contains_projected(Vec3::new(0.2, 0.2, 5.0)));
        assert!(!t.contains_projected(Vec3::new(0.8, 0.8, 0.0)));
        assert!(!t.contains_projected(Vec3::new(-0.1, 0.5, 0.0)));
    }

    #[test]
    fn test_drop_onto_face() {
        let t = ground();
        let path = Segment::new(Vec3::new(0.2, 0.2, 4.0), Vec3::new(0.2, 0.2, -4.0));
        let (frac, n) = t.sweep_box(&path, Vec3::splat(0.5)).expect("hit");
        // box bottom touches at centre z = 0.5
        assert!((path.at(frac).z - 0.5).abs() < 1e-5);
        assert_eq!(n, Vec3::Z);
    }

    #[test]
    fn test_edge_graze_caught_by_perimeter() {
        let t = ground();
        let he = Vec3::splat(0.5);
        // centre passes outside the hypotenuse but the box overlaps the (1, 0) corner
        let near = Segment::new(Vec3::new(1.2, 0.2, 3.0), Vec3::new(1.2, 0.2, -3.0));
        assert!(t.sweep_box(&near, he).is_some());

        let far = Segment::new(Vec3::new(2.0, 0.2, 3.0), Vec3::new(2.0, 0.2, -3.0));
        assert!(t.sweep_box(&far, he).is_none());
    }

    #[test]
    fn test_moving_away_or_parallel() {
        let t = ground();
        let he = Vec3::splat(0.25);
        let up = Segment::new(Vec3::new(0.2, 0.2, 1.0), Vec3::new(0.2, 0.2, 3.0));
        assert!(t.sweep_box(&up, he).is_none());
        let level = Segment::new(Vec3::new(0.2, 0.2, 1.0), Vec3::new(0.3, 0.2, 1.0));
        assert!(t.sweep_box(&level, he).is_none());
        let short = Segment::new(Vec3::new(0.2, 0.2, 3.0), Vec3::new(0.2, 0.2, 1.0));
        assert!(t.sweep_box(&short, he).is_none());
    }

    #[test]
    fn test_perimeter_agrees_with_box_overlap() {
        // a box resting on the plane touches the triangle iff its footprint overlaps it
        let t = ground();
        let he = Vec3::new(0.3, 0.3, 0.3);
        for i in -10..=20 {
            for j in -10..=20 {
                let (x, y) = (i as f32 * 0.1, j as f32 * 0.1);
                let path = Segment::new(Vec3::new(x, y, 2.0), Vec3::new(x, y, -2.0));
                let hit = t.sweep_box(&path, he).is_some();

                // exact footprint overlap: separating axis on x, y and the hypotenuse
                let tol = 1e-3;
                let overlaps = x + 0.3 >= -tol
                    && y + 0.3 >= -tol
                    && (x - 0.3) + (y - 0.3) <= 1.0 + tol
                    && x - 0.3 <= 1.0 + tol
                    && y - 0.3 <= 1.0 + tol;
                if hit {
                    assert!(overlaps, "false hit at {} {}", x, y);
                }
            }
        }
    }
}
