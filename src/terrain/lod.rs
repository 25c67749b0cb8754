//! Mip level selection
//!
//! Two candidates are computed for every visible patch and the coarser one
//! wins: a distance level that coarsens towards the far plane, and a screen
//! error level that is the coarsest level whose geometric error still
//! projects to less than the pixel budget.

/// Screen-space error per unit of distance: `tan(fov_y / 2) / screen_height`
pub fn screen_error_metric(fov_y: f32, screen_height: u32) -> f32 {
    let fov = fov_y.clamp(0.01f32.to_radians(), 179.99f32.to_radians());
    (fov * 0.5).tan() / screen_height.max(1) as f32
}

/// Level from distance alone. Nearby patches map to level 0; every halving
/// of the remaining distance to the far plane costs one level.
pub fn distance_level(distance: f32, far: f32, patch_size: u32, levels: u32) -> u32 {
    let top = levels.saturating_sub(1);
    if far <= 0.0 {
        return top;
    }

    let d = distance.clamp(0.0, far);
    let mut remaining = ((patch_size as f32 * (far - d)) / far) as u32;
    let mut level = top;
    while remaining != 0 && level > 0 {
        remaining >>= 1;
        level -= 1;
    }
    level
}

/// Coarsest level whose error (scaled to world units by `z_scale`) stays
/// within `allowed`. Level 0 always qualifies.
pub fn screen_level(errors: &[f32], z_scale: f32, allowed: f32) -> u32 {
    errors
        .iter()
        .rposition(|e| e * z_scale <= allowed)
        .unwrap_or(0) as u32
}

/// Per-frame LOD parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodParams {
    /// From [`screen_error_metric`]
    pub error_metric: f32,
    pub max_pixel_error: f32,
    pub far: f32,
    pub z_scale: f32,
    pub patch_size: u32,
    pub levels: u32,
}

impl LodParams {
    /// Geometric deviation tolerated at perpendicular distance `d`
    pub fn allowed_deviation(&self, d: f32) -> f32 {
        d.max(0.0) * self.error_metric * self.max_pixel_error
    }

    /// Level for a patch at perpendicular distance `d` with the given error array
    pub fn select(&self, d: f32, errors: &[f32]) -> u32 {
        let by_distance = distance_level(d, self.far, self.patch_size, self.levels);
        let by_error = screen_level(errors, self.z_scale, self.allowed_deviation(d));
        by_distance.max(by_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LodParams {
        LodParams {
            error_metric: screen_error_metric(60f32.to_radians(), 600),
            max_pixel_error: 4.0,
            far: 1000.0,
            z_scale: 1.0,
            patch_size: 16,
            levels: 5,
        }
    }

    #[test]
    fn test_screen_error_metric() {
        let m = screen_error_metric(90f32.to_radians(), 100);
        assert!((m - 0.01).abs() < 1e-6);
        assert!(screen_error_metric(4.0, 100).is_finite());
    }

    #[test]
    fn test_distance_level_monotone() {
        let mut last = 0;
        for d in (0..=1100).step_by(10) {
            let level = distance_level(d as f32, 1000.0, 16, 5);
            assert!(level >= last);
            last = level;
        }
        assert_eq!(distance_level(0.0, 1000.0, 16, 5), 0);
        assert_eq!(distance_level(-50.0, 1000.0, 16, 5), 0);
        assert_eq!(distance_level(1000.0, 1000.0, 16, 5), 4);
        assert_eq!(distance_level(5000.0, 1000.0, 16, 5), 4);
    }

    #[test]
    fn test_screen_level() {
        let errors = [0.0, 1.0, 3.0, 10.0];
        assert_eq!(screen_level(&errors, 1.0, 0.0), 0);
        assert_eq!(screen_level(&errors, 1.0, 2.0), 1);
        assert_eq!(screen_level(&errors, 1.0, 3.0), 2);
        assert_eq!(screen_level(&errors, 1.0, 100.0), 3);
        assert_eq!(screen_level(&errors, 10.0, 29.0), 1);
    }

    #[test]
    fn test_flat_patch_takes_coarsest() {
        let p = params();
        let flat = [0.0; 5];
        assert_eq!(p.select(50.0, &flat), 4);
        assert_eq!(p.select(0.0, &flat), 4);
    }

    #[test]
    fn test_rough_patch_finer_than_flat() {
        let p = params();
        let rough = [0.0, 20.0, 60.0, 120.0, 255.0];
        let flat = [0.0; 5];
        let d = 100.0;
        assert!(p.select(d, &rough) < p.select(d, &flat));
        assert_eq!(p.select(d, &rough), 0);
    }

    #[test]
    fn test_final_is_coarser_candidate() {
        let p = params();
        let rough = [0.0, 20.0, 60.0, 120.0, 255.0];
        // distance dominates near the far plane
        assert_eq!(p.select(990.0, &rough), 4);
        // error dominates up close
        let d = 300.0;
        let expected = distance_level(d, p.far, 16, 5)
            .max(screen_level(&rough, 1.0, p.allowed_deviation(d)));
        assert_eq!(p.select(d, &rough), expected);
    }
}
