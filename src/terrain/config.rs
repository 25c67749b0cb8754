//! Landscape configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Largest patch size whose vertex indices still fit in `u16`
pub const MAX_PATCH_SIZE: u32 = 128;

/// How per-level geometric error is aggregated over a patch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorMode {
    #[default]
    Max,
    Average,
}

/// Horizon occlusion parameters. All-zero disables occlusion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    /// Azimuthal sectors around each point
    pub sectors: u32,
    /// Ray directions cast per sector
    pub sub_sectors: u32,
    /// Cells per side of an occlusion leaf
    pub occ_patch_size: u32,
    /// Envelope points stored per node and sector
    pub max_occ_pts: u32,
    /// Horizon ray length in cells
    pub max_ray_length: u32,
    /// Directory for precomputed `Height<N>.vis` files; `None` keeps them in memory only
    pub cache_dir: Option<PathBuf>,
}

impl OcclusionConfig {
    pub fn disabled() -> Self {
        Self {
            sectors: 0,
            sub_sectors: 0,
            occ_patch_size: 0,
            max_occ_pts: 0,
            max_ray_length: 0,
            cache_dir: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sectors != 0 && self.occ_patch_size != 0 && self.max_occ_pts != 0
    }
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            sectors: 16,
            sub_sectors: 4,
            occ_patch_size: 16,
            max_occ_pts: 8,
            max_ray_length: 256,
            cache_dir: None,
        }
    }
}

/// Everything needed to build a [`Landscape`](super::Landscape) over a height map
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandscapeConfig {
    /// Cells per patch side (power of two, at most 128)
    pub patch_size: u32,
    /// The height map repeats `hm_tile x hm_tile` times
    pub hm_tile: u32,
    /// World units per cell (x, y) and per elevation step (z)
    pub scale: [f32; 3],
    /// Colour texture size in texels
    pub tex_size: u32,
    /// Colour texture repeats across one height map tile
    pub tex_tile: u32,
    /// Detail texture repeats across one patch
    pub base_tex_tile: u32,
    pub vertex_cache_kb: u32,
    pub index_cache_kb: u32,
    pub want_fast_memory: bool,
    pub error_mode: ErrorMode,
    /// Screen-space error budget in pixels
    pub max_pixel_error: f32,
    pub occlusion: OcclusionConfig,
}

impl Default for LandscapeConfig {
    fn default() -> Self {
        Self {
            patch_size: 16,
            hm_tile: 1,
            scale: [4.0, 4.0, 0.5],
            tex_size: 256,
            tex_tile: 1,
            base_tex_tile: 4,
            vertex_cache_kb: 2048,
            index_cache_kb: 512,
            want_fast_memory: false,
            error_mode: ErrorMode::Max,
            max_pixel_error: 4.0,
            occlusion: OcclusionConfig::disabled(),
        }
    }
}

impl LandscapeConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check the configuration against a height map of `hm_size` cells
    pub fn validate(&self, hm_size: u32) -> Result<()> {
        let fail = |msg: String| Err(Error::Config(msg));

        if !hm_size.is_power_of_two() {
            return fail(format!("height map size {} is not a power of two", hm_size));
        }
        if self.patch_size < 2 || !self.patch_size.is_power_of_two() {
            return fail(format!("patch_size {} is not a power of two >= 2", self.patch_size));
        }
        if self.patch_size > MAX_PATCH_SIZE {
            return fail(format!(
                "patch_size {} exceeds the 16-bit index limit ({})",
                self.patch_size, MAX_PATCH_SIZE
            ));
        }
        if self.patch_size > hm_size {
            return fail(format!(
                "patch_size {} larger than height map size {}",
                self.patch_size, hm_size
            ));
        }
        if self.hm_tile == 0 || !self.hm_tile.is_power_of_two() {
            return fail(format!("hm_tile {} is not a power of two >= 1", self.hm_tile));
        }
        if self.scale.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return fail(format!("scale {:?} must be positive", self.scale));
        }
        if self.vertex_cache_kb == 0 || self.index_cache_kb == 0 {
            return fail("cache budgets must be non-zero".to_string());
        }
        if !(self.max_pixel_error > 0.0) {
            return fail(format!("max_pixel_error {} must be positive", self.max_pixel_error));
        }

        let occ = &self.occlusion;
        if occ.is_enabled() {
            if !occ.occ_patch_size.is_power_of_two() || occ.occ_patch_size > hm_size {
                return fail(format!(
                    "occ_patch_size {} must be a power of two <= {}",
                    occ.occ_patch_size, hm_size
                ));
            }
            if occ.sectors < 4 {
                return fail(format!("sectors {} must be at least 4", occ.sectors));
            }
            if occ.sub_sectors == 0 {
                return fail("sub_sectors must be at least 1".to_string());
            }
            if occ.max_occ_pts < 2 {
                return fail(format!("max_occ_pts {} must be at least 2", occ.max_occ_pts));
            }
            if occ.max_ray_length == 0 {
                return fail("max_ray_length must be non-zero".to_string());
            }
            if self.scale[0] != self.scale[1] {
                return fail("occlusion requires square cells (scale x == scale y)".to_string());
            }
        }

        Ok(())
    }
}
