//! Noise-based procedural height maps
//!
//! Samples fractal Brownian motion on a 4D torus so the generated tile wraps
//! seamlessly when the landscape repeats it.

use std::f64::consts::TAU;

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use super::heightmap::HeightMap;
use crate::core::Result;

/// Parameters controlling height map generation
#[derive(Clone, Debug)]
pub struct TerrainParams {
    pub seed: u32,
    pub frequency: f64,    // Feature repeats per tile (larger = rougher)
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // FBM persistence (0.5 typical)
    pub lacunarity: f32,   // FBM lacunarity (2.0 typical)
    pub base_height: u8,   // Elevation of the noise midpoint
    pub amplitude: f32,    // Elevation swing either side of the midpoint
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            frequency: 2.0,
            octaves: 5,
            persistence: 0.5,
            lacunarity: 2.0,
            base_height: 100,
            amplitude: 110.0,
        }
    }
}

/// Procedural height map generator using fractal Brownian motion (FBM)
pub struct TerrainGenerator {
    params: TerrainParams,
    noise: Fbm<Perlin>,
}

impl TerrainGenerator {
    /// Create a new terrain generator with the given parameters
    pub fn new(params: TerrainParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { params, noise }
    }

    /// Get generation parameters
    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Elevation at tile coordinate `(x, y)` for a tile of `size` cells
    pub fn height_at(&self, x: u32, y: u32, size: u32) -> u8 {
        let u = x as f64 / size as f64 * TAU;
        let v = y as f64 / size as f64 * TAU;
        let r = self.params.frequency / TAU;

        let noise_value = self.noise.get([
            u.cos() * r,
            u.sin() * r,
            v.cos() * r,
            v.sin() * r,
        ]);

        let h = self.params.base_height as f64 + noise_value * self.params.amplitude as f64;
        h.round().clamp(0.0, 255.0) as u8
    }

    /// Generate a seamless `size x size` height map
    pub fn generate(&self, size: u32) -> Result<HeightMap> {
        let mut tile = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                tile.push(self.height_at(x, y, size));
            }
        }
        HeightMap::from_tile(size, &tile)
    }
}
