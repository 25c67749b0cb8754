//! Patch vertex template and vertex layout
//!
//! Vertices of a patch are numbered coarse level first: every grid point
//! that is a multiple of `2^L` comes before any point that only appears at
//! finer levels. A vertex array built for level `L` is therefore a prefix of
//! the full array, and index buffers for every level share the numbering.

use bytemuck::{Pod, Zeroable};

use super::heightmap::HeightMap;
use super::quadtree::count_patch_levels;

/// Vertex as handed to the renderer: 8 floats, 32 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    /// Colour map coordinates, repeating `tex_tile` times per height map tile
    pub tex0: [f32; 2],
    /// Detail texture coordinates, repeating `base_tex_tile` times per patch
    pub tex1: [f32; 2],
    _padding: f32,
}

impl TerrainVertex {
    pub fn new(position: [f32; 3], tex0: [f32; 2], tex1: [f32; 2]) -> Self {
        Self { position, tex0, tex1, _padding: 0.0 }
    }
}

/// Texture mapping parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexMapping {
    pub tex_size: u32,
    pub tex_tile: u32,
    pub base_tex_tile: u32,
}

/// Grid point to vertex-buffer index map for one patch size
#[derive(Clone, Debug)]
pub struct PatchTemplate {
    patch_size: u32,
    levels: u32,
    /// Row-major `(patch_size + 1)^2` map from grid point to buffer index
    index: Vec<u16>,
    /// Buffer order: grid point of each buffer index
    order: Vec<(u16, u16)>,
}

impl PatchTemplate {
    pub fn new(patch_size: u32) -> Self {
        let levels = count_patch_levels(patch_size);
        let side = patch_size + 1;
        let mut index = vec![u16::MAX; (side * side) as usize];
        let mut order = Vec::with_capacity(index.len());

        for level in (0..levels).rev() {
            let step = 1 << level;
            for y in (0..side).step_by(step) {
                for x in (0..side).step_by(step) {
                    let slot = &mut index[(y * side + x) as usize];
                    if *slot == u16::MAX {
                        *slot = order.len() as u16;
                        order.push((x as u16, y as u16));
                    }
                }
            }
        }

        Self { patch_size, levels, index, order }
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    /// Number of mip levels, level 0 being full resolution
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Buffer index of grid point `(x, y)`
    #[inline]
    pub fn index_at(&self, x: u32, y: u32) -> u16 {
        self.index[(y * (self.patch_size + 1) + x) as usize]
    }

    /// Grid point stored at buffer index `i`
    #[inline]
    pub fn point(&self, i: u16) -> (u32, u32) {
        let (x, y) = self.order[i as usize];
        (x as u32, y as u32)
    }

    /// Vertices needed to draw the patch at `level`
    pub fn vertex_count(&self, level: u32) -> usize {
        let n = (self.patch_size >> level) as usize + 1;
        n * n
    }

    /// Fill the level-`level` prefix of a vertex array for the patch whose
    /// bottom-left corner is landscape cell `(cx, cy)`
    pub fn fill_vertices(
        &self,
        out: &mut [TerrainVertex],
        heightmap: &HeightMap,
        cx: u32,
        cy: u32,
        level: u32,
        scale: [f32; 3],
        mapping: TexMapping,
    ) {
        let hm_size = heightmap.size();
        let tile_inv = mapping.tex_tile as f32 / hm_size as f32;
        let half_texel = 0.5 / mapping.tex_size.max(1) as f32;
        let detail = mapping.base_tex_tile as f32 / self.patch_size as f32;

        let count = self.vertex_count(level).min(out.len());
        for (vertex, &(x, y)) in out[..count].iter_mut().zip(&self.order) {
            let gx = cx + x as u32;
            let gy = cy + y as u32;
            let h = heightmap.get(gx % hm_size, gy % hm_size);
            *vertex = TerrainVertex::new(
                [gx as f32 * scale[0], gy as f32 * scale[1], h as f32 * scale[2]],
                [
                    gx as f32 * tile_inv + half_texel,
                    gy as f32 * tile_inv + half_texel,
                ],
                [x as f32 * detail, y as f32 * detail],
            );
        }
    }
}
