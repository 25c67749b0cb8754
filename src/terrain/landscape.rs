//! Landscape: the per-frame driver
//!
//! Owns the patch array, both quadtrees' products, the vertex and index
//! caches and the optional occlusion map. A frame is `begin_frame`, `clip`,
//! `set_mip_levels` and `draw_visible`, in that order.

use std::sync::Arc;
use std::time::Instant;

use crate::cache::{Allocation, CacheStats, CircularCache, FastMemoryBudget, SlotId};
use crate::collision::{CollisionHit, TerrainCollider};
use crate::core::types::Vec3;
use crate::core::{Camera, Error, Result};
use crate::math::frustum::CLIP_OUTSIDE;
use crate::occlusion::{self, OcclusionMap};

use super::clip::{clip_tree, ClipStats, NodeBounds};
use super::config::LandscapeConfig;
use super::error_metric::ErrorTable;
use super::heightmap::HeightMap;
use super::lod::{screen_error_metric, LodParams};
use super::quadtree::{children, LandscapeTree, QuadTree, TileTree};
use super::stitch::{build_indices, index_capacity, NeighborLevels};
use super::template::{PatchTemplate, TerrainVertex, TexMapping};

/// Viewport height assumed until [`Landscape::set_screen_height`] is called
pub const DEFAULT_SCREEN_HEIGHT: u32 = 768;

/// One patch of the tiled landscape
#[derive(Clone, Debug)]
pub struct Patch {
    /// Mip level requested for this frame
    pub new_level: u8,
    /// Perpendicular distance from the viewer at the last LOD pass
    pub d: f32,
    /// Texture handles owned by the renderer
    pub colour_tex: u32,
    pub blend_tex: [u32; 4],
    vertex_slot: SlotId,
    index_slot: SlotId,
    /// Finest level the cached vertex prefix covers
    vertex_level: Option<u8>,
    /// Level and coarser neighbour levels the cached index array was built for
    index_key: Option<(u8, NeighborLevels)>,
}

/// What the renderer receives for one visible patch
#[derive(Debug)]
pub struct PatchDraw<'a> {
    pub px: u32,
    pub py: u32,
    pub level: u8,
    pub vertices: &'a [TerrainVertex],
    /// Triangle count followed by index triples
    pub indices: &'a [u16],
    pub d: f32,
    pub colour_tex: u32,
    pub blend_tex: [u32; 4],
}

impl PatchDraw<'_> {
    pub fn triangle_count(&self) -> u16 {
        self.indices.first().copied().unwrap_or(0)
    }

    /// Index triples without the leading count
    pub fn triangles(&self) -> &[u16] {
        self.indices.get(1..).unwrap_or(&[])
    }
}

/// Consumer of patch geometry, e.g. a GPU backend issuing indexed draws
pub trait PatchRenderer {
    fn draw_patch(&mut self, draw: &PatchDraw<'_>);
}

/// Outcome of one draw walk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Patches handed to the renderer
    pub visible: u32,
    /// Patches inside the frustum but hidden by the horizon
    pub occluded: u32,
    /// Patches dropped because their buffers could not be allocated
    pub skipped: u32,
    pub triangles: u32,
    pub vertex_cache_wrapped: bool,
    pub vertex_cache_thrashed: bool,
    pub index_cache_wrapped: bool,
    pub index_cache_thrashed: bool,
}

/// A tiled geoMipMap landscape over one height map
pub struct Landscape {
    config: LandscapeConfig,
    heightmap: Arc<HeightMap>,
    template: PatchTemplate,
    errors: ErrorTable,
    tree: LandscapeTree,
    bounds: NodeBounds,
    /// Patches per height map tile side
    tile_patches: u32,
    patches: Vec<Patch>,
    vertex_cache: CircularCache,
    index_cache: CircularCache,
    occlusion: Option<OcclusionMap>,
    forced_level: Option<u8>,
    screen_height: u32,
    /// `(fov_y, screen_height)` the error metric was computed for
    projection: (f32, u32),
    error_metric: f32,
}

impl Landscape {
    /// Build a landscape backed by system memory only
    pub fn new(config: LandscapeConfig, heightmap: Arc<HeightMap>) -> Result<Self> {
        Self::build(config, heightmap, None, None)
    }

    /// Build a landscape whose caches may live in fast memory.
    ///
    /// The budgets are only used when `want_fast_memory` is set; a cache whose
    /// fast reservation fails falls back to system memory.
    pub fn with_fast_memory(
        config: LandscapeConfig,
        heightmap: Arc<HeightMap>,
        vertex_memory: Box<dyn FastMemoryBudget>,
        index_memory: Box<dyn FastMemoryBudget>,
    ) -> Result<Self> {
        if config.want_fast_memory {
            Self::build(config, heightmap, Some(vertex_memory), Some(index_memory))
        } else {
            Self::build(config, heightmap, None, None)
        }
    }

    fn build(
        config: LandscapeConfig,
        heightmap: Arc<HeightMap>,
        vertex_memory: Option<Box<dyn FastMemoryBudget>>,
        index_memory: Option<Box<dyn FastMemoryBudget>>,
    ) -> Result<Self> {
        let start = Instant::now();
        config.validate(heightmap.size())?;

        let patch_size = config.patch_size;
        let template = PatchTemplate::new(patch_size);
        let errors = ErrorTable::build(&heightmap, patch_size, config.error_mode);
        let tile = TileTree::build(&heightmap, patch_size);
        let tree = LandscapeTree::build(&tile, config.hm_tile);
        let [sx, sy, sz] = config.scale;
        let bounds = NodeBounds { patch_size, scale: Vec3::new(sx, sy, sz) };

        let mut vertex_cache = CircularCache::new(
            "vertex",
            config.vertex_cache_kb as usize * 1024,
            vertex_memory,
        )?;
        let mut index_cache = CircularCache::new(
            "index",
            config.index_cache_kb as usize * 1024,
            index_memory,
        )?;

        let occlusion = if config.occlusion.is_enabled() {
            Some(occlusion::load_or_compute(&heightmap, &config.occlusion, sz / sx)?)
        } else {
            None
        };

        let side = tree.patches_per_side();
        let top = (template.levels() - 1) as u8;
        let patches = (0..side * side)
            .map(|_| Patch {
                new_level: top,
                d: 0.0,
                colour_tex: 0,
                blend_tex: [0; 4],
                vertex_slot: vertex_cache.register_slot(),
                index_slot: index_cache.register_slot(),
                vertex_level: None,
                index_key: None,
            })
            .collect();

        log::info!(
            "Built landscape: {}x{} patches of {} cells, {} levels, occlusion {} in {:.1}ms",
            side,
            side,
            patch_size,
            template.levels(),
            if occlusion.is_some() { "on" } else { "off" },
            start.elapsed().as_secs_f64() * 1000.0
        );

        let fov = 60f32.to_radians();
        Ok(Self {
            tile_patches: tile.patches_per_side(),
            config,
            heightmap,
            template,
            errors,
            tree,
            bounds,
            patches,
            vertex_cache,
            index_cache,
            occlusion,
            forced_level: None,
            screen_height: DEFAULT_SCREEN_HEIGHT,
            projection: (fov, DEFAULT_SCREEN_HEIGHT),
            error_metric: screen_error_metric(fov, DEFAULT_SCREEN_HEIGHT),
        })
    }

    pub fn config(&self) -> &LandscapeConfig {
        &self.config
    }

    pub fn heightmap(&self) -> &HeightMap {
        &self.heightmap
    }

    /// Patches per landscape side
    pub fn patches_per_side(&self) -> u32 {
        self.tree.patches_per_side()
    }

    /// Number of mip levels per patch
    pub fn levels(&self) -> u32 {
        self.template.levels()
    }

    /// Landscape side in cells
    pub fn size_cells(&self) -> u32 {
        self.patches_per_side() * self.config.patch_size
    }

    pub fn tree(&self) -> &QuadTree {
        self.tree.tree()
    }

    pub fn occlusion(&self) -> Option<&OcclusionMap> {
        self.occlusion.as_ref()
    }

    pub fn patch(&self, px: u32, py: u32) -> Option<&Patch> {
        self.patch_slot(px, py).map(|i| &self.patches[i])
    }

    pub fn patch_mut(&mut self, px: u32, py: u32) -> Option<&mut Patch> {
        self.patch_slot(px, py).map(move |i| &mut self.patches[i])
    }

    /// Error array of landscape patch `(px, py)`
    pub fn patch_errors(&self, px: u32, py: u32) -> &[f32] {
        self.errors.patch(px % self.tile_patches, py % self.tile_patches)
    }

    /// Counters of the vertex and index caches
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.vertex_cache.stats(), self.index_cache.stats())
    }

    fn patch_slot(&self, px: u32, py: u32) -> Option<usize> {
        let side = self.patches_per_side();
        (px < side && py < side).then_some((py * side + px) as usize)
    }

    /// Viewport height used by the screen error metric
    pub fn set_screen_height(&mut self, pixels: u32) {
        self.screen_height = pixels.max(1);
    }

    fn update_error_metric(&mut self, fov_y: f32) {
        let projection = (fov_y, self.screen_height);
        if projection != self.projection {
            self.projection = projection;
            self.error_metric = screen_error_metric(fov_y, self.screen_height);
        }
    }

    /// Reset the per-frame cache flags
    pub fn begin_frame(&mut self) {
        self.vertex_cache.init_frame();
        self.index_cache.init_frame();
    }

    /// Run the hierarchical clip pass for `camera`
    pub fn clip(&mut self, camera: &Camera) -> ClipStats {
        let frustum = camera.frustum();
        clip_tree(self.tree.tree_mut(), &frustum, &self.bounds)
    }

    /// Choose a level for every leaf that is not clipped away
    pub fn set_mip_levels(&mut self, camera: &Camera) {
        self.update_error_metric(camera.fov_y);
        let params = LodParams {
            error_metric: self.error_metric,
            max_pixel_error: self.config.max_pixel_error,
            far: camera.far,
            z_scale: self.config.scale[2],
            patch_size: self.config.patch_size,
            levels: self.template.levels(),
        };
        let forward = camera.forward();
        let tree = self.tree.tree();
        let side = self.patches_per_side();

        for py in 0..side {
            for px in 0..side {
                let leaf = tree.leaf_index(px, py);
                if tree.node(leaf).clip() == CLIP_OUTSIDE {
                    continue;
                }
                let center = self.bounds.aabb(tree, leaf).center();
                let d = (center - camera.position).dot(forward);
                let level = match self.forced_level {
                    Some(level) => level as u32,
                    None => params.select(
                        d,
                        self.errors.patch(px % self.tile_patches, py % self.tile_patches),
                    ),
                };

                let patch = &mut self.patches[(py * side + px) as usize];
                patch.d = d;
                patch.new_level = level as u8;
            }
        }
    }

    /// Pin every patch to `level` (clamped to the coarsest), or return to
    /// normal selection with `None`
    pub fn force_mip_level(&mut self, level: Option<u8>) {
        let top = (self.template.levels() - 1) as u8;
        self.forced_level = level.map(|l| l.min(top));
        if let Some(level) = self.forced_level {
            for patch in &mut self.patches {
                patch.new_level = level;
            }
        }
    }

    /// Levels of the four patches around `(px, py)`; absent past the landscape edge
    pub fn neighbor_levels(&self, px: u32, py: u32) -> NeighborLevels {
        if let Some(level) = self.forced_level {
            return NeighborLevels::uniform(level);
        }
        let level_at = |x: Option<u32>, y: Option<u32>| {
            let (x, y) = (x?, y?);
            self.patch(x, y).map(|p| p.new_level)
        };
        NeighborLevels::new(
            level_at(px.checked_sub(1), Some(py)),
            level_at(px.checked_add(1), Some(py)),
            level_at(Some(px), py.checked_add(1)),
            level_at(Some(px), py.checked_sub(1)),
        )
    }

    /// Leaves not clipped away, in quadtree order
    fn unclipped_leaves(&self) -> Vec<(u32, u32)> {
        let tree = self.tree.tree();
        let mut leaves = Vec::new();
        if tree.is_empty() {
            return leaves;
        }

        let mut stack = vec![0usize];
        while let Some(n) = stack.pop() {
            if tree.node(n).clip() == CLIP_OUTSIDE {
                continue;
            }
            if tree.is_leaf(n) {
                let (x, y, _) = tree.footprint(n);
                leaves.push((x, y));
            } else {
                stack.extend(children(n).into_iter().rev());
            }
        }
        leaves
    }

    /// Is any part of patch `(px, py)` above the horizon seen from `eye`?
    fn horizon_visible(&self, px: u32, py: u32, eye: Vec3) -> bool {
        let Some(map) = &self.occlusion else {
            return true;
        };
        let hm_size = self.heightmap.size() as f32;
        let patch = self.config.patch_size as f32;
        let (tx, ty) = (px / self.tile_patches, py / self.tile_patches);
        let (lx, ly) = (px % self.tile_patches, py % self.tile_patches);

        let [sx, sy, _] = self.config.scale;
        let viewer = Vec3::new(
            eye.x / sx - tx as f32 * hm_size,
            eye.y / sy - ty as f32 * hm_size,
            eye.z / sx,
        );
        let rect = [
            lx as f32 * patch,
            ly as f32 * patch,
            (lx + 1) as f32 * patch,
            (ly + 1) as f32 * patch,
        ];
        let level = self.tile_patches.trailing_zeros();
        map.is_patch_visible(map.node_for(level, lx, ly), rect, viewer)
    }

    /// Make sure patch `(px, py)` has vertices and indices for its current level
    fn prepare_patch(&mut self, px: u32, py: u32) -> Result<(Allocation, Allocation)> {
        let side = self.patches_per_side();
        let i = (py * side + px) as usize;
        let level = self.patches[i].new_level;
        let neighbors = self.neighbor_levels(px, py);
        let patch_size = self.config.patch_size;

        let vertex_slot = self.patches[i].vertex_slot;
        let prefix_ok = self.patches[i].vertex_level.is_some_and(|v| v <= level);
        let vertices = match self.vertex_cache.get(vertex_slot).filter(|_| prefix_ok) {
            Some(allocation) => allocation,
            None => {
                let count = self.template.vertex_count(level as u32);
                let bytes = count * std::mem::size_of::<TerrainVertex>();
                let allocation = self.vertex_cache.alloc(bytes, vertex_slot)?;
                let out = self
                    .vertex_cache
                    .slice_mut::<TerrainVertex>(&allocation)
                    .ok_or_else(|| Error::Allocation("vertex array view".to_string()))?;
                let mapping = TexMapping {
                    tex_size: self.config.tex_size,
                    tex_tile: self.config.tex_tile,
                    base_tex_tile: self.config.base_tex_tile,
                };
                self.template.fill_vertices(
                    out,
                    &self.heightmap,
                    px * patch_size,
                    py * patch_size,
                    level as u32,
                    self.config.scale,
                    mapping,
                );
                self.patches[i].vertex_level = Some(level);
                allocation
            }
        };

        let index_slot = self.patches[i].index_slot;
        let key = (level, neighbors.stitch_key(level));
        let indices = match (self.index_cache.get(index_slot), self.patches[i].index_key) {
            (Some(allocation), Some(cached)) if cached == key => allocation,
            (cached, key_before) => {
                let allocation = match (cached, key_before) {
                    // same level, new neighbours: the buffer is already big enough
                    (Some(allocation), Some((cached_level, _))) if cached_level == level => allocation,
                    _ => {
                        let bytes = index_capacity(patch_size, level as u32) * 2;
                        self.index_cache.alloc(bytes, index_slot)?
                    }
                };
                let out = self
                    .index_cache
                    .slice_mut::<u16>(&allocation)
                    .ok_or_else(|| Error::Allocation("index array view".to_string()))?;
                build_indices(&self.template, level as u32, neighbors, out);
                self.patches[i].index_key = Some(key);
                allocation
            }
        };

        Ok((vertices, indices))
    }

    /// Hand every unclipped, unoccluded patch to `renderer`
    pub fn draw_visible(&mut self, camera: &Camera, renderer: &mut dyn PatchRenderer) -> FrameStats {
        let mut stats = FrameStats::default();
        let side = self.patches_per_side();

        for (px, py) in self.unclipped_leaves() {
            if !self.horizon_visible(px, py, camera.position) {
                stats.occluded += 1;
                continue;
            }

            let (va, ia) = match self.prepare_patch(px, py) {
                Ok(allocations) => allocations,
                Err(e) => {
                    log::warn!("Skipping patch ({}, {}): {}", px, py, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            let patch = &self.patches[(py * side + px) as usize];
            let vertex_count = self.template.vertex_count(patch.new_level as u32);
            let vertices = self.vertex_cache.slice::<TerrainVertex>(&va);
            let indices = self.index_cache.slice::<u16>(&ia);
            let (Some(vertices), Some(indices)) = (vertices, indices) else {
                stats.skipped += 1;
                continue;
            };
            let triangles = indices.first().copied().unwrap_or(0) as usize;
            let index_len = (1 + triangles * 3).min(indices.len());

            renderer.draw_patch(&PatchDraw {
                px,
                py,
                level: patch.new_level,
                vertices: &vertices[..vertex_count.min(vertices.len())],
                indices: &indices[..index_len],
                d: patch.d,
                colour_tex: patch.colour_tex,
                blend_tex: patch.blend_tex,
            });
            stats.visible += 1;
            stats.triangles += triangles as u32;

            self.vertex_cache.refence(&va);
            self.index_cache.refence(&ia);
        }

        stats.vertex_cache_wrapped = self.vertex_cache.wrapped();
        stats.vertex_cache_thrashed = self.vertex_cache.thrashed();
        stats.index_cache_wrapped = self.index_cache.wrapped();
        stats.index_cache_thrashed = self.index_cache.thrashed();
        if stats.vertex_cache_thrashed || stats.index_cache_thrashed {
            log::warn!(
                "Patch caches thrashing (vertex: {}, index: {}); consider larger budgets",
                stats.vertex_cache_thrashed,
                stats.index_cache_thrashed
            );
        }
        log::debug!(
            "Frame: {} visible, {} occluded, {} skipped, {} triangles",
            stats.visible,
            stats.occluded,
            stats.skipped,
            stats.triangles
        );
        stats
    }

    /// One full frame: cache reset, clip, LOD, draw
    pub fn frame(&mut self, camera: &Camera, renderer: &mut dyn PatchRenderer) -> FrameStats {
        self.begin_frame();
        let clip = self.clip(camera);
        log::debug!(
            "Clip: {} nodes, {} boxes, {} plane tests, {} propagated",
            clip.nodes_visited,
            clip.boxes_tested,
            clip.plane_tests,
            clip.propagated
        );
        self.set_mip_levels(camera);
        self.draw_visible(camera, renderer)
    }

    /// Drop every cached vertex and index array
    pub fn flush_caches(&mut self) -> Result<()> {
        for patch in &mut self.patches {
            patch.vertex_level = None;
            patch.index_key = None;
        }
        let vertex = self.vertex_cache.flush();
        let index = self.index_cache.flush();
        vertex.and(index)
    }

    /// Bilinear terrain height at world `(x, y)`, `None` off the landscape
    pub fn height_at(&self, x: f32, y: f32) -> Option<f32> {
        let [sx, sy, sz] = self.config.scale;
        let extent = self.size_cells() as f32;
        let (fx, fy) = (x / sx, y / sy);
        if !(0.0..=extent).contains(&fx) || !(0.0..=extent).contains(&fy) {
            return None;
        }

        let ix = fx.floor().min(extent - 1.0);
        let iy = fy.floor().min(extent - 1.0);
        let (tx, ty) = (fx - ix, fy - iy);
        let n = self.heightmap.size();
        let (x0, y0) = (ix as u32 % n, iy as u32 % n);
        let h = |x: u32, y: u32| self.heightmap.get(x, y) as f32;

        let bottom = h(x0, y0) * (1.0 - tx) + h(x0 + 1, y0) * tx;
        let top = h(x0, y0 + 1) * (1.0 - tx) + h(x0 + 1, y0 + 1) * tx;
        Some((bottom * (1.0 - ty) + top * ty) * sz)
    }

    fn collider(&self) -> TerrainCollider<'_> {
        TerrainCollider::new(self.tree.tree(), &self.heightmap, self.bounds)
    }

    /// First contact of a box of `half_extent` moving from `start` to `end`
    pub fn collide(&self, start: Vec3, end: Vec3, half_extent: Vec3) -> Option<CollisionHit> {
        self.collider().sweep(start, end, half_extent)
    }

    /// Furthest position along the move that stays clear of the terrain
    pub fn clip_move(&self, start: Vec3, end: Vec3, half_extent: Vec3) -> Vec3 {
        self.collider().clip_move(start, end, half_extent)
    }
}
