//! Implicit quadtree over terrain patches
//!
//! Nodes live in a flat array. Node `n` has children `4n + 1 ..= 4n + 4`
//! (bottom-left, bottom-right, top-left, top-right), so level `l` starts at
//! `(4^l - 1) / 3` and the node at `(x, y)` within a level sits at the
//! Morton code of `(x, y)` past that start.
//!
//! Two trees share the indexing: [`TileTree`] bounds one height map tile down
//! to patch granularity, and [`LandscapeTree`] covers every tiled instance
//! and also carries per-frame clip flags.

use bytemuck::{Pod, Zeroable};

use super::heightmap::HeightMap;
use crate::math::frustum::CLIP_ALL;
use crate::math::morton::{decode_morton_2d, encode_morton_2d};

/// Packed node word
///
/// Layout:
/// - bits 0-7: clip flags
/// - bits 8-15: min elevation
/// - bits 16-23: max elevation
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct QuadNode(pub u32);

impl QuadNode {
    pub const fn new(clip: u8, min: u8, max: u8) -> Self {
        Self(clip as u32 | (min as u32) << 8 | (max as u32) << 16)
    }

    /// Clip flags from the last frustum pass (bits 0-7)
    #[inline]
    pub fn clip(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Minimum elevation (bits 8-15)
    #[inline]
    pub fn min(&self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Maximum elevation (bits 16-23)
    #[inline]
    pub fn max(&self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    #[inline]
    pub fn set_clip(&mut self, clip: u8) {
        self.0 = (self.0 & !0xFF) | clip as u32;
    }

    pub fn set_min_max(&mut self, min: u8, max: u8) {
        self.0 = (self.0 & !0x00FF_FF00) | (min as u32) << 8 | (max as u32) << 16;
    }
}

/// Mip levels of a patch: `log2(patch_size) + 1`
pub fn count_patch_levels(patch_size: u32) -> u32 {
    patch_size.trailing_zeros() + 1
}

/// Nodes in a tree spanning `size` cells down to `patch_size` leaves
pub fn count_nodes(size: u32, patch_size: u32) -> usize {
    let depth = (size / patch_size).trailing_zeros();
    (0..=depth).map(|i| 1usize << (2 * i)).sum()
}

/// Index of the first node on `level`
#[inline]
pub fn level_start(level: u32) -> usize {
    ((1usize << (2 * level)) - 1) / 3
}

/// Children of node `n`: bottom-left, bottom-right, top-left, top-right
#[inline]
pub fn children(n: usize) -> [usize; 4] {
    [4 * n + 1, 4 * n + 2, 4 * n + 3, 4 * n + 4]
}

/// Parent of a non-root node
#[inline]
pub fn parent(n: usize) -> Option<usize> {
    (n > 0).then(|| (n - 1) / 4)
}

/// Flat node array plus depth. Leaves sit on level `depth`.
#[derive(Clone, Debug)]
pub struct QuadTree {
    depth: u32,
    nodes: Vec<QuadNode>,
}

impl QuadTree {
    /// Tree with `leaves_per_side^2` leaves (a power of two), all nodes
    /// flagged for a full frustum test
    pub fn new(leaves_per_side: u32) -> Self {
        let depth = leaves_per_side.max(1).trailing_zeros();
        let count = level_start(depth + 1);
        Self {
            depth,
            nodes: vec![QuadNode::new(CLIP_ALL, 0, 0); count],
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaves_per_side(&self) -> u32 {
        1 << self.depth
    }

    #[inline]
    pub fn node(&self, n: usize) -> QuadNode {
        self.nodes[n]
    }

    #[inline]
    pub fn node_mut(&mut self, n: usize) -> &mut QuadNode {
        &mut self.nodes[n]
    }

    pub fn nodes(&self) -> &[QuadNode] {
        &self.nodes
    }

    #[inline]
    pub fn is_leaf(&self, n: usize) -> bool {
        n >= level_start(self.depth)
    }

    /// Node index of `(x, y)` on `level`
    #[inline]
    pub fn index(&self, level: u32, x: u32, y: u32) -> usize {
        level_start(level) + encode_morton_2d(x, y) as usize
    }

    /// Leaf node index of patch `(px, py)`
    #[inline]
    pub fn leaf_index(&self, px: u32, py: u32) -> usize {
        self.index(self.depth, px, py)
    }

    /// `(level, x, y)` of node `n`
    pub fn position(&self, n: usize) -> (u32, u32, u32) {
        let mut level = 0;
        while level < self.depth && n >= level_start(level + 1) {
            level += 1;
        }
        let (x, y) = decode_morton_2d((n - level_start(level)) as u32);
        (level, x, y)
    }

    /// Leaf-unit rectangle covered by node `n`: `(x0, y0, leaves per side)`
    pub fn footprint(&self, n: usize) -> (u32, u32, u32) {
        let (level, x, y) = self.position(n);
        let span = 1 << (self.depth - level);
        (x * span, y * span, span)
    }

    /// Fill interior min/max bottom-up from the leaves
    pub fn rebuild_bounds(&mut self) {
        for level in (0..self.depth).rev() {
            for n in level_start(level)..level_start(level + 1) {
                let mut lo = u8::MAX;
                let mut hi = u8::MIN;
                for c in children(n) {
                    lo = lo.min(self.nodes[c].min());
                    hi = hi.max(self.nodes[c].max());
                }
                self.nodes[n].set_min_max(lo, hi);
            }
        }
    }

    /// Set every node's clip flags to `clip`
    pub fn reset_clip(&mut self, clip: u8) {
        for node in &mut self.nodes {
            node.set_clip(clip);
        }
    }
}

/// Elevation bounds over one height map tile, leaves at patch granularity
#[derive(Clone, Debug)]
pub struct TileTree {
    patch_size: u32,
    tree: QuadTree,
}

impl TileTree {
    pub fn build(heightmap: &HeightMap, patch_size: u32) -> Self {
        let patches = heightmap.size() / patch_size;
        let mut tree = QuadTree::new(patches);

        for py in 0..patches {
            for px in 0..patches {
                let (x0, y0) = (px * patch_size, py * patch_size);
                let (lo, hi) = heightmap.min_max(x0, y0, x0 + patch_size, y0 + patch_size);
                let leaf = tree.leaf_index(px, py);
                tree.node_mut(leaf).set_min_max(lo, hi);
            }
        }
        tree.rebuild_bounds();

        Self { patch_size, tree }
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    pub fn patches_per_side(&self) -> u32 {
        self.tree.leaves_per_side()
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    /// Bounds of patch `(px, py)` within the tile
    pub fn patch_bounds(&self, px: u32, py: u32) -> (u8, u8) {
        let node = self.tree.node(self.tree.leaf_index(px, py));
        (node.min(), node.max())
    }
}

/// Clip state and bounds over the whole tiled landscape
#[derive(Clone, Debug)]
pub struct LandscapeTree {
    tree: QuadTree,
}

impl LandscapeTree {
    /// Repeat `tile`'s leaves `hm_tile x hm_tile` times and merge upwards
    pub fn build(tile: &TileTree, hm_tile: u32) -> Self {
        let per_tile = tile.patches_per_side();
        let mut tree = QuadTree::new(per_tile * hm_tile);
        let side = tree.leaves_per_side();

        for py in 0..side {
            for px in 0..side {
                let (lo, hi) = tile.patch_bounds(px % per_tile, py % per_tile);
                let leaf = tree.leaf_index(px, py);
                tree.node_mut(leaf).set_min_max(lo, hi);
            }
        }
        tree.rebuild_bounds();

        Self { tree }
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut QuadTree {
        &mut self.tree
    }

    pub fn patches_per_side(&self) -> u32 {
        self.tree.leaves_per_side()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spiky_map() -> HeightMap {
        let mut tile = vec![0u8; 32 * 32];
        for (i, h) in tile.iter_mut().enumerate() {
            *h = ((i * 37) % 251) as u8;
        }
        HeightMap::from_tile(32, &tile).expect("tile")
    }

    #[test]
    fn test_node_packing() {
        let mut node = QuadNode::new(0x7E, 12, 200);
        assert_eq!(node.clip(), 0x7E);
        assert_eq!(node.min(), 12);
        assert_eq!(node.max(), 200);

        node.set_clip(1);
        assert_eq!((node.clip(), node.min(), node.max()), (1, 12, 200));
        node.set_min_max(3, 4);
        assert_eq!((node.clip(), node.min(), node.max()), (1, 3, 4));
        assert_eq!(node.0 >> 24, 0);
    }

    #[test]
    fn test_counts() {
        assert_eq!(count_patch_levels(1), 1);
        assert_eq!(count_patch_levels(16), 5);
        assert_eq!(count_patch_levels(128), 8);

        assert_eq!(count_nodes(16, 16), 1);
        assert_eq!(count_nodes(32, 16), 5);
        assert_eq!(count_nodes(256, 16), 1 + 4 + 16 + 64 + 256);
        assert_eq!(QuadTree::new(16).len(), count_nodes(256, 16));
    }

    #[test]
    fn test_indexing() {
        let tree = QuadTree::new(8);
        assert_eq!(children(0), [1, 2, 3, 4]);
        assert_eq!(parent(7), Some(1));
        assert_eq!(parent(0), None);

        // children of (level, x, y) cover (2x..2x+1, 2y..2y+1) in BL, BR, TL, TR order
        for n in 0..level_start(tree.depth()) {
            let (level, x, y) = tree.position(n);
            let expect = [
                (level + 1, 2 * x, 2 * y),
                (level + 1, 2 * x + 1, 2 * y),
                (level + 1, 2 * x, 2 * y + 1),
                (level + 1, 2 * x + 1, 2 * y + 1),
            ];
            for (c, e) in children(n).iter().zip(expect) {
                assert_eq!(tree.position(*c), e);
                assert_eq!(tree.index(e.0, e.1, e.2), *c);
            }
        }
    }

    #[test]
    fn test_footprint() {
        let tree = QuadTree::new(8);
        assert_eq!(tree.footprint(0), (0, 0, 8));
        assert_eq!(tree.footprint(4), (4, 4, 4));
        assert_eq!(tree.footprint(tree.leaf_index(5, 2)), (5, 2, 1));
    }

    #[test]
    fn test_min_max_invariant() {
        let hm = spiky_map();
        let tile = TileTree::build(&hm, 8);
        let tree = tile.tree();

        for n in 0..tree.len() {
            let node = tree.node(n);
            if tree.is_leaf(n) {
                let (x0, y0, _) = tree.footprint(n);
                let (lo, hi) = hm.min_max(x0 * 8, y0 * 8, x0 * 8 + 8, y0 * 8 + 8);
                assert_eq!((node.min(), node.max()), (lo, hi));
            } else {
                let kids = children(n).map(|c| tree.node(c));
                assert_eq!(node.min(), kids.iter().map(|k| k.min()).min().unwrap_or(0));
                assert_eq!(node.max(), kids.iter().map(|k| k.max()).max().unwrap_or(0));
            }
        }
    }

    #[test]
    fn test_landscape_tree_repeats_tile() {
        let hm = spiky_map();
        let tile = TileTree::build(&hm, 8);
        let landscape = LandscapeTree::build(&tile, 2);
        let tree = landscape.tree();

        assert_eq!(landscape.patches_per_side(), 8);
        for (px, py) in [(0, 0), (5, 1), (7, 7)] {
            let node = tree.node(tree.leaf_index(px, py));
            assert_eq!((node.min(), node.max()), tile.patch_bounds(px % 4, py % 4));
            assert_eq!(node.clip(), CLIP_ALL);
        }
        assert_eq!(tree.node(0).max(), tile.tree().node(0).max());
        assert_eq!(tree.node(0).min(), tile.tree().node(0).min());
    }
}
