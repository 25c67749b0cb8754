//! Hierarchical frustum clipping over the landscape quadtree
//!
//! A node only tests the planes its parent still straddles. Once a node is
//! fully inside (`0`) or fully outside (`1`) the verdict holds for its whole
//! subtree, so descendants receive it without any plane test, and a subtree
//! whose root keeps the same verdict as last frame is not visited at all.

use crate::core::types::Vec3;
use crate::math::frustum::{CLIP_ALL, CLIP_INSIDE, CLIP_OUTSIDE};
use crate::math::{Aabb, Frustum};

use super::quadtree::{children, level_start, QuadTree};

/// Work done by one clip pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClipStats {
    /// Nodes whose flags were recomputed or inherited
    pub nodes_visited: u32,
    /// Nodes whose box was tested against at least one plane
    pub boxes_tested: u32,
    pub plane_tests: u32,
    /// Descendants that inherited a 0/1 verdict without a test
    pub propagated: u32,
}

/// World-space boxes of quadtree nodes
#[derive(Clone, Copy, Debug)]
pub struct NodeBounds {
    pub patch_size: u32,
    pub scale: Vec3,
}

impl NodeBounds {
    pub fn aabb(&self, tree: &QuadTree, n: usize) -> Aabb {
        let (x, y, span) = tree.footprint(n);
        let node = tree.node(n);
        let cells = self.patch_size as f32;
        Aabb::new(
            Vec3::new(
                x as f32 * cells * self.scale.x,
                y as f32 * cells * self.scale.y,
                node.min() as f32 * self.scale.z,
            ),
            Vec3::new(
                (x + span) as f32 * cells * self.scale.x,
                (y + span) as f32 * cells * self.scale.y,
                node.max() as f32 * self.scale.z,
            ),
        )
    }
}

/// Run one clip pass from the root
pub fn clip_tree(tree: &mut QuadTree, frustum: &Frustum, bounds: &NodeBounds) -> ClipStats {
    let mut stats = ClipStats::default();
    if !tree.is_empty() {
        clip_node(tree, frustum, bounds, 0, CLIP_ALL, &mut stats);
    }
    stats
}

fn clip_node(
    tree: &mut QuadTree,
    frustum: &Frustum,
    bounds: &NodeBounds,
    n: usize,
    parent_flags: u8,
    stats: &mut ClipStats,
) {
    stats.nodes_visited += 1;
    let previous = tree.node(n).clip();

    let flags = if parent_flags == CLIP_INSIDE || parent_flags == CLIP_OUTSIDE {
        parent_flags
    } else {
        stats.boxes_tested += 1;
        frustum.clip_aabb(&bounds.aabb(tree, n), parent_flags, &mut stats.plane_tests)
    };
    tree.node_mut(n).set_clip(flags);

    if tree.is_leaf(n) {
        return;
    }

    if flags == CLIP_INSIDE || flags == CLIP_OUTSIDE {
        if flags != previous {
            stats.propagated += propagate(tree, n, flags);
        }
        return;
    }

    for c in children(n) {
        clip_node(tree, frustum, bounds, c, flags, stats);
    }
}

/// Set every descendant of `n` to `flags`. Descendants on each level form
/// one contiguous run of indices.
fn propagate(tree: &mut QuadTree, n: usize, flags: u8) -> u32 {
    let (level, _, _) = tree.position(n);
    let offset = n - level_start(level);
    let mut count = 0;

    for depth in 1..=tree.depth() - level {
        let width = 1usize << (2 * depth);
        let start = level_start(level + depth) + offset * width;
        for d in start..start + width {
            tree.node_mut(d).set_clip(flags);
        }
        count += width as u32;
    }
    count
}
