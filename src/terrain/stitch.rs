//! Crack-free index generation between patches of different levels
//!
//! A patch whose neighbour on some side is coarser must not use the fine
//! vertices of that shared edge, or the two meshes leave T-junctions. The
//! generator keeps regular cells in the interior and replaces the one-cell
//! band along each coarser side by a zipper between the coarse edge
//! vertices and the first inner row of fine vertices.
//!
//! Output layout: `out[0]` is the triangle count, followed by index triples
//! wound counter-clockwise seen from +Z.

use super::template::PatchTemplate;

pub const STITCH_LEFT: u8 = 1;
pub const STITCH_RIGHT: u8 = 2;
pub const STITCH_TOP: u8 = 4;
pub const STITCH_BOTTOM: u8 = 8;

const NO_NEIGHBOR: u8 = 0xFF;

/// Levels of the four neighbours packed into one word: left in bits 0-7,
/// right 8-15, top 16-23, bottom 24-31. `0xFF` marks a missing neighbour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NeighborLevels(pub u32);

impl NeighborLevels {
    pub const NONE: Self = Self(u32::MAX);

    pub fn new(left: Option<u8>, right: Option<u8>, top: Option<u8>, bottom: Option<u8>) -> Self {
        let pack = |l: Option<u8>| l.unwrap_or(NO_NEIGHBOR) as u32;
        Self(pack(left) | pack(right) << 8 | pack(top) << 16 | pack(bottom) << 24)
    }

    /// Every neighbour at `level`
    pub fn uniform(level: u8) -> Self {
        Self::new(Some(level), Some(level), Some(level), Some(level))
    }

    fn side(&self, shift: u32) -> Option<u8> {
        let level = (self.0 >> shift) as u8;
        (level != NO_NEIGHBOR).then_some(level)
    }

    pub fn left(&self) -> Option<u8> {
        self.side(0)
    }

    pub fn right(&self) -> Option<u8> {
        self.side(8)
    }

    pub fn top(&self) -> Option<u8> {
        self.side(16)
    }

    pub fn bottom(&self) -> Option<u8> {
        self.side(24)
    }

    /// Sides whose neighbour is strictly coarser than `level`
    pub fn stitch_mask(&self, level: u8) -> u8 {
        let coarser = |n: Option<u8>| n.is_some_and(|n| n > level);
        let mut mask = 0;
        if coarser(self.left()) {
            mask |= STITCH_LEFT;
        }
        if coarser(self.right()) {
            mask |= STITCH_RIGHT;
        }
        if coarser(self.top()) {
            mask |= STITCH_TOP;
        }
        if coarser(self.bottom()) {
            mask |= STITCH_BOTTOM;
        }
        mask
    }

    /// The neighbour levels an index buffer at `level` depends on. Sides
    /// that are not coarser all read as missing, so two arrangements with
    /// the same key produce the same indices.
    pub fn stitch_key(&self, level: u8) -> Self {
        let coarser = |n: Option<u8>| n.filter(|n| *n > level);
        Self::new(
            coarser(self.left()),
            coarser(self.right()),
            coarser(self.top()),
            coarser(self.bottom()),
        )
    }
}

/// `u16` slots an index buffer for `level` may need, count included
pub fn index_capacity(patch_size: u32, level: u32) -> usize {
    let n = (patch_size >> level) as usize;
    1 + 6 * n * n
}

struct IndexWriter<'a> {
    template: &'a PatchTemplate,
    /// Grid step of the patch's own level
    step: u32,
    out: &'a mut [u16],
    cursor: usize,
    triangles: u16,
}

impl IndexWriter<'_> {
    /// Emit a triangle given in level-grid coordinates, fixing its winding
    fn triangle(&mut self, a: (u32, u32), b: (u32, u32), c: (u32, u32)) {
        let cross = (b.0 as i64 - a.0 as i64) * (c.1 as i64 - a.1 as i64)
            - (b.1 as i64 - a.1 as i64) * (c.0 as i64 - a.0 as i64);
        let (b, c) = if cross < 0 { (c, b) } else { (b, c) };

        if self.cursor + 3 > self.out.len() {
            return;
        }
        for (x, y) in [a, b, c] {
            self.out[self.cursor] = self.template.index_at(x * self.step, y * self.step);
            self.cursor += 1;
        }
        self.triangles += 1;
    }

    fn cells(&mut self, x0: u32, x1: u32, y0: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                self.triangle((x, y), (x + 1, y), (x + 1, y + 1));
                self.triangle((x, y), (x + 1, y + 1), (x, y + 1));
            }
        }
    }

    /// Zip an outer edge with vertices every `stride` cells to an inner row
    /// with vertices every cell. `outer(k)` and `inner(k)` map a position
    /// along the edge to grid coordinates.
    fn zipper(
        &mut self,
        n: u32,
        stride: u32,
        inner_range: (u32, u32),
        outer: impl Fn(u32) -> (u32, u32),
        inner: impl Fn(u32) -> (u32, u32),
    ) {
        let (mut o, mut i) = (0, inner_range.0);
        while o < n || i < inner_range.1 {
            let advance_inner = i < inner_range.1 && (o >= n || i + 1 <= o + stride);
            if advance_inner {
                self.triangle(outer(o), inner(i), inner(i + 1));
                i += 1;
            } else {
                self.triangle(outer(o), inner(i), outer(o + stride));
                o += stride;
            }
        }
    }
}

/// Write the index buffer of a patch drawn at `level` next to `neighbors`.
/// Returns the triangle count, which is also stored in `out[0]`.
pub fn build_indices(
    template: &PatchTemplate,
    level: u32,
    neighbors: NeighborLevels,
    out: &mut [u16],
) -> u16 {
    if out.is_empty() {
        return 0;
    }
    if level >= template.levels() {
        out[0] = 0;
        return 0;
    }

    let n = template.patch_size() >> level;
    let mask = neighbors.stitch_mask(level as u8);
    let mut writer = IndexWriter {
        template,
        step: 1 << level,
        out,
        cursor: 1,
        triangles: 0,
    };

    if mask == 0 {
        writer.cells(0, n, 0, n);
    } else {
        let x0 = (mask & STITCH_LEFT != 0) as u32;
        let x1 = n - (mask & STITCH_RIGHT != 0) as u32;
        let y0 = (mask & STITCH_BOTTOM != 0) as u32;
        let y1 = n - (mask & STITCH_TOP != 0) as u32;
        writer.cells(x0, x1, y0, y1);

        let stride = |neighbor: Option<u8>| {
            let top = template.levels() - 1;
            neighbor.map_or(1, |l| 1 << ((l as u32).min(top) - level)).min(n)
        };

        if mask & STITCH_LEFT != 0 {
            let s = stride(neighbors.left());
            writer.zipper(n, s, (y0, y1), |k| (0, k), |k| (x0, k));
        }
        if mask & STITCH_RIGHT != 0 {
            let s = stride(neighbors.right());
            writer.zipper(n, s, (y0, y1), |k| (n, k), |k| (x1, k));
        }
        if mask & STITCH_BOTTOM != 0 {
            let s = stride(neighbors.bottom());
            writer.zipper(n, s, (x0, x1), |k| (k, 0), |k| (k, y0));
        }
        if mask & STITCH_TOP != 0 {
            let s = stride(neighbors.top());
            writer.zipper(n, s, (x0, x1), |k| (k, n), |k| (k, y1));
        }
    }

    let triangles = writer.triangles;
    writer.out[0] = triangles;
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn build(patch_size: u32, level: u32, neighbors: NeighborLevels) -> (PatchTemplate, Vec<u16>) {
        let template = PatchTemplate::new(patch_size);
        let mut out = vec![0u16; index_capacity(patch_size, level)];
        let count = build_indices(&template, level, neighbors, &mut out);
        out.truncate(1 + 3 * count as usize);
        (template, out)
    }

    fn triangles(template: &PatchTemplate, indices: &[u16]) -> Vec<[(i64, i64); 3]> {
        indices[1..]
            .chunks(3)
            .map(|t| {
                let p = |i: u16| {
                    let (x, y) = template.point(i);
                    (x as i64, y as i64)
                };
                [p(t[0]), p(t[1]), p(t[2])]
            })
            .collect()
    }

    fn doubled_area(t: &[(i64, i64); 3]) -> i64 {
        (t[1].0 - t[0].0) * (t[2].1 - t[0].1) - (t[1].1 - t[0].1) * (t[2].0 - t[0].0)
    }

    /// Grid points accepted by `on_edge` that any triangle uses
    fn edge_points(template: &PatchTemplate, indices: &[u16], on_edge: impl Fn(u32, u32) -> bool) -> BTreeSet<(u32, u32)> {
        indices[1..]
            .iter()
            .map(|&i| template.point(i))
            .filter(|&(x, y)| on_edge(x, y))
            .collect()
    }

    #[test]
    fn test_neighbor_packing() {
        let n = NeighborLevels::new(Some(1), None, Some(3), Some(0));
        assert_eq!(n.left(), Some(1));
        assert_eq!(n.right(), None);
        assert_eq!(n.top(), Some(3));
        assert_eq!(n.bottom(), Some(0));
        assert_eq!(NeighborLevels::NONE.stitch_mask(0), 0);
        assert_eq!(NeighborLevels::uniform(2).stitch_mask(2), 0);
        assert_eq!(n.stitch_mask(1), STITCH_TOP);
        assert_eq!(n.stitch_mask(0), STITCH_LEFT | STITCH_TOP);
    }

    #[test]
    fn test_unstitched_patch() {
        let (template, indices) = build(8, 1, NeighborLevels::uniform(1));
        assert_eq!(indices[0], 32);
        let tris = triangles(&template, &indices);
        assert!(tris.iter().all(|t| doubled_area(t) == 4));
    }

    #[test]
    fn test_left_coarser_closed_form() {
        // left neighbour one level coarser, everything else equal
        for (patch_size, level) in [(8, 0), (16, 1), (32, 0), (64, 2)] {
            let l = level as u8;
            let neighbors = NeighborLevels::new(Some(l + 1), Some(l), Some(l), Some(l));
            assert_eq!(neighbors.stitch_mask(l), STITCH_LEFT);

            let (_, indices) = build(patch_size, level, neighbors);
            let n = (patch_size >> level) as u16;
            let interior = 2 * n * (n - 1);
            let zipper = n / 2 + n;
            assert_eq!(indices[0], interior + zipper);
        }
    }

    #[test]
    fn test_stitched_patches_tile_the_square() {
        let patch_size = 16;
        let levels = 5u32;
        for level in 0..levels - 1 {
            for mask in 0..16u8 {
                for coarse in level + 1..levels {
                    let side = |bit: u8| (mask & bit != 0).then_some(coarse as u8).or(Some(level as u8));
                    let neighbors = NeighborLevels::new(
                        side(STITCH_LEFT),
                        side(STITCH_RIGHT),
                        side(STITCH_TOP),
                        side(STITCH_BOTTOM),
                    );
                    let (template, indices) = build(patch_size, level, neighbors);
                    let tris = triangles(&template, &indices);
                    let area: i64 = tris.iter().map(doubled_area).sum();
                    assert!(tris.iter().all(|t| doubled_area(t) > 0), "level {} mask {}", level, mask);
                    assert_eq!(area, 2 * (patch_size * patch_size) as i64);
                }
            }
        }
    }

    #[test]
    fn test_shared_edge_has_no_cracks() {
        for patch_size in [4u32, 8, 16, 32, 64, 128] {
            let levels = patch_size.trailing_zeros() + 1;
            for fine in 0..levels {
                for coarse in fine + 1..levels {
                    // fine patch on the left, coarse patch on its right
                    let (ft, fine_idx) = build(
                        patch_size,
                        fine,
                        NeighborLevels::new(None, Some(coarse as u8), None, None),
                    );
                    let (ct, coarse_idx) = build(
                        patch_size,
                        coarse,
                        NeighborLevels::new(Some(fine as u8), None, None, None),
                    );

                    let fine_edge = edge_points(&ft, &fine_idx, |x, _| x == patch_size);
                    let coarse_edge: BTreeSet<(u32, u32)> = edge_points(&ct, &coarse_idx, |x, _| x == 0)
                        .into_iter()
                        .map(|(_, y)| (patch_size, y))
                        .collect();
                    assert_eq!(fine_edge, coarse_edge, "size {} levels {}/{}", patch_size, fine, coarse);
                }
            }
        }
    }

    #[test]
    fn test_stitch_key_ignores_finer_sides() {
        let a = NeighborLevels::new(Some(0), Some(1), None, Some(3));
        let b = NeighborLevels::new(None, Some(1), Some(1), Some(3));
        assert_eq!(a.stitch_key(1), b.stitch_key(1));
        assert_eq!(a.stitch_key(1), NeighborLevels::new(None, None, None, Some(3)));

        let further = NeighborLevels::new(Some(0), Some(1), None, Some(4));
        assert_ne!(a.stitch_key(1), further.stitch_key(1));
    }

    #[test]
    fn test_out_of_range_levels_do_not_panic() {
        let template = PatchTemplate::new(16);
        let mut out = vec![7u16; index_capacity(16, 0)];

        let count = build_indices(&template, 5, NeighborLevels::uniform(200), &mut out);
        assert_eq!((count, out[0]), (0, 0));

        // a neighbour past the coarsest level zips like the coarsest level
        let clamped = build_indices(&template, 0, NeighborLevels::new(Some(200), None, None, None), &mut out);
        let coarsest = build_indices(&template, 0, NeighborLevels::new(Some(4), None, None, None), &mut out);
        assert_eq!(clamped, coarsest);
    }

    #[test]
    fn test_capacity_is_enough() {
        let template = PatchTemplate::new(16);
        for level in 0..4u32 {
            let neighbors = NeighborLevels::uniform(4);
            let mut out = vec![0u16; index_capacity(16, level)];
            let count = build_indices(&template, level, neighbors, &mut out) as usize;
            assert!(1 + 3 * count <= out.len());
            let n = (16 >> level) as usize;
            assert!(count <= 2 * n * n);
        }
    }
}
