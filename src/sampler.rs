use crate::rect::Rect;

/// Breadth-first pyramid subdivision of a rectangle.
///
/// Level 0 is the whole rectangle; level `L` divides it into a uniform
/// `2^L x 2^L` grid. Cells are yielded level by level, in raster order
/// (row-major) within each level, for every level from 0 through `levels`
/// inclusive. The cells of one level exactly tile the rectangle.
///
/// The sampler is a plain iterator with no shared state; construct a fresh
/// one per traversal.
#[derive(Debug, Clone)]
pub struct QuadtreeSampler {
    rect: Rect,
    levels: u32,
    level: u32,
    row: u32,
    col: u32,
}

impl QuadtreeSampler {
    pub fn new(rect: Rect, levels: u32) -> Self {
        QuadtreeSampler {
            rect,
            levels,
            level: 0,
            row: 0,
            col: 0,
        }
    }

    /// Total number of cells emitted for the given deepest level:
    /// `4^0 + 4^1 + ... + 4^levels = (4^(levels + 1) - 1) / 3`.
    pub fn cell_count(levels: u32) -> usize {
        ((1usize << (2 * (levels + 1))) - 1) / 3
    }
}

impl Iterator for QuadtreeSampler {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        if self.level > self.levels {
            return None;
        }
        let cells = 1u32 << self.level;
        let width = self.rect.width / cells as f32;
        let height = self.rect.height / cells as f32;
        let cell = Rect::new(
            self.rect.x + self.col as f32 * width,
            self.rect.y + self.row as f32 * height,
            width,
            height,
        );
        self.col += 1;
        if self.col == cells {
            self.col = 0;
            self.row += 1;
            if self.row == cells {
                self.row = 0;
                self.level += 1;
            }
        }
        Some(cell)
    }
}
