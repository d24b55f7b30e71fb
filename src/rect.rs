// rect.rs — rectangular tile windows within a raster.
//
// A tile is described by two rectangles: the input window (output window
// plus a one-cell halo where the raster allows it) and the output window.
// Row/column starts are signed so a halo may reach above or left of the
// logical raster origin.

use std::fmt;

/// An immutable rectangular window `[row_start, row_start + height) x
/// [col_start, col_start + width)` in raster cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRect {
    row_start: i64,
    col_start: i64,
    height: usize,
    width: usize,
}

impl TileRect {
    pub const fn new(row_start: i64, col_start: i64, height: usize, width: usize) -> Self {
        TileRect { row_start, col_start, height, width }
    }

    #[inline]
    pub fn row_start(&self) -> i64 {
        self.row_start
    }

    #[inline]
    pub fn col_start(&self) -> i64 {
        self.col_start
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// One past the last row.
    #[inline]
    pub fn row_end(&self) -> i64 {
        self.row_start + self.height as i64
    }

    /// One past the last column.
    #[inline]
    pub fn col_end(&self) -> i64 {
        self.col_start + self.width as i64
    }

    /// Number of cells, `height * width`.
    #[inline]
    pub fn area(&self) -> usize {
        self.height * self.width
    }

    /// True when the rectangle has no cells and so cannot be processed.
    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    /// Point containment against the half-open bounds.
    pub fn contains(&self, row: i64, col: i64) -> bool {
        row >= self.row_start && row < self.row_end() && col >= self.col_start && col < self.col_end()
    }
}

impl fmt::Display for TileRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}..{}) x [{}..{}) ({}x{})",
            self.row_start,
            self.row_end(),
            self.col_start,
            self.col_end(),
            self.height,
            self.width
        )
    }
}
