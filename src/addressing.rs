// addressing.rs — input-window to output-window cell mapping.
//
// The kernel runs one unit of work per INPUT cell. Each input cell at local
// position (r, c) maps to output local position (r + delta_row,
// c + delta_col), where delta = input origin - output origin:
//
//   interior tile          raster-corner tile
//   input  (R-1, C-1)      input  (0, 0)
//   output (R,   C)        output (0, 0)
//   delta  (-1, -1)        delta  (0, 0)
//
// An input cell whose mapped position falls outside the output window owns
// no output (halo-only). A mapped cell on the input window's outer ring has
// an incomplete neighbourhood and receives EDGE_SENTINEL. Everything else
// gets the operator value.
//
// The CPU reference and the WGSL kernel both follow exactly this rule.

use crate::rect::TileRect;

/// Value written where the 3x3 neighbourhood is incomplete.
pub const EDGE_SENTINEL: f32 = 0.0;

/// Offset between the input and output window origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileOffset {
    pub delta_row: i64,
    pub delta_col: i64,
}

impl TileOffset {
    pub fn between(input: &TileRect, output: &TileRect) -> Self {
        TileOffset {
            delta_row: input.row_start() - output.row_start(),
            delta_col: input.col_start() - output.col_start(),
        }
    }
}

/// What a single input cell contributes to the output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellTarget {
    /// Halo-only cell, nothing is written.
    Skip,
    /// Mapped cell on the input boundary: write [`EDGE_SENTINEL`] at `index`.
    Edge { index: usize },
    /// Mapped cell with a full neighbourhood: write the operator value at
    /// `index`.
    Interior { index: usize },
}

impl CellTarget {
    /// Output index, if the cell writes anything.
    pub fn index(self) -> Option<usize> {
        match self {
            CellTarget::Skip => None,
            CellTarget::Edge { index } | CellTarget::Interior { index } => Some(index),
        }
    }
}

/// Classify input-local cell `(row, col)` of `input` against `output`.
///
/// `index` in the result is row-major within the output window
/// (`out_row * output.width() + out_col`).
pub fn map_cell(input: &TileRect, output: &TileRect, row: usize, col: usize) -> CellTarget {
    map_cell_with(TileOffset::between(input, output), input, output, row, col)
}

/// Same as [`map_cell`] with a precomputed offset, for hot loops.
#[inline]
pub fn map_cell_with(
    offset: TileOffset,
    input: &TileRect,
    output: &TileRect,
    row: usize,
    col: usize,
) -> CellTarget {
    let out_row = row as i64 + offset.delta_row;
    let out_col = col as i64 + offset.delta_col;
    if out_row < 0
        || out_col < 0
        || out_row >= output.height() as i64
        || out_col >= output.width() as i64
    {
        return CellTarget::Skip;
    }

    let index = out_row as usize * output.width() + out_col as usize;
    let on_boundary =
        row == 0 || col == 0 || row + 1 == input.height() || col + 1 == input.width();
    if on_boundary {
        CellTarget::Edge { index }
    } else {
        CellTarget::Interior { index }
    }
}
