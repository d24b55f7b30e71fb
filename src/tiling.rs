// tiling.rs — splitting a raster into processor-sized tiles.
//
// Output tiles partition the raster row-major. Each input window is its
// output window grown by one cell on every side, clipped to the raster:
//
//   raster 10x10, tile 4x4
//
//     output (0,0) 4x4   → input (0,0) 5x5     corner: no halo top/left
//     output (4,4) 4x4   → input (3,3) 6x6     interior: full halo
//     output (8,8) 2x2   → input (7,7) 3x3     corner: no halo bottom/right
//
// At a clipped side the input boundary coincides with the raster boundary,
// so those cells get the edge sentinel exactly as they would if the whole
// raster were processed as a single tile. Stitched tiled output therefore
// matches single-tile output cell for cell.

use crate::block::{Accelerator, BlockProcessor};
use crate::error::{Error, Result};
use crate::rect::TileRect;

// ---------------------------------------------------------------------------
// Raster
// ---------------------------------------------------------------------------

/// Row-major in-memory elevation grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Raster {
    /// A `rows x cols` raster filled with zeros.
    pub fn new(rows: usize, cols: usize) -> Self {
        Raster { rows, cols, data: vec![0.0; rows * cols] }
    }

    /// Wrap an existing row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidConfig(format!(
                "raster {rows}x{cols} needs {} cells, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(Raster { rows, cols, data })
    }

    /// Build from a function of `(row, col)`.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Raster { rows, cols, data }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Whole raster as a rectangle anchored at the origin.
    pub fn bounds(&self) -> TileRect {
        TileRect::new(0, 0, self.rows, self.cols)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        let start = row * self.cols;
        &mut self.data[start..start + self.cols]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Copy `rect` (which must lie inside the raster) row-major into `dst`.
    fn read_window(&self, rect: &TileRect, dst: &mut [f32]) {
        let (r0, c0) = (rect.row_start() as usize, rect.col_start() as usize);
        let w = rect.width();
        for (i, dst_row) in dst[..rect.area()].chunks_exact_mut(w).enumerate() {
            dst_row.copy_from_slice(&self.row(r0 + i)[c0..c0 + w]);
        }
    }

    /// Copy row-major `src` into `rect` (which must lie inside the raster).
    fn write_window(&mut self, rect: &TileRect, src: &[f32]) {
        let (r0, c0) = (rect.row_start() as usize, rect.col_start() as usize);
        let w = rect.width();
        for (i, src_row) in src[..rect.area()].chunks_exact(w).enumerate() {
            self.row_mut(r0 + i)[c0..c0 + w].copy_from_slice(src_row);
        }
    }
}

// ---------------------------------------------------------------------------
// TilePlan
// ---------------------------------------------------------------------------

/// One unit of work: the window to upload and the window it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePair {
    pub input: TileRect,
    pub output: TileRect,
}

/// Row-major tiling of a raster into output tiles of at most
/// `tile_height x tile_width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlan {
    rows: usize,
    cols: usize,
    tile_height: usize,
    tile_width: usize,
}

impl TilePlan {
    pub fn new(rows: usize, cols: usize, tile_height: usize, tile_width: usize) -> Result<Self> {
        if tile_height == 0 || tile_width == 0 {
            return Err(Error::InvalidConfig(format!(
                "tile size must be non-zero, got {tile_height}x{tile_width}"
            )));
        }
        Ok(TilePlan { rows, cols, tile_height, tile_width })
    }

    /// Largest output tile that fits a processor of `max_tile_height x
    /// max_tile_width` once the halo is added.
    pub fn for_processor(
        rows: usize,
        cols: usize,
        max_tile_height: usize,
        max_tile_width: usize,
    ) -> Result<Self> {
        if max_tile_height < 3 || max_tile_width < 3 {
            return Err(Error::InvalidConfig(format!(
                "processor capacity {max_tile_height}x{max_tile_width} leaves no room for a halo"
            )));
        }
        TilePlan::new(rows, cols, max_tile_height - 2, max_tile_width - 2)
    }

    /// Processor capacity `(height, width)` the plan needs.
    pub fn required_capacity(&self) -> (usize, usize) {
        (self.tile_height + 2, self.tile_width + 2)
    }

    pub fn tile_rows(&self) -> usize {
        self.rows.div_ceil(self.tile_height)
    }

    pub fn tile_cols(&self) -> usize {
        self.cols.div_ceil(self.tile_width)
    }

    pub fn len(&self) -> usize {
        self.tile_rows() * self.tile_cols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `index`-th tile in row-major order.
    pub fn pair(&self, index: usize) -> Option<TilePair> {
        if index >= self.len() {
            return None;
        }
        let (tr, tc) = (index / self.tile_cols(), index % self.tile_cols());
        let r0 = tr * self.tile_height;
        let c0 = tc * self.tile_width;
        let h = self.tile_height.min(self.rows - r0);
        let w = self.tile_width.min(self.cols - c0);
        let output = TileRect::new(r0 as i64, c0 as i64, h, w);

        let in_r0 = r0.saturating_sub(1);
        let in_c0 = c0.saturating_sub(1);
        let in_r1 = (r0 + h + 1).min(self.rows);
        let in_c1 = (c0 + w + 1).min(self.cols);
        let input = TileRect::new(in_r0 as i64, in_c0 as i64, in_r1 - in_r0, in_c1 - in_c0);

        Some(TilePair { input, output })
    }

    pub fn iter(&self) -> impl Iterator<Item = TilePair> + '_ {
        (0..self.len()).filter_map(move |i| self.pair(i))
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Run `processor` over the whole of `raster`, tile by tile, and stitch the
/// results into a raster of the same shape.
///
/// Tiles are sized from the processor capacity. The first failing tile
/// aborts the run.
pub fn process_raster<A: Accelerator>(
    processor: &mut BlockProcessor<A>,
    raster: &Raster,
) -> Result<Raster> {
    let (max_h, max_w) = processor.max_tile_size();
    let plan = TilePlan::for_processor(raster.rows(), raster.cols(), max_h, max_w)?;
    log::debug!(
        "processing {}x{} raster in {} tiles ({}x{} per tile)",
        raster.rows(),
        raster.cols(),
        plan.len(),
        plan.tile_height,
        plan.tile_width,
    );

    let mut out = Raster::new(raster.rows(), raster.cols());
    for pair in plan.iter() {
        raster.read_window(&pair.input, processor.input_mut());
        processor.process_tile(&pair.input, &pair.output)?;
        out.write_window(&pair.output, processor.output_tile(&pair.output));
    }
    Ok(out)
}
