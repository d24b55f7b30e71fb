// launch.rs — launch geometry for one tile.
//
// One unit of work per input cell, grouped into fixed 16x16 work-groups.
// The grid is the ceil-division of the input window by the work-group
// extent, so the last group in each dimension may be partially idle; the
// kernel guards against out-of-window invocations.

use crate::addressing::TileOffset;
use crate::operator::Operator;
use crate::rect::TileRect;
use crate::stencil::CellSize;

/// Work-group extent in cells, `(x = columns, y = rows)`.
pub const WORKGROUP_SIZE: WorkgroupSize = WorkgroupSize { x: 16, y: 16 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Invocations per work-group.
    pub fn total(&self) -> u32 {
        self.x * self.y
    }
}

/// Number of work-groups along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGrid {
    pub groups_x: u32,
    pub groups_y: u32,
}

impl LaunchGrid {
    /// Cover a `height x width` window with [`WORKGROUP_SIZE`] groups.
    pub fn cover(height: usize, width: usize) -> Self {
        LaunchGrid {
            groups_x: (width as u32).div_ceil(WORKGROUP_SIZE.x),
            groups_y: (height as u32).div_ceil(WORKGROUP_SIZE.y),
        }
    }

    /// Total invocations launched, including idle ones in the last groups.
    pub fn invocations(&self) -> u64 {
        self.groups_x as u64 * self.groups_y as u64 * WORKGROUP_SIZE.total() as u64
    }
}

/// Everything a backend needs to run the stencil over one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StencilLaunch {
    pub operator: Operator,
    pub input: TileRect,
    pub output: TileRect,
    pub offset: TileOffset,
    pub cell_size: CellSize,
    pub grid: LaunchGrid,
}

impl StencilLaunch {
    pub fn new(operator: Operator, input: TileRect, output: TileRect, cell_size: CellSize) -> Self {
        StencilLaunch {
            operator,
            input,
            output,
            offset: TileOffset::between(&input, &output),
            cell_size,
            grid: LaunchGrid::cover(input.height(), input.width()),
        }
    }
}
