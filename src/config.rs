// config.rs — block processor configuration.

use crate::error::{Error, Result};
use crate::gpu::device::DeviceProfile;
use crate::operator::{Command, OperatorSelection};
use crate::stencil::CellSize;

/// Settings fixed for the lifetime of a [`BlockProcessor`](crate::block::BlockProcessor).
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Terrain command and optional algorithm variant. Resolved at dispatch.
    pub operator: OperatorSelection,
    /// Largest input tile height (rows, halo included) that will be submitted.
    pub max_tile_height: usize,
    /// Largest input tile width (columns, halo included).
    pub max_tile_width: usize,
    /// Ground distance covered by one cell, X then Y.
    pub cell_size: CellSize,
    /// Device limits profile for the GPU backend. Ignored by the CPU backend.
    pub profile: DeviceProfile,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            operator: OperatorSelection::new(Command::Slope),
            max_tile_height: 1024,
            max_tile_width: 1024,
            cell_size: CellSize::UNIT,
            profile: DeviceProfile::Native,
        }
    }
}

impl ProcessorConfig {
    pub fn new(operator: impl Into<OperatorSelection>, max_tile_height: usize, max_tile_width: usize) -> Self {
        ProcessorConfig {
            operator: operator.into(),
            max_tile_height,
            max_tile_width,
            ..Default::default()
        }
    }

    pub fn with_cell_size(mut self, x: f32, y: f32) -> Self {
        self.cell_size = CellSize::new(x, y);
        self
    }

    pub fn with_profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Cells per buffer: `max_tile_height * max_tile_width`.
    pub fn capacity(&self) -> usize {
        self.max_tile_height * self.max_tile_width
    }

    /// Reject zero tile dimensions and non-positive or non-finite cell sizes.
    pub fn validate(&self) -> Result<()> {
        if self.max_tile_height == 0 || self.max_tile_width == 0 {
            return Err(Error::InvalidConfig(format!(
                "maximum tile size must be positive, got {}x{}",
                self.max_tile_height, self.max_tile_width
            )));
        }
        let CellSize { x, y } = self.cell_size;
        if !(x.is_finite() && x > 0.0 && y.is_finite() && y > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "cell size must be positive and finite, got ({x}, {y})"
            )));
        }
        Ok(())
    }
}
