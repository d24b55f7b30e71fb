// georsgpu: tiled 3x3 terrain operators on the GPU
//
// Slope, aspect, hillshade and curvature over elevation rasters too large
// to process in one go. A `BlockProcessor` owns fixed-capacity host and
// device buffers; callers stream (input, output) tile pairs through it and
// the halo rule in `addressing` decides which cells are written.

pub mod error;
pub mod rect;
pub mod operator;
pub mod stencil;
pub mod addressing;
pub mod launch;
pub mod config;
pub mod block;
pub mod cpu;
pub mod tiling;
pub mod gpu;

pub use block::{Accelerator, BlockProcessor, BufferRole};
pub use config::ProcessorConfig;
pub use cpu::CpuAccelerator;
pub use error::{AcceleratorStatus, Error, Result};
pub use gpu::device::{DeviceProfile, GpuDevice};
pub use gpu::stencil::WgpuAccelerator;
pub use operator::{Command, Operator, OperatorSelection};
pub use rect::TileRect;
pub use stencil::CellSize;
pub use tiling::{process_raster, Raster, TilePair, TilePlan};
