// cpu.rs — reference accelerator on the host.
//
// Unified-memory target: the "device" buffers are ordinary vectors and the
// transfer steps are plain copies, but the engine still drives the full
// populate → upload → launch → synchronize → download sequence so results
// are deterministic and comparable with the GPU backend.
//
// The kernel is data-parallel over output rows with rayon. Each input row
// maps to exactly one output row (offset by delta_row), so rows can be
// written independently without synchronisation.

use rayon::prelude::*;

use crate::addressing::{map_cell_with, CellTarget, EDGE_SENTINEL};
use crate::block::{Accelerator, BlockProcessor, BufferRole};
use crate::config::ProcessorConfig;
use crate::error::{AcceleratorStatus, Error, Result};
use crate::launch::StencilLaunch;
use crate::stencil::Neighborhood;

/// Host-side accelerator backed by the rayon thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuAccelerator;

impl CpuAccelerator {
    pub fn new() -> Self {
        CpuAccelerator
    }
}

impl Accelerator for CpuAccelerator {
    type Buffer = Vec<f32>;

    fn describe(&self) -> String {
        format!("cpu ({} threads)", rayon::current_num_threads())
    }

    fn allocate(&mut self, cells: usize, _role: BufferRole) -> Result<Vec<f32>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(cells)
            .map_err(|e| Error::init(format!("device buffer of {cells} cells: {e}")))?;
        buf.resize(cells, 0.0);
        Ok(buf)
    }

    fn upload(&mut self, host: &[f32], device: &mut Vec<f32>) -> Result<()> {
        let cap = device.len();
        let dst = device.get_mut(..host.len()).ok_or_else(|| {
            Error::execution(
                AcceleratorStatus::CapacityExceeded,
                format!("upload of {} cells into {cap}", host.len()),
            )
        })?;
        dst.copy_from_slice(host);
        Ok(())
    }

    fn launch(&mut self, launch: &StencilLaunch, input: &Vec<f32>, output: &mut Vec<f32>) -> Result<()> {
        if input.len() < launch.input.area() || output.len() < launch.output.area() {
            return Err(Error::execution(
                AcceleratorStatus::CapacityExceeded,
                format!("launch over {} / {} exceeds buffers", launch.input, launch.output),
            ));
        }
        apply_stencil(launch, input, output);
        Ok(())
    }

    fn synchronize(&mut self) -> Result<()> {
        // `apply_stencil` joins its rayon tasks before returning.
        Ok(())
    }

    fn download(&mut self, device: &Vec<f32>, host: &mut [f32]) -> Result<()> {
        let src = device.get(..host.len()).ok_or_else(|| {
            Error::execution(
                AcceleratorStatus::CapacityExceeded,
                format!("download of {} cells from {}", host.len(), device.len()),
            )
        })?;
        host.copy_from_slice(src);
        Ok(())
    }

    fn free(&mut self, buffer: Vec<f32>) {
        drop(buffer);
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

impl BlockProcessor<CpuAccelerator> {
    /// Processor on the host reference backend.
    pub fn cpu(config: &ProcessorConfig) -> Result<Self> {
        BlockProcessor::new(CpuAccelerator::new(), config)
    }
}

/// Apply `launch` to a row-major `src` tile, writing into `dst`.
///
/// Authoritative definition of the per-cell rule: for every input cell,
/// [`map_cell_with`] decides between skip, edge sentinel and operator value.
/// Output cells no input cell maps to are left untouched.
///
/// `src` must hold at least `launch.input.area()` cells and `dst` at least
/// `launch.output.area()`.
pub fn apply_stencil(launch: &StencilLaunch, src: &[f32], dst: &mut [f32]) {
    let input = launch.input;
    let output = launch.output;
    let (in_h, in_w) = (input.height(), input.width());
    let out_w = output.width();
    if out_w == 0 || output.height() == 0 {
        return;
    }
    let formula = launch.operator.stencil();
    let cell = launch.cell_size;
    let offset = launch.offset;

    dst[..output.area()]
        .par_chunks_mut(out_w)
        .enumerate()
        .for_each(|(out_row, dst_row)| {
            let row = out_row as i64 - offset.delta_row;
            if row < 0 || row >= in_h as i64 {
                return;
            }
            let row = row as usize;
            let row_base = out_row * out_w;
            for col in 0..in_w {
                match map_cell_with(offset, &input, &output, row, col) {
                    CellTarget::Skip => {}
                    CellTarget::Edge { index } => dst_row[index - row_base] = EDGE_SENTINEL,
                    CellTarget::Interior { index } => {
                        let nb = Neighborhood::gather(src, in_w, row, col);
                        dst_row[index - row_base] = formula(&nb, cell);
                    }
                }
            }
        });
}
