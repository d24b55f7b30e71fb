// block.rs — the tiled block-processing engine.
//
// A `BlockProcessor` owns four buffers of identical capacity
// (max_tile_height * max_tile_width cells):
//
//   host input  ──upload──▶  device input
//                               │ stencil launch
//   host output ◀─download──  device output
//
// They are allocated once at construction and released once at teardown.
// Between the two, the caller repeatedly fills `input_mut()`, calls
// `process_tile()` and reads `output()`. Each call is fully synchronous:
// transfer, launch, wait, transfer back, wait.
//
// The device side is abstracted behind `Accelerator`. `cpu::CpuAccelerator`
// is the reference backend (unified memory, transfers are copies);
// `gpu::stencil::WgpuAccelerator` runs the WGSL kernel. The control flow
// below is shared by both and never branches on the operator.

use crate::config::ProcessorConfig;
use crate::error::{AcceleratorStatus, Error, Result};
use crate::launch::StencilLaunch;
use crate::operator::OperatorSelection;
use crate::rect::TileRect;
use crate::stencil::CellSize;

// ---------------------------------------------------------------------------
// Accelerator seam
// ---------------------------------------------------------------------------

/// Which side of the stencil a device buffer sits on. Backends may use it to
/// pick usage flags (e.g. only the output needs a readback path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    Input,
    Output,
}

/// Device-side operations the engine needs.
///
/// Errors from `allocate` are reported as [`Error::AcceleratorInit`]; all
/// other fallible methods report [`Error::AcceleratorExecution`].
pub trait Accelerator {
    /// A device-resident buffer of `f32` cells.
    type Buffer;

    /// Human-readable backend / device description for logs.
    fn describe(&self) -> String;

    fn allocate(&mut self, cells: usize, role: BufferRole) -> Result<Self::Buffer>;

    /// Copy `host` into the start of `device`.
    fn upload(&mut self, host: &[f32], device: &mut Self::Buffer) -> Result<()>;

    /// Run the stencil over `launch.input`, reading `input`, writing `output`.
    fn launch(
        &mut self,
        launch: &StencilLaunch,
        input: &Self::Buffer,
        output: &mut Self::Buffer,
    ) -> Result<()>;

    /// Block until all submitted work has finished.
    fn synchronize(&mut self) -> Result<()>;

    /// Copy the first `host.len()` cells of `device` into `host`.
    fn download(&mut self, device: &Self::Buffer, host: &mut [f32]) -> Result<()>;

    fn free(&mut self, buffer: Self::Buffer);

    /// Reset device state. Called once, after every buffer has been freed.
    fn reset(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// BlockProcessor
// ---------------------------------------------------------------------------

struct DeviceBuffers<B> {
    input: B,
    output: B,
}

/// Fixed-capacity tile processor. See the module docs for the lifecycle.
pub struct BlockProcessor<A: Accelerator> {
    accelerator: A,
    selection: OperatorSelection,
    cell_size: CellSize,
    max_tile_height: usize,
    max_tile_width: usize,
    host_input: Vec<f32>,
    host_output: Vec<f32>,
    /// `None` once released.
    device: Option<DeviceBuffers<A::Buffer>>,
}

impl<A: Accelerator> BlockProcessor<A> {
    /// Validate `config` and allocate all four buffers on `accelerator`.
    ///
    /// On failure every buffer allocated so far is freed and the device is
    /// reset; no partially usable processor is returned.
    pub fn new(mut accelerator: A, config: &ProcessorConfig) -> Result<Self> {
        config.validate()?;
        let capacity = config.capacity();

        let device = match allocate_pair(&mut accelerator, capacity) {
            Ok(pair) => pair,
            Err(e) => {
                if let Err(reset_err) = accelerator.reset() {
                    log::warn!("device reset after failed construction: {reset_err}");
                }
                return Err(e);
            }
        };

        let host = alloc_host(capacity).and_then(|input| Ok((input, alloc_host(capacity)?)));
        let (host_input, host_output) = match host {
            Ok(pair) => pair,
            Err(e) => {
                accelerator.free(device.input);
                accelerator.free(device.output);
                if let Err(reset_err) = accelerator.reset() {
                    log::warn!("device reset after failed construction: {reset_err}");
                }
                return Err(e);
            }
        };

        log::info!(
            "block processor ready: {} on {}, max tile {}x{} ({} bytes per buffer)",
            config.operator,
            accelerator.describe(),
            config.max_tile_height,
            config.max_tile_width,
            capacity * std::mem::size_of::<f32>(),
        );

        Ok(BlockProcessor {
            accelerator,
            selection: config.operator.clone(),
            cell_size: config.cell_size,
            max_tile_height: config.max_tile_height,
            max_tile_width: config.max_tile_width,
            host_input,
            host_output,
            device: Some(device),
        })
    }

    /// Host input buffer, full capacity. Fill the first
    /// `input.height() * input.width()` cells row-major before
    /// [`process_tile`](Self::process_tile).
    pub fn input_mut(&mut self) -> &mut [f32] {
        &mut self.host_input
    }

    /// Host output buffer, full capacity. After a successful
    /// `process_tile(_, output)` the first `output.area()` cells hold the
    /// result row-major; anything beyond is stale.
    pub fn output(&self) -> &[f32] {
        &self.host_output
    }

    /// The output window's cells from the last call.
    pub fn output_tile(&self, output: &TileRect) -> &[f32] {
        &self.host_output[..output.area().min(self.host_output.len())]
    }

    /// Run the configured operator over one tile.
    ///
    /// The operator selection is resolved first, so an unsupported selection
    /// fails before any transfer or launch.
    pub fn process_tile(&mut self, input: &TileRect, output: &TileRect) -> Result<()> {
        let operator = self.selection.resolve()?;

        let device = self.device.as_mut().ok_or_else(|| {
            Error::execution(AcceleratorStatus::Released, "process_tile after release")
        })?;

        if input.height() > self.max_tile_height
            || input.width() > self.max_tile_width
            || output.area() > self.host_output.len()
        {
            return Err(Error::execution(
                AcceleratorStatus::CapacityExceeded,
                format!(
                    "input {input} / output {output} exceeds capacity {}x{}",
                    self.max_tile_height, self.max_tile_width
                ),
            ));
        }
        if input.is_empty() || output.is_empty() {
            log::trace!("empty tile {input} -> {output}, nothing to do");
            return Ok(());
        }

        let launch = StencilLaunch::new(operator, *input, *output, self.cell_size);
        log::trace!(
            "tile {input} -> {output}: delta ({}, {}), grid {}x{}",
            launch.offset.delta_row,
            launch.offset.delta_col,
            launch.grid.groups_x,
            launch.grid.groups_y,
        );

        self.accelerator.upload(&self.host_input[..input.area()], &mut device.input)?;
        self.accelerator.launch(&launch, &device.input, &mut device.output)?;
        self.accelerator.synchronize()?;
        self.accelerator
            .download(&device.output, &mut self.host_output[..output.area()])?;
        self.accelerator.synchronize()
    }

    /// Free all four buffers and reset the device.
    ///
    /// Idempotent. Failures are logged, never returned.
    pub fn release(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };
        self.accelerator.free(device.input);
        self.accelerator.free(device.output);
        if let Err(e) = self.accelerator.reset() {
            log::warn!("device reset during teardown failed: {e}");
        }
        self.host_input = Vec::new();
        self.host_output = Vec::new();
        log::debug!("block processor released");
    }

    pub fn is_released(&self) -> bool {
        self.device.is_none()
    }

    pub fn operator(&self) -> &OperatorSelection {
        &self.selection
    }

    pub fn cell_size(&self) -> CellSize {
        self.cell_size
    }

    /// `(max_tile_height, max_tile_width)`.
    pub fn max_tile_size(&self) -> (usize, usize) {
        (self.max_tile_height, self.max_tile_width)
    }

    /// Cells per buffer.
    pub fn capacity(&self) -> usize {
        self.max_tile_height * self.max_tile_width
    }
}

impl<A: Accelerator> Drop for BlockProcessor<A> {
    fn drop(&mut self) {
        self.release();
    }
}

fn allocate_pair<A: Accelerator>(
    accelerator: &mut A,
    capacity: usize,
) -> Result<DeviceBuffers<A::Buffer>> {
    let input = accelerator.allocate(capacity, BufferRole::Input)?;
    match accelerator.allocate(capacity, BufferRole::Output) {
        Ok(output) => Ok(DeviceBuffers { input, output }),
        Err(e) => {
            accelerator.free(input);
            Err(e)
        }
    }
}

fn alloc_host(cells: usize) -> Result<Vec<f32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(cells)
        .map_err(|e| Error::init(format!("host buffer of {cells} cells: {e}")))?;
    buf.resize(cells, 0.0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{Command, Operator};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every call so the lifecycle can be checked without a device.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        live_buffers: i32,
        fail_alloc_at: Option<usize>,
        allocs: usize,
        fail_upload_at: Option<usize>,
        uploads: usize,
        fail_launch_at: Option<usize>,
        launches: usize,
    }

    struct FakeAccelerator(Rc<RefCell<Recorder>>);

    impl Accelerator for FakeAccelerator {
        type Buffer = Vec<f32>;

        fn describe(&self) -> String {
            "fake".into()
        }

        fn allocate(&mut self, cells: usize, role: BufferRole) -> Result<Vec<f32>> {
            let mut r = self.0.borrow_mut();
            r.allocs += 1;
            if r.fail_alloc_at == Some(r.allocs) {
                return Err(Error::init("simulated allocation failure"));
            }
            r.calls.push(format!("allocate {role:?}"));
            r.live_buffers += 1;
            Ok(vec![0.0; cells])
        }

        fn upload(&mut self, host: &[f32], device: &mut Vec<f32>) -> Result<()> {
            let mut r = self.0.borrow_mut();
            r.uploads += 1;
            if r.fail_upload_at == Some(r.uploads) {
                return Err(Error::execution(AcceleratorStatus::OutOfMemory, "simulated upload failure"));
            }
            r.calls.push("upload".into());
            device[..host.len()].copy_from_slice(host);
            Ok(())
        }

        fn launch(&mut self, launch: &StencilLaunch, input: &Vec<f32>, output: &mut Vec<f32>) -> Result<()> {
            let mut r = self.0.borrow_mut();
            r.launches += 1;
            if r.fail_launch_at == Some(r.launches) {
                return Err(Error::execution(AcceleratorStatus::Validation, "simulated launch failure"));
            }
            r.calls.push(format!("launch {}", launch.operator));
            crate::cpu::apply_stencil(launch, input, output);
            Ok(())
        }

        fn synchronize(&mut self) -> Result<()> {
            self.0.borrow_mut().calls.push("sync".into());
            Ok(())
        }

        fn download(&mut self, device: &Vec<f32>, host: &mut [f32]) -> Result<()> {
            self.0.borrow_mut().calls.push("download".into());
            host.copy_from_slice(&device[..host.len()]);
            Ok(())
        }

        fn free(&mut self, _buffer: Vec<f32>) {
            let mut r = self.0.borrow_mut();
            r.calls.push("free".into());
            r.live_buffers -= 1;
        }

        fn reset(&mut self) -> Result<()> {
            self.0.borrow_mut().calls.push("reset".into());
            Ok(())
        }
    }

    fn fake() -> (FakeAccelerator, Rc<RefCell<Recorder>>) {
        let rec = Rc::new(RefCell::new(Recorder::default()));
        (FakeAccelerator(rec.clone()), rec)
    }

    #[test]
    fn test_lifecycle_order() {
        let (acc, rec) = fake();
        let cfg = ProcessorConfig::new(Command::Slope, 8, 8);
        let mut bp = BlockProcessor::new(acc, &cfg).unwrap();
        assert_eq!(bp.capacity(), 64);
        assert_eq!(bp.input_mut().len(), 64);

        let rect = TileRect::new(0, 0, 4, 4);
        bp.process_tile(&rect, &rect).unwrap();
        drop(bp);

        let r = rec.borrow();
        assert_eq!(
            r.calls,
            [
                "allocate Input",
                "allocate Output",
                "upload",
                "launch slope (burrough)",
                "sync",
                "download",
                "sync",
                "free",
                "free",
                "reset",
            ]
        );
        assert_eq!(r.live_buffers, 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (acc, rec) = fake();
        let mut bp = BlockProcessor::new(acc, &ProcessorConfig::new(Command::Aspect, 4, 4)).unwrap();
        bp.release();
        bp.release();
        assert!(bp.is_released());
        drop(bp);
        let r = rec.borrow();
        assert_eq!(r.calls.iter().filter(|c| *c == "reset").count(), 1);
        assert_eq!(r.live_buffers, 0);
    }

    #[test]
    fn test_failed_second_allocation_frees_first() {
        let (acc, rec) = fake();
        rec.borrow_mut().fail_alloc_at = Some(2);
        let err = BlockProcessor::new(acc, &ProcessorConfig::new(Command::Slope, 4, 4))
            .err()
            .expect("construction must fail");
        assert!(matches!(err, Error::AcceleratorInit { .. }));
        let r = rec.borrow();
        assert_eq!(r.live_buffers, 0);
        assert_eq!(r.calls.last().map(String::as_str), Some("reset"));
    }

    #[test]
    fn test_invalid_config_touches_nothing() {
        let (acc, rec) = fake();
        let cfg = ProcessorConfig::new(Command::Slope, 4, 4).with_cell_size(0.0, 1.0);
        assert!(matches!(BlockProcessor::new(acc, &cfg), Err(Error::InvalidConfig(_))));
        assert!(rec.borrow().calls.is_empty());
    }

    #[test]
    fn test_unsupported_selection_before_device_work() {
        let (acc, rec) = fake();
        let cfg = ProcessorConfig::new(
            OperatorSelection::with_algorithm(Command::Slope, "quadratic"),
            4,
            4,
        );
        let mut bp = BlockProcessor::new(acc, &cfg).unwrap();
        let rect = TileRect::new(0, 0, 3, 3);
        let err = bp.process_tile(&rect, &rect).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation { .. }));
        let r = rec.borrow();
        assert!(!r.calls.iter().any(|c| c == "upload" || c.starts_with("launch")));
    }

    #[test]
    fn test_oversized_tile_rejected() {
        let (acc, rec) = fake();
        let mut bp =
            BlockProcessor::new(acc, &ProcessorConfig::new(Operator::Hillshade, 4, 6)).unwrap();
        // Same area as capacity, but taller than the maximum.
        let tall = TileRect::new(0, 0, 6, 4);
        let err = bp.process_tile(&tall, &tall).unwrap_err();
        assert!(matches!(
            err,
            Error::AcceleratorExecution { status: AcceleratorStatus::CapacityExceeded, .. }
        ));
        assert!(!rec.borrow().calls.iter().any(|c| c == "upload"));

        // Exactly at the bounds succeeds.
        let full = TileRect::new(0, 0, 4, 6);
        bp.process_tile(&full, &full).unwrap();
    }

    #[test]
    fn test_process_after_release_fails() {
        let (acc, _rec) = fake();
        let mut bp = BlockProcessor::new(acc, &ProcessorConfig::new(Command::Slope, 4, 4)).unwrap();
        bp.release();
        let rect = TileRect::new(0, 0, 3, 3);
        let err = bp.process_tile(&rect, &rect).unwrap_err();
        assert!(matches!(
            err,
            Error::AcceleratorExecution { status: AcceleratorStatus::Released, .. }
        ));
    }

    #[test]
    fn test_execution_failure_aborts_tile_only() {
        let (acc, rec) = fake();
        rec.borrow_mut().fail_upload_at = Some(1);
        rec.borrow_mut().fail_launch_at = Some(1);
        let mut bp = BlockProcessor::new(acc, &ProcessorConfig::new(Command::Slope, 4, 4)).unwrap();
        let rect = TileRect::new(0, 0, 4, 4);

        // Upload fails: status passes through, nothing else runs.
        match bp.process_tile(&rect, &rect).unwrap_err() {
            Error::AcceleratorExecution { status, description } => {
                assert_eq!(status, AcceleratorStatus::OutOfMemory);
                assert_eq!(description, "simulated upload failure");
            }
            other => panic!("unexpected error {other}"),
        }
        // Launch fails on the next tile: no sync, no download.
        match bp.process_tile(&rect, &rect).unwrap_err() {
            Error::AcceleratorExecution { status, .. } => {
                assert_eq!(status, AcceleratorStatus::Validation)
            }
            other => panic!("unexpected error {other}"),
        }
        {
            let r = rec.borrow();
            assert!(!r.calls.iter().any(|c| c == "download" || c == "sync"));
            assert_eq!(r.calls.iter().filter(|c| *c == "upload").count(), 1);
        }

        // The processor stays usable.
        assert!(!bp.is_released());
        bp.input_mut()[..16].fill(5.0);
        bp.process_tile(&rect, &rect).unwrap();
        assert!(rec.borrow().calls.iter().any(|c| c == "download"));

        bp.release();
        let r = rec.borrow();
        assert_eq!(r.calls.iter().filter(|c| *c == "free").count(), 2);
        assert_eq!(r.calls.iter().filter(|c| *c == "reset").count(), 1);
        assert_eq!(r.live_buffers, 0);
    }
}
