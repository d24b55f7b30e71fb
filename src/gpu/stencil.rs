// gpu/stencil.rs — wgpu accelerator for the block processor.
//
// BUFFERS
// ───────
// Each device buffer is a STORAGE buffer sized for the maximum tile. The
// output buffer carries a MAP_READ staging twin of the same size; wgpu
// cannot map a storage buffer directly, so `download` copies storage →
// staging inside one submission and then maps the staging buffer.
//
//   upload    queue.write_buffer(input)
//   launch    compute pass, grid = ceil(input / 16x16)
//   sync      device.poll(Maintain::Wait)
//   download  copy output → staging, map, memcpy, unmap
//
// PIPELINES
// ─────────
// The operator is baked into the WGSL source ({{OPERATOR}}) so each
// pipeline is specialised to one formula. Pipelines are compiled on first
// use and cached per operator; the processor resolves its operator once
// per tile, so in practice exactly one pipeline is ever built.
//
// ERRORS
// ──────
// wgpu reports most failures asynchronously through error scopes. Every
// device-touching step is wrapped in an OutOfMemory + Validation scope and
// the popped error is mapped onto `AcceleratorStatus`.

use std::collections::HashMap;

use crate::block::{Accelerator, BlockProcessor, BufferRole};
use crate::config::ProcessorConfig;
use crate::error::{AcceleratorStatus, Error, Result};
use crate::gpu::device::GpuDevice;
use crate::launch::StencilLaunch;
use crate::operator::Operator;

const CELL_BYTES: u64 = std::mem::size_of::<f32>() as u64;

// ---------------------------------------------------------------------------
// Uniform params (must match WGSL struct StencilParams exactly)
// ---------------------------------------------------------------------------

/// Per-tile parameters, 32 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct StencilParams {
    in_height: u32,
    in_width: u32,
    out_height: u32,
    out_width: u32,
    delta_row: i32,
    delta_col: i32,
    cell_x: f32,
    cell_y: f32,
}

impl StencilParams {
    fn from_launch(launch: &StencilLaunch) -> Result<Self> {
        let narrow = |v: usize| {
            u32::try_from(v).map_err(|_| {
                Error::execution(AcceleratorStatus::Validation, format!("dimension {v} exceeds u32"))
            })
        };
        let narrow_i = |v: i64| {
            i32::try_from(v).map_err(|_| {
                Error::execution(AcceleratorStatus::Validation, format!("offset {v} exceeds i32"))
            })
        };
        Ok(StencilParams {
            in_height: narrow(launch.input.height())?,
            in_width: narrow(launch.input.width())?,
            out_height: narrow(launch.output.height())?,
            out_width: narrow(launch.output.width())?,
            delta_row: narrow_i(launch.offset.delta_row)?,
            delta_col: narrow_i(launch.offset.delta_col)?,
            cell_x: launch.cell_size.x,
            cell_y: launch.cell_size.y,
        })
    }
}

// ---------------------------------------------------------------------------
// WgpuBuffer
// ---------------------------------------------------------------------------

/// A device-resident tile buffer.
pub struct WgpuBuffer {
    storage: wgpu::Buffer,
    /// MAP_READ twin, output buffers only.
    readback: Option<wgpu::Buffer>,
    cells: usize,
}

// ---------------------------------------------------------------------------
// WgpuAccelerator
// ---------------------------------------------------------------------------

/// Runs the stencil kernel on a wgpu device.
pub struct WgpuAccelerator {
    gpu: GpuDevice,
    bgl: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<Operator, wgpu::ComputePipeline>,
    params: wgpu::Buffer,
    released: bool,
}

impl WgpuAccelerator {
    pub fn new(gpu: GpuDevice) -> Self {
        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stencil BGL"),
            entries: &[
                // 0: input tile (read-only storage)
                storage_entry(0, true),
                // 1: output tile
                storage_entry(1, false),
                // 2: params uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stencil pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let params = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("StencilParams"),
            size: std::mem::size_of::<StencilParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        WgpuAccelerator {
            gpu,
            bgl,
            pipeline_layout,
            pipelines: HashMap::new(),
            params,
            released: false,
        }
    }

    /// Compile (or fetch) the pipeline specialised for `operator`.
    fn pipeline(&mut self, operator: Operator) -> Result<&wgpu::ComputePipeline> {
        if !self.pipelines.contains_key(&operator) {
            let src = shader_source(operator);
            let gpu = &self.gpu;
            let layout = &self.pipeline_layout;
            let pipeline = scoped(gpu, || {
                let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("stencil.wgsl"),
                    source: wgpu::ShaderSource::Wgsl(src.into()),
                });
                gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("apply_stencil"),
                    layout: Some(layout),
                    module: &module,
                    entry_point: "apply_stencil",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
            })
            .map_err(|e| execution_error("pipeline compilation", &e))?;
            log::debug!("compiled stencil pipeline for {operator}");
            self.pipelines.insert(operator, pipeline);
        }
        self.pipelines.get(&operator).ok_or_else(|| {
            Error::execution(AcceleratorStatus::Internal, "pipeline cache miss")
        })
    }

    fn check_live(&self) -> Result<()> {
        if self.released {
            return Err(Error::execution(AcceleratorStatus::Released, "device already reset"));
        }
        Ok(())
    }
}

impl Accelerator for WgpuAccelerator {
    type Buffer = WgpuBuffer;

    fn describe(&self) -> String {
        self.gpu.adapter_info.to_string()
    }

    fn allocate(&mut self, cells: usize, role: BufferRole) -> Result<WgpuBuffer> {
        let size = cells as u64 * CELL_BYTES;
        let max = self.gpu.max_storage_bytes();
        if size > max {
            return Err(Error::init(format!(
                "tile buffer of {size} bytes exceeds the device storage limit of {max} bytes \
                 ({} profile)",
                self.gpu.profile
            )));
        }

        let gpu = &self.gpu;
        let (storage, readback) = scoped(gpu, || {
            let storage = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(match role {
                    BufferRole::Input => "tile input",
                    BufferRole::Output => "tile output",
                }),
                size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            let readback = (role == BufferRole::Output).then(|| {
                gpu.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("tile output readback"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            });
            (storage, readback)
        })
        .map_err(|e| Error::init(format!("allocating {size} bytes: {e}")))?;

        log::debug!("allocated {role:?} buffer: {cells} cells");
        Ok(WgpuBuffer { storage, readback, cells })
    }

    fn upload(&mut self, host: &[f32], device: &mut WgpuBuffer) -> Result<()> {
        self.check_live()?;
        if host.len() > device.cells {
            return Err(Error::execution(
                AcceleratorStatus::CapacityExceeded,
                format!("upload of {} cells into {}", host.len(), device.cells),
            ));
        }
        let gpu = &self.gpu;
        scoped(gpu, || {
            gpu.queue.write_buffer(&device.storage, 0, bytemuck::cast_slice(host));
        })
        .map_err(|e| execution_error("upload", &e))
    }

    fn launch(
        &mut self,
        launch: &StencilLaunch,
        input: &WgpuBuffer,
        output: &mut WgpuBuffer,
    ) -> Result<()> {
        self.check_live()?;
        let params = StencilParams::from_launch(launch)?;
        // Pipeline lookup needs &mut self; bind everything else afterwards.
        self.pipeline(launch.operator)?;
        let pipeline = self.pipelines.get(&launch.operator).ok_or_else(|| {
            Error::execution(AcceleratorStatus::Internal, "pipeline cache miss")
        })?;
        let gpu = &self.gpu;

        scoped(gpu, || {
            gpu.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("stencil BG"),
                layout: &self.bgl,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: input.storage.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: output.storage.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: self.params.as_entire_binding() },
                ],
            });

            let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stencil dispatch"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("apply_stencil"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(launch.grid.groups_x, launch.grid.groups_y, 1);
            }
            gpu.queue.submit(std::iter::once(encoder.finish()));
        })
        .map_err(|e| execution_error("kernel launch", &e))
    }

    fn synchronize(&mut self) -> Result<()> {
        self.check_live()?;
        let gpu = &self.gpu;
        scoped(gpu, || {
            gpu.device.poll(wgpu::Maintain::Wait);
        })
        .map_err(|e| execution_error("synchronize", &e))
    }

    fn download(&mut self, device: &WgpuBuffer, host: &mut [f32]) -> Result<()> {
        self.check_live()?;
        if host.is_empty() {
            return Ok(());
        }
        if host.len() > device.cells {
            return Err(Error::execution(
                AcceleratorStatus::CapacityExceeded,
                format!("download of {} cells from {}", host.len(), device.cells),
            ));
        }
        let readback = device.readback.as_ref().ok_or_else(|| {
            Error::execution(AcceleratorStatus::Validation, "download from an input buffer")
        })?;
        let bytes = host.len() as u64 * CELL_BYTES;
        let gpu = &self.gpu;

        scoped(gpu, || {
            let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tile readback"),
            });
            encoder.copy_buffer_to_buffer(&device.storage, 0, readback, 0, bytes);
            gpu.queue.submit(std::iter::once(encoder.finish()));
        })
        .map_err(|e| execution_error("readback copy", &e))?;

        let slice = readback.slice(..bytes);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            // The receiver outlives the poll below; a send failure means the
            // caller already bailed out.
            let _ = tx.send(r);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| Error::execution(AcceleratorStatus::MapFailed, "map callback never fired"))?
            .map_err(|e| Error::execution(AcceleratorStatus::MapFailed, e.to_string()))?;

        {
            let mapped = slice.get_mapped_range();
            let cells: &[f32] = bytemuck::cast_slice(&mapped);
            host.copy_from_slice(cells);
        }
        readback.unmap();
        Ok(())
    }

    fn free(&mut self, buffer: WgpuBuffer) {
        buffer.storage.destroy();
        if let Some(readback) = buffer.readback {
            readback.destroy();
        }
    }

    fn reset(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.pipelines.clear();
        self.params.destroy();
        self.gpu.device.poll(wgpu::Maintain::Wait);
        self.gpu.device.destroy();
        log::debug!("device {} reset", self.gpu.adapter_info);
        Ok(())
    }
}

impl BlockProcessor<WgpuAccelerator> {
    /// Processor on the best available GPU, using `config.profile` limits.
    pub fn gpu(config: &ProcessorConfig) -> Result<Self> {
        config.validate()?;
        let gpu = GpuDevice::new_with_profile(config.profile)?;
        BlockProcessor::new(WgpuAccelerator::new(gpu), config)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// WGSL source specialised for one operator and the fixed work-group.
///
/// naga does not accept `override` expressions inside `@workgroup_size()`,
/// so the constants are substituted textually.
fn shader_source(operator: Operator) -> String {
    let wg = crate::launch::WORKGROUP_SIZE;
    include_str!("../shaders/stencil.wgsl")
        .replace("{{WG_X}}", &wg.x.to_string())
        .replace("{{WG_Y}}", &wg.y.to_string())
        .replace("{{OPERATOR}}", &operator.kernel_id().to_string())
}

/// Run `f` inside OutOfMemory + Validation error scopes.
fn scoped<T>(gpu: &GpuDevice, f: impl FnOnce() -> T) -> std::result::Result<T, wgpu::Error> {
    gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let out = f();
    let validation = pollster::block_on(gpu.device.pop_error_scope());
    let oom = pollster::block_on(gpu.device.pop_error_scope());
    match validation.or(oom) {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

fn status_of(err: &wgpu::Error) -> AcceleratorStatus {
    match err {
        wgpu::Error::OutOfMemory { .. } => AcceleratorStatus::OutOfMemory,
        wgpu::Error::Validation { .. } => AcceleratorStatus::Validation,
        #[allow(unreachable_patterns)]
        _ => AcceleratorStatus::Internal,
    }
}

fn execution_error(step: &str, err: &wgpu::Error) -> Error {
    Error::execution(status_of(err), format!("{step}: {err}"))
}
