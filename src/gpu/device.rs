// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate adapters and select the best non-software one.
//   - Expose a `DeviceProfile` for simulating hardware limits on a
//     development machine (e.g., cap buffer sizes to match Raspberry Pi).
//   - Compute dispatch sizes for the fixed 16x16 stencil work-group.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe on WSL2 (where the software renderer appears
// as a valid device). We enumerate explicitly and prefer real hardware,
// falling back to whatever exists so headless CI boxes still work.
//
// DEVICE LIMITS:
// Under a non-Native profile we request *lower* limits than the hardware
// supports. wgpu validates every binding and dispatch against the
// requested limits, so a tile size that would not fit on the target board
// is caught at construction time on the laptop.
//
// ACCESS PATTERN:
// The stencil reads nine neighbours per cell and never shares data across
// invocations, so the kernel uses no workgroup (shared) memory at all: the
// input is bound as a read-only storage buffer and served from the
// device's regular cache hierarchy.

use std::fmt;

use crate::error::{Error, Result};
use crate::launch::{LaunchGrid, WORKGROUP_SIZE};

/// Hardware profile controlling requested device limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceProfile {
    /// Use the adapter's actual hardware limits. No artificial caps.
    #[default]
    Native,
    /// Simulate Raspberry Pi 4/5 (Broadcom VideoCore VI/VII, V3DV Vulkan).
    /// Caps invocations per work-group to 256 and storage bindings to
    /// 128 MiB.
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The GPU context: device, queue, active profile and granted limits.
///
/// # Field drop order
/// Rust drops struct fields in declaration order (top → bottom).
/// `_instance` is declared last so the `wgpu::Instance` outlives `device`
/// and `queue`. dzn (the D3D12-to-Vulkan layer on WSL2) crashes if the
/// instance goes first.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub limits: wgpu::Limits,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` on the best adapter with native limits.
    pub fn new() -> Result<Self> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    /// Create a `GpuDevice` with an explicit hardware profile.
    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });

        // Tiered selection:
        //   1. DiscreteGpu / IntegratedGpu / VirtualGpu / Other (dzn)
        //   2. anything, including Cpu (llvmpipe), with a warning
        let all_adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        if all_adapters.is_empty() {
            return Err(Error::init("no GPU adapter found"));
        }
        for a in &all_adapters {
            let info = a.get_info();
            log::info!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        let adapter = all_adapters
            .into_iter()
            .find(|a| !matches!(a.get_info().device_type, wgpu::DeviceType::Cpu))
            .or_else(|| {
                log::warn!("no hardware adapter, falling back to a software renderer");
                instance.enumerate_adapters(wgpu::Backends::PRIMARY).into_iter().next()
            })
            .ok_or_else(|| Error::init("no GPU adapter found"))?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        // Auto-detect RPi when the caller passed Native but the adapter is V3D.
        let profile = match profile {
            DeviceProfile::Native if raw_info.name.to_ascii_lowercase().contains("v3d") => {
                log::info!("V3D adapter detected, using RaspberryPi profile");
                DeviceProfile::RaspberryPi
            }
            other => other,
        };

        let limits = limits_for_profile(profile, adapter.limits());
        if WORKGROUP_SIZE.total() > limits.max_compute_invocations_per_workgroup {
            return Err(Error::init(format!(
                "work-group {}x{} exceeds device limit of {} invocations",
                WORKGROUP_SIZE.x, WORKGROUP_SIZE.y, limits.max_compute_invocations_per_workgroup
            )));
        }

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("georsgpu"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| Error::init(format!("device request failed: {e}")))?;

        device.on_uncaptured_error(Box::new(|e| {
            log::error!("uncaptured wgpu error: {e}");
        }));

        let gpu = GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            limits,
            _instance: instance,
        };
        log::info!("{gpu}");
        Ok(gpu)
    }

    /// Work-groups needed to cover a `height x width` window.
    ///
    /// The shader must guard against out-of-bounds global IDs:
    /// ```wgsl
    /// if gid.x >= width || gid.y >= height { return; }
    /// ```
    pub fn dispatch_size(&self, height: usize, width: usize) -> (u32, u32) {
        let grid = LaunchGrid::cover(height, width);
        (grid.groups_x, grid.groups_y)
    }

    /// Largest buffer, in bytes, that can be bound as one storage buffer.
    pub fn max_storage_bytes(&self) -> u64 {
        (self.limits.max_storage_buffer_binding_size as u64).min(self.limits.max_buffer_size)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {}x{} }}",
            self.adapter_info, self.profile, WORKGROUP_SIZE.x, WORKGROUP_SIZE.y
        )
    }
}

// ============================================================
// Limits helpers
// ============================================================

/// Build wgpu limits for the given profile from what the adapter offers.
fn limits_for_profile(profile: DeviceProfile, adapter: wgpu::Limits) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => adapter,

        DeviceProfile::RaspberryPi => wgpu::Limits {
            // VideoCore VI/VII: vulkaninfo reports 256 max invocations.
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            // RPi 4 shares 4 GiB with the CPU; 128 MiB per tile buffer.
            max_storage_buffer_binding_size: 128 << 20,
            max_buffer_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}
