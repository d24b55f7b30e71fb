// gpu/mod.rs — wgpu backend for the block processor.
//
// `device` owns adapter selection and limits; `stencil` implements the
// `Accelerator` trait on top of it with a single WGSL compute kernel
// specialised per operator.
//
// The CPU backend in `crate::cpu` stays the authoritative reference: every
// GPU test runs the same tile through `cpu::apply_stencil` and compares
// within a float tolerance.

pub mod device;
pub mod stencil;
