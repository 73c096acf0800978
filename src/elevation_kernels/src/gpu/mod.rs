//! CUDA offload of the per-cell passes via CubeCL.
//!
//! Reduction, hole filling and polygon rasterization map one thread to one
//! cell and produce the same results as their CPU counterparts. Buffers are
//! uploaded per call; the live map stays host-resident.
//!
//! # Example
//!
//! ```ignore
//! use elevation_kernels::gpu::GpuRuntime;
//!
//! let runtime = GpuRuntime::new()?;
//! let filled = runtime.fill_holes(&geometry, &heights, &validity, 2)?;
//! ```

pub mod kernels;
mod runtime;

pub use runtime::{is_cuda_available, GpuRuntime, MAX_POLYGON_GRID_SIDE};
