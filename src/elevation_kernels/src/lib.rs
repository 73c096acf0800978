//! Data-parallel kernels for a robot-centered elevation map.
//!
//! The map is a fixed grid of cells, each holding a height estimate, its
//! variance, a validity flag and a traversability counter. The grid follows
//! the robot: every kernel takes the current grid center and maps world
//! coordinates to clamped cells.
//!
//! # Kernels
//!
//! - [`fuse_sensor_points`]: inverse-variance fusion with Mahalanobis outlier
//!   rejection, scattered into an accumulator with lock-free float atomics
//! - [`count_residual_errors`]: height residuals against confident cells
//! - [`reduce_accumulator`]: one task per cell commits or resets the live map
//! - [`fill_holes`]: fill invalid cells from a nearby valid one
//! - [`rasterize_polygon`]: point-in-polygon mask with exact integer predicates
//!
//! All passes run on rayon. With the `cuda` feature the per-cell passes can
//! also run on the GPU through CubeCL (see [`gpu`]).
//!
//! # Usage
//!
//! ```ignore
//! use elevation_kernels::{ElevationMap, SensorPose, UpdateOptions};
//!
//! let mut map = ElevationMap::builder().resolution(0.04).size(200).build()?;
//! let pose = SensorPose::from_translation([0.0, 0.0, 0.5]);
//! let result = map.update(&points, &pose, robot_x, robot_y, UpdateOptions::default())?;
//! let filled = map.fill_holes();
//! ```

pub mod config;
pub mod error;
pub mod filtering;
pub mod grid;
pub mod map;
pub mod polygon;
pub mod pose;
pub mod test_utils;
pub mod timing;
pub mod update;

#[cfg(feature = "cuda")]
pub mod gpu;

pub use config::ElevationMapConfig;
pub use error::MapError;
pub use filtering::fill_holes;
pub use grid::{AtomicF32, ElevationLayers, GridGeometry, Layer};
pub use polygon::{rasterize_polygon, Polygon};
pub use pose::SensorPose;
pub use timing::FrameTiming;
pub use update::{
    count_residual_errors, fuse_sensor_points, reduce_accumulator, FusionStats, ReductionStats,
    ResidualStats,
};

// High-level API (recommended for most users)
pub use map::{ElevationMap, ElevationMapBuilder, UpdateOptions, UpdateResult};

/// `println!` that only prints with the `test-verbose` feature.
#[macro_export]
macro_rules! test_println {
    ($($arg:tt)*) => {
        #[cfg(feature = "test-verbose")]
        println!($($arg)*);
    };
}
