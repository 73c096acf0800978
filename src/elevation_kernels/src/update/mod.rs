//! Per-frame map update kernels.
//!
//! A sensor frame flows through three data-parallel passes:
//!
//! ```text
//! points ──► fuse_sensor_points ──► accumulator (atomic sums)
//!                 │                  live map (outlier variance, validity)
//!                 ▼
//!        count_residual_errors ──► ResidualStats, accumulator traversability (optional)
//!                 ▼
//!        reduce_accumulator ──► live map (one task per cell)
//! ```
//!
//! Point passes scatter into shared cells with atomic adds, so the final sums
//! do not depend on task order. The reduction owns one cell per task and
//! needs no atomics beyond plain stores.
//!
//! The caller zeroes the accumulator (and the residual stats) before each
//! frame; [`crate::ElevationMap::update`] does this for you.

mod fusion;
mod reduce;
mod residual;

pub use fusion::{fuse_sensor_points, FusionStats};
pub use reduce::{reduce_accumulator, ReductionStats};
pub use residual::{count_residual_errors, ResidualStats};

use crate::config::ElevationMapConfig;
use crate::grid::{sensor_noise, GridGeometry};
use crate::pose::SensorPose;

/// A sensor point after transformation into the map frame.
#[derive(Debug, Clone, Copy)]
struct ProjectedPoint {
    /// Flat cell index.
    idx: usize,
    /// Map-frame height.
    z: f32,
    /// Measurement variance from the range model.
    variance: f32,
}

#[inline]
fn project_point(
    config: &ElevationMapConfig,
    geometry: &GridGeometry,
    pose: &SensorPose,
    point: &[f32; 3],
    center_x: f32,
    center_y: f32,
) -> ProjectedPoint {
    let [x, y, z] = pose.transform(point);
    ProjectedPoint {
        idx: geometry.clamped_index(x, y, center_x, center_y),
        z,
        variance: sensor_noise(config.sensor_noise_factor, point[2]),
    }
}
