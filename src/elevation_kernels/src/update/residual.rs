//! Residual counting kernel: estimate map drift from well-supported cells.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;
use tracing::debug;

use super::project_point;
use crate::config::ElevationMapConfig;
use crate::grid::{AtomicF32, ElevationLayers, Layer};
use crate::pose::SensorPose;

/// Global residual accumulators for one frame.
///
/// Owned and reset by the caller; [`count_residual_errors`] only adds.
#[derive(Debug, Default)]
pub struct ResidualStats {
    error_sum: AtomicF32,
    error_count: AtomicU32,
}

impl ResidualStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.error_sum.store(0.0);
        self.error_count.store(0, Ordering::Relaxed);
    }

    /// Sum of signed residuals `z - map_height`.
    pub fn error_sum(&self) -> f32 {
        self.error_sum.load()
    }

    /// Number of residuals added.
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Mean residual, or `None` when nothing was counted.
    pub fn mean(&self) -> Option<f32> {
        match self.error_count() {
            0 => None,
            n => Some(self.error_sum() / n as f32),
        }
    }

    fn add(&self, error: f32) {
        self.error_sum.fetch_add(error);
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Accumulate height residuals of points hitting confident cells.
///
/// A point contributes when it is a strict inlier
/// (`|map_h - z| < map_v * mahalanobis_threshold`), its cell variance is
/// below `outlier_variance / 2`, and the cell's live traversability count is
/// below `traversability_inlier_threshold`. Each contribution adds
/// `z - map_h` to `stats`, bumps the global count, and adds one to the
/// accumulator's traversability layer at that cell.
///
/// The mean residual `error_sum / error_count` is a drift estimate the caller
/// can use to correct the map height. Returns the number of contributing points.
#[allow(clippy::too_many_arguments)]
pub fn count_residual_errors(
    config: &ElevationMapConfig,
    live_map: &ElevationLayers,
    points: &[[f32; 3]],
    pose: &SensorPose,
    center_x: f32,
    center_y: f32,
    accumulator: &mut ElevationLayers,
    stats: &mut ResidualStats,
) -> usize {
    let geometry = config.geometry();
    let accumulator = &*accumulator;
    let stats = &*stats;
    let variance_limit = config.outlier_variance / 2.0;

    let counted = points
        .par_iter()
        .filter(|point| {
            let p = project_point(config, &geometry, pose, point, center_x, center_y);
            let map_h = live_map.get(Layer::Height, p.idx);
            let map_v = live_map.get(Layer::Variance, p.idx);
            let map_t = live_map.get(Layer::Traversability, p.idx);

            let confident = (map_h - p.z).abs() < map_v * config.mahalanobis_threshold
                && map_v < variance_limit
                && map_t < config.traversability_inlier_threshold;
            if confident {
                stats.add(p.z - map_h);
                accumulator.add(Layer::Traversability, p.idx, 1.0);
            }
            confident
        })
        .count();

    debug!(
        points = points.len(),
        counted,
        mean_residual = ?stats.mean(),
        "counted residual errors"
    );
    counted
}
