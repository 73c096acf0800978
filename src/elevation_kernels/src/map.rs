//! High-level elevation map API.
//!
//! [`ElevationMap`] owns the live map, the per-frame accumulator and the
//! residual statistics, and sequences the kernels for one sensor frame:
//!
//! ```ignore
//! use elevation_kernels::{ElevationMap, SensorPose, UpdateOptions};
//!
//! let mut map = ElevationMap::builder()
//!     .resolution(0.05)
//!     .size(200)
//!     .build()?;
//!
//! let result = map.update(&points, &SensorPose::identity(), 0.0, 0.0, UpdateOptions::default())?;
//! println!("fused {} points, drift {:?}", result.fusion.inliers, result.mean_residual);
//!
//! let filled = map.fill_holes();
//! ```
//!
//! How often frames are fed and whether the map persists between runs is
//! left to the caller.

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::config::ElevationMapConfig;
use crate::filtering;
use crate::grid::{ElevationLayers, GridGeometry, Layer};
use crate::polygon::{self, Polygon};
use crate::pose::SensorPose;
use crate::time_kernel;
use crate::timing::{FrameTiming, Timer};
use crate::update::{
    count_residual_errors, fuse_sensor_points, reduce_accumulator, FusionStats, ReductionStats,
    ResidualStats,
};

#[cfg(feature = "cuda")]
use crate::gpu::{is_cuda_available, GpuRuntime};

/// Builder for [`ElevationMap`].
#[derive(Debug, Clone)]
pub struct ElevationMapBuilder {
    config: ElevationMapConfig,
}

impl ElevationMapBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ElevationMapConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ElevationMapConfig) -> Self {
        Self { config }
    }

    /// Set cell side length in meters.
    pub fn resolution(mut self, resolution: f32) -> Self {
        self.config.resolution = resolution;
        self
    }

    /// Set the number of cells per side (grids are square).
    pub fn size(mut self, cells: usize) -> Self {
        self.config.width = cells;
        self.config.height = cells;
        self
    }

    pub fn sensor_noise_factor(mut self, factor: f32) -> Self {
        self.config.sensor_noise_factor = factor;
        self
    }

    pub fn mahalanobis_threshold(mut self, threshold: f32) -> Self {
        self.config.mahalanobis_threshold = threshold;
        self
    }

    pub fn outlier_variance(mut self, variance: f32) -> Self {
        self.config.outlier_variance = variance;
        self
    }

    /// Configure edge shaping: discard low points under cells with more than
    /// `wall_num_threshold` confident hits this frame.
    ///
    /// Hits are counted by residual counting, so shaping needs
    /// [`UpdateOptions::count_residuals`] on the frames it should apply to.
    pub fn edge_shaping(mut self, enabled: bool, wall_num_threshold: f32) -> Self {
        self.config.edge_shaped_enabled = enabled;
        self.config.wall_num_threshold = wall_num_threshold;
        self
    }

    pub fn traversability_inlier_threshold(mut self, threshold: f32) -> Self {
        self.config.traversability_inlier_threshold = threshold;
        self
    }

    pub fn max_variance(mut self, variance: f32) -> Self {
        self.config.max_variance = variance;
        self
    }

    pub fn initial_variance(mut self, variance: f32) -> Self {
        self.config.initial_variance = variance;
        self
    }

    pub fn dilation_size(mut self, cells: usize) -> Self {
        self.config.dilation_size = cells;
        self
    }

    /// Enable GPU acceleration for the per-cell passes.
    ///
    /// Ignored without the `cuda` feature or a device.
    pub fn use_gpu(mut self, use_gpu: bool) -> Self {
        self.config.use_gpu = use_gpu;
        self
    }

    /// Validate the configuration and build the map.
    pub fn build(self) -> Result<ElevationMap> {
        ElevationMap::with_config(self.config)
    }
}

impl Default for ElevationMapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-frame options for [`ElevationMap::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Run residual counting before fusion. Edge shaping depends on it.
    pub count_residuals: bool,
}

/// Outcome of one [`ElevationMap::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateResult {
    pub fusion: FusionStats,
    pub reduction: ReductionStats,
    /// Points that contributed a residual (zero when counting was skipped).
    pub residual_count: usize,
    /// Mean `z - map_height` over confident cells, a drift estimate.
    pub mean_residual: Option<f32>,
    pub timing: FrameTiming,
}

/// Robot-centered elevation map.
pub struct ElevationMap {
    config: ElevationMapConfig,

    /// Authoritative per-cell state.
    live_map: ElevationLayers,

    /// Per-frame scatter target, cleared at the start of every update.
    accumulator: ElevationLayers,

    residual_stats: ResidualStats,

    /// GPU runtime for the per-cell passes (None if not enabled/available).
    #[cfg(feature = "cuda")]
    gpu_runtime: Option<GpuRuntime>,
}

impl ElevationMap {
    /// Create a map with default settings and the given resolution.
    pub fn new(resolution: f32) -> Result<Self> {
        let config = ElevationMapConfig {
            resolution,
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// Create a map with a custom configuration.
    pub fn with_config(config: ElevationMapConfig) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry();

        #[cfg(feature = "cuda")]
        let gpu_runtime = if config.use_gpu && is_cuda_available() {
            match GpuRuntime::new() {
                Ok(runtime) => {
                    debug!("GPU runtime initialized");
                    Some(runtime)
                }
                Err(e) => {
                    warn!("failed to initialize GPU runtime: {e}, falling back to CPU");
                    None
                }
            }
        } else {
            if config.use_gpu {
                warn!("GPU requested but CUDA is not available, using CPU");
            }
            None
        };

        #[cfg(not(feature = "cuda"))]
        if config.use_gpu {
            warn!("GPU requested but the crate was built without `cuda`, using CPU");
        }

        Ok(Self {
            live_map: ElevationLayers::new_live_map(geometry, config.initial_variance),
            accumulator: ElevationLayers::zeros(geometry),
            residual_stats: ResidualStats::new(),
            config,
            #[cfg(feature = "cuda")]
            gpu_runtime,
        })
    }

    /// Create a builder for configuring the map.
    pub fn builder() -> ElevationMapBuilder {
        ElevationMapBuilder::new()
    }

    pub fn config(&self) -> &ElevationMapConfig {
        &self.config
    }

    pub fn geometry(&self) -> GridGeometry {
        self.config.geometry()
    }

    pub fn live_map(&self) -> &ElevationLayers {
        &self.live_map
    }

    /// Mutable access for callers managing the map lifecycle (shifting, loading).
    pub fn live_map_mut(&mut self) -> &mut ElevationLayers {
        &mut self.live_map
    }

    /// Accumulator state left by the last update.
    pub fn accumulator(&self) -> &ElevationLayers {
        &self.accumulator
    }

    /// Residual statistics from the last update that counted residuals.
    pub fn residual_stats(&self) -> &ResidualStats {
        &self.residual_stats
    }

    /// Check if GPU acceleration is active.
    pub fn is_gpu_active(&self) -> bool {
        #[cfg(feature = "cuda")]
        {
            self.gpu_runtime.is_some()
        }
        #[cfg(not(feature = "cuda"))]
        {
            false
        }
    }

    /// Forget every observation.
    pub fn reset(&mut self) {
        self.live_map = ElevationLayers::new_live_map(self.geometry(), self.config.initial_variance);
        self.accumulator.clear();
        self.residual_stats.reset();
    }

    /// Fold one sensor frame into the map.
    ///
    /// Clears the accumulator and residual stats, optionally counts residuals
    /// against the map as it stood before this frame, fuses the points, and
    /// commits the accumulator.
    ///
    /// Edge shaping only takes effect with `count_residuals`: the per-cell
    /// counts it compares against `wall_num_threshold` come from residual
    /// counting.
    pub fn update(
        &mut self,
        points: &[[f32; 3]],
        pose: &SensorPose,
        center_x: f32,
        center_y: f32,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        if !(center_x.is_finite() && center_y.is_finite()) {
            bail!("grid center ({center_x}, {center_y}) is not finite");
        }

        let total = Timer::new();
        let mut timing = FrameTiming::default();

        self.accumulator.clear();
        self.residual_stats.reset();

        // Residual counting fills the accumulator's traversability counts that
        // edge shaping reads during fusion, so it runs first
        let residual_count = if options.count_residuals {
            time_kernel!(
                timing,
                residual_ms,
                count_residual_errors(
                    &self.config,
                    &self.live_map,
                    points,
                    pose,
                    center_x,
                    center_y,
                    &mut self.accumulator,
                    &mut self.residual_stats,
                )
            )
        } else {
            0
        };

        let fusion = time_kernel!(
            timing,
            fusion_ms,
            fuse_sensor_points(
                &self.config,
                points,
                pose,
                center_x,
                center_y,
                &mut self.live_map,
                &mut self.accumulator,
            )
        );

        let reduction = time_kernel!(timing, reduce_ms, self.reduce());
        timing.total_ms = total.elapsed_ms();

        let result = UpdateResult {
            fusion,
            reduction,
            residual_count,
            mean_residual: self.residual_stats.mean(),
            timing,
        };

        debug!(
            points = points.len(),
            inliers = fusion.inliers,
            outliers = fusion.outliers,
            committed = reduction.committed,
            reset = reduction.reset,
            residuals = residual_count,
            "updated elevation map"
        );
        Ok(result)
    }

    fn reduce(&mut self) -> ReductionStats {
        #[cfg(feature = "cuda")]
        if let Some(runtime) = &self.gpu_runtime {
            match runtime.reduce_accumulator(&self.config, &self.accumulator, &mut self.live_map) {
                Ok(stats) => return stats,
                Err(e) => warn!("GPU reduction failed: {e:#}, falling back to CPU"),
            }
        }
        reduce_accumulator(&self.config, &self.accumulator, &mut self.live_map)
    }

    /// Height layer with invalid cells filled from valid neighbors.
    ///
    /// The map itself is not modified.
    pub fn fill_holes(&self) -> Vec<f32> {
        let geometry = self.geometry();
        let heights = self.live_map.layer_to_vec(Layer::Height);
        let validity = self.live_map.layer_to_vec(Layer::Validity);

        #[cfg(feature = "cuda")]
        if let Some(runtime) = &self.gpu_runtime {
            match runtime.fill_holes(&geometry, &heights, &validity, self.config.dilation_size) {
                Ok(filled) => return filled,
                Err(e) => warn!("GPU hole filling failed: {e:#}, falling back to CPU"),
            }
        }
        filtering::fill_holes(&geometry, &heights, &validity, self.config.dilation_size)
    }

    /// 0/1 mask of cells inside `polygon` for a grid centered at `(center_x, center_y)`.
    pub fn polygon_mask(&self, polygon: &Polygon, center_x: f32, center_y: f32) -> Vec<u8> {
        let geometry = self.geometry();

        #[cfg(feature = "cuda")]
        if let Some(runtime) = &self.gpu_runtime {
            match runtime.rasterize_polygon(&geometry, polygon, center_x, center_y) {
                Ok(mask) => return mask,
                Err(e) => warn!("GPU polygon rasterization failed: {e:#}, falling back to CPU"),
            }
        }
        polygon::rasterize_polygon(&geometry, polygon, center_x, center_y)
    }
}
