//! Grid geometry, indexing and layered cell storage.
//!
//! The elevation grid is a fixed `width * height` array of cells centered on a
//! moving reference point. Every kernel receives the current center and maps
//! world coordinates to clamped cell coordinates through [`GridGeometry`].
//!
//! # Indexing
//!
//! ```text
//! cell_x = clamp(round((x - center_x) / resolution) + width / 2, 0, width - 1)
//! cell_y = clamp(round((y - center_y) / resolution) + height / 2, 0, height - 1)
//! idx    = width * cell_x + cell_y
//! ```
//!
//! Rounding is half-away-from-zero, which decides which cell a point on a
//! cell boundary falls into. Off-grid coordinates land on the boundary cell.

pub mod atomic;
pub mod layers;

pub use atomic::AtomicF32;
pub use layers::{ElevationLayers, Layer};

use serde::{Deserialize, Serialize};

/// Resolution and extent of the elevation grid.
///
/// The row stride of the flat index is `width`. Only square grids are
/// accepted by [`crate::ElevationMapConfig::validate`], so the stride is valid
/// for both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Cell side length in meters.
    pub resolution: f32,
    /// Number of cells along the x axis.
    pub width: usize,
    /// Number of cells along the y axis.
    pub height: usize,
}

impl GridGeometry {
    pub fn new(resolution: f32, width: usize, height: usize) -> Self {
        Self {
            resolution,
            width,
            height,
        }
    }

    /// Number of cells in one layer.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.width * self.height
    }

    /// Signed cell offset of `x` from `center` along one axis.
    #[inline]
    pub fn cell_of(&self, x: f32, center: f32) -> i32 {
        // f32::round rounds half away from zero; `as` saturates far-off values
        ((x - center) / self.resolution).round() as i32
    }

    /// Per-axis cell coordinates of a world position, clamped into the grid.
    #[inline]
    pub fn clamped_cell(&self, x: f32, y: f32, center_x: f32, center_y: f32) -> (usize, usize) {
        let half_w = (self.width / 2) as i64;
        let half_h = (self.height / 2) as i64;
        let ix = (self.cell_of(x, center_x) as i64 + half_w).clamp(0, self.width as i64 - 1);
        let iy = (self.cell_of(y, center_y) as i64 + half_h).clamp(0, self.height as i64 - 1);
        (ix as usize, iy as usize)
    }

    /// Flat cell index of a world position, clamped into the grid.
    #[inline]
    pub fn clamped_index(&self, x: f32, y: f32, center_x: f32, center_y: f32) -> usize {
        let (ix, iy) = self.clamped_cell(x, y, center_x, center_y);
        self.linear_index(ix, iy)
    }

    #[inline]
    pub fn linear_index(&self, cell_x: usize, cell_y: usize) -> usize {
        self.width * cell_x + cell_y
    }

    /// Inverse of [`linear_index`](Self::linear_index).
    #[inline]
    pub fn cell_coords(&self, idx: usize) -> (usize, usize) {
        (idx / self.width, idx % self.width)
    }

    /// Offset of the first cell of `layer` in a flat multi-layer buffer.
    #[inline]
    pub fn layer_offset(&self, layer: usize) -> usize {
        self.num_cells() * layer
    }

    /// World coordinates of a cell center.
    pub fn cell_center(&self, idx: usize, center_x: f32, center_y: f32) -> (f32, f32) {
        let (ix, iy) = self.cell_coords(idx);
        let x = (ix as f32 - (self.width / 2) as f32) * self.resolution + center_x;
        let y = (iy as f32 - (self.height / 2) as f32) * self.resolution + center_y;
        (x, y)
    }
}

/// Range-dependent height variance of a sensor point: `noise_factor * z²`.
///
/// `z` is the point's coordinate in the sensor frame, so farther points are noisier.
#[inline]
pub fn sensor_noise(noise_factor: f32, z: f32) -> f32 {
    noise_factor * z * z
}
