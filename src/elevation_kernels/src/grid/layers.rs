//! Struct-of-arrays layer storage shared by the live map and the accumulator.
//!
//! All layers live in one flat buffer addressed by
//! `layer_offset(layer) + idx`:
//!
//! ```text
//! [ height ........ | variance ........ | validity ........ | traversability .... ]
//!   0 .. N            N .. 2N             2N .. 3N            3N .. 4N
//! ```
//!
//! The accumulator reuses the same slots for the per-frame sums
//! (height sum, variance sum, inlier count, traversability count).

use super::{AtomicF32, GridGeometry};
use crate::error::MapError;

/// Logical layers of the elevation grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Layer {
    /// Height estimate (accumulator: sum of fused heights).
    Height = 0,
    /// Height variance (accumulator: sum of fused variances).
    Variance = 1,
    /// 1 where the cell holds a valid estimate (accumulator: inlier count).
    Validity = 2,
    /// Traversability / confirmed inlier counter.
    Traversability = 3,
}

impl Layer {
    pub const COUNT: usize = 4;
    pub const ALL: [Layer; Layer::COUNT] = [
        Layer::Height,
        Layer::Variance,
        Layer::Validity,
        Layer::Traversability,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Flat multi-layer cell buffer with atomic cells.
#[derive(Debug, Clone)]
pub struct ElevationLayers {
    geometry: GridGeometry,
    data: Vec<AtomicF32>,
}

impl ElevationLayers {
    /// All-zero buffer, the starting state of an accumulator.
    pub fn zeros(geometry: GridGeometry) -> Self {
        let len = geometry.num_cells() * Layer::COUNT;
        Self {
            geometry,
            data: (0..len).map(|_| AtomicF32::new(0.0)).collect(),
        }
    }

    /// Fresh live map: height 0, variance `initial_variance`, nothing valid.
    pub fn new_live_map(geometry: GridGeometry, initial_variance: f32) -> Self {
        let layers = Self::zeros(geometry);
        layers.fill(Layer::Variance, initial_variance);
        layers
    }

    /// Wrap an existing flat buffer of `Layer::COUNT` layers.
    pub fn from_vec(geometry: GridGeometry, values: Vec<f32>) -> Result<Self, MapError> {
        let expected = geometry.num_cells() * Layer::COUNT;
        if values.len() != expected {
            return Err(MapError::ShapeMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            geometry,
            data: values.into_iter().map(AtomicF32::new).collect(),
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Number of cells per layer.
    pub fn num_cells(&self) -> usize {
        self.geometry.num_cells()
    }

    #[inline]
    pub fn cell(&self, layer: Layer, idx: usize) -> &AtomicF32 {
        &self.data[self.geometry.layer_offset(layer.index()) + idx]
    }

    #[inline]
    pub fn get(&self, layer: Layer, idx: usize) -> f32 {
        self.cell(layer, idx).load()
    }

    #[inline]
    pub fn set(&self, layer: Layer, idx: usize, value: f32) {
        self.cell(layer, idx).store(value);
    }

    /// Atomic scatter-add into one cell.
    #[inline]
    pub fn add(&self, layer: Layer, idx: usize, delta: f32) {
        self.cell(layer, idx).fetch_add(delta);
    }

    pub fn fill(&self, layer: Layer, value: f32) {
        let offset = self.geometry.layer_offset(layer.index());
        for cell in &self.data[offset..offset + self.num_cells()] {
            cell.store(value);
        }
    }

    /// Reset every layer to zero. Required before each fusion pass.
    pub fn clear(&mut self) {
        for cell in &self.data {
            cell.store(0.0);
        }
    }

    /// Snapshot of one layer.
    pub fn layer_to_vec(&self, layer: Layer) -> Vec<f32> {
        let offset = self.geometry.layer_offset(layer.index());
        self.data[offset..offset + self.num_cells()]
            .iter()
            .map(AtomicF32::load)
            .collect()
    }

    /// Overwrite one layer from a slice of `num_cells` values.
    pub fn copy_layer_from(&mut self, layer: Layer, values: &[f32]) -> Result<(), MapError> {
        if values.len() != self.num_cells() {
            return Err(MapError::ShapeMismatch {
                expected: self.num_cells(),
                actual: values.len(),
            });
        }
        let offset = self.geometry.layer_offset(layer.index());
        for (cell, &v) in self.data[offset..offset + values.len()].iter().zip(values) {
            cell.store(v);
        }
        Ok(())
    }

    /// Overwrite every layer from a flat buffer in [`to_vec`](Self::to_vec) order.
    pub fn copy_from_slice(&mut self, values: &[f32]) -> Result<(), MapError> {
        if values.len() != self.data.len() {
            return Err(MapError::ShapeMismatch {
                expected: self.data.len(),
                actual: values.len(),
            });
        }
        for (cell, &v) in self.data.iter().zip(values) {
            cell.store(v);
        }
        Ok(())
    }

    /// Snapshot of the whole buffer, layer after layer.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().map(AtomicF32::load).collect()
    }
}
