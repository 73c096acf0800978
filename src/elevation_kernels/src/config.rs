//! Deployment-time configuration for the elevation kernels.
//!
//! Every parameter is fixed for the lifetime of a map. Values are validated
//! once, before any kernel runs, so the hot paths never check for zero
//! denominators or empty grids.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::MapError;
use crate::grid::GridGeometry;

/// Parameters consumed by the elevation kernels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationMapConfig {
    /// Cell side length in meters.
    pub resolution: f32,
    /// Number of cells along x.
    pub width: usize,
    /// Number of cells along y. Must equal `width`.
    pub height: usize,

    /// Range noise model: point variance = factor * z².
    pub sensor_noise_factor: f32,
    /// Points farther than `variance * threshold` from the cell height are outliers.
    pub mahalanobis_threshold: f32,
    /// Variance added to a cell for every outlier hitting it.
    pub outlier_variance: f32,

    /// Inlier count above which low points no longer undercut a cell.
    pub wall_num_threshold: f32,
    /// Keep vertical edges sharp by discarding points below a well-supported cell.
    pub edge_shaped_enabled: bool,

    /// Cells at or above this traversability count are skipped by residual counting.
    pub traversability_inlier_threshold: f32,

    /// Fused cells with a mean variance above this are reset.
    pub max_variance: f32,
    /// Variance given to reset or never-observed cells.
    pub initial_variance: f32,

    /// Half-width of the hole-filling window in cells.
    pub dilation_size: usize,

    /// Run per-cell passes on the GPU when the `cuda` feature and a device are available.
    pub use_gpu: bool,
}

impl Default for ElevationMapConfig {
    fn default() -> Self {
        Self {
            resolution: 0.04,
            width: 200,
            height: 200,
            sensor_noise_factor: 0.05,
            mahalanobis_threshold: 2.0,
            outlier_variance: 0.01,
            wall_num_threshold: 20.0,
            edge_shaped_enabled: true,
            traversability_inlier_threshold: 0.9,
            max_variance: 1.0,
            initial_variance: 1000.0,
            dilation_size: 2,
            use_gpu: false,
        }
    }
}

impl ElevationMapConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("failed to parse elevation map config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn geometry(&self) -> GridGeometry {
        GridGeometry::new(self.resolution, self.width, self.height)
    }

    /// Reject configurations the kernels cannot run with.
    ///
    /// Variances must stay strictly positive so the fusion denominator
    /// `map_variance + point_variance` is never zero.
    pub fn validate(&self) -> Result<(), MapError> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(MapError::invalid("resolution", "must be finite and > 0"));
        }
        if self.width == 0 {
            return Err(MapError::invalid("width", "must be > 0"));
        }
        if self.height == 0 {
            return Err(MapError::invalid("height", "must be > 0"));
        }
        if self.width != self.height {
            return Err(MapError::invalid(
                "height",
                format!(
                    "must equal width ({}); the flat index uses width as the row stride",
                    self.width
                ),
            ));
        }
        if self.width > i32::MAX as usize / 4 {
            return Err(MapError::invalid("width", "is too large for i32 cell indices"));
        }

        positive("sensor_noise_factor", self.sensor_noise_factor)?;
        positive("initial_variance", self.initial_variance)?;
        positive("max_variance", self.max_variance)?;
        non_negative("mahalanobis_threshold", self.mahalanobis_threshold)?;
        non_negative("outlier_variance", self.outlier_variance)?;

        if !self.wall_num_threshold.is_finite() {
            return Err(MapError::invalid("wall_num_threshold", "must be finite"));
        }
        if !self.traversability_inlier_threshold.is_finite() {
            return Err(MapError::invalid(
                "traversability_inlier_threshold",
                "must be finite",
            ));
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), MapError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MapError::invalid(field, format!("must be finite and > 0, got {value}")))
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), MapError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MapError::invalid(field, format!("must be finite and >= 0, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: MapError) -> &'static str {
        match err {
            MapError::InvalidConfiguration { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_is_valid() {
        let config = ElevationMapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.geometry().num_cells(), 200 * 200);
    }

    #[test]
    fn test_rejects_bad_grid() {
        let bad = ElevationMapConfig {
            resolution: 0.0,
            ..Default::default()
        };
        assert_eq!(field_of(bad.validate().unwrap_err()), "resolution");

        let bad = ElevationMapConfig {
            resolution: -0.1,
            ..Default::default()
        };
        assert_eq!(field_of(bad.validate().unwrap_err()), "resolution");

        let bad = ElevationMapConfig {
            width: 0,
            ..Default::default()
        };
        assert_eq!(field_of(bad.validate().unwrap_err()), "width");

        let bad = ElevationMapConfig {
            height: 0,
            ..Default::default()
        };
        assert_eq!(field_of(bad.validate().unwrap_err()), "height");

        let bad = ElevationMapConfig {
            width: 100,
            height: 50,
            ..Default::default()
        };
        assert_eq!(field_of(bad.validate().unwrap_err()), "height");
    }

    #[test]
    fn test_rejects_non_positive_variances() {
        let bad = ElevationMapConfig {
            sensor_noise_factor: 0.0,
            ..Default::default()
        };
        assert_eq!(field_of(bad.validate().unwrap_err()), "sensor_noise_factor");

        let bad = ElevationMapConfig {
            initial_variance: -1.0,
            ..Default::default()
        };
        assert_eq!(field_of(bad.validate().unwrap_err()), "initial_variance");

        let bad = ElevationMapConfig {
            max_variance: f32::NAN,
            ..Default::default()
        };
        assert_eq!(field_of(bad.validate().unwrap_err()), "max_variance");

        let bad = ElevationMapConfig {
            outlier_variance: -0.01,
            ..Default::default()
        };
        assert_eq!(field_of(bad.validate().unwrap_err()), "outlier_variance");

        let bad = ElevationMapConfig {
            mahalanobis_threshold: f32::INFINITY,
            ..Default::default()
        };
        assert_eq!(field_of(bad.validate().unwrap_err()), "mahalanobis_threshold");
    }

    #[test]
    fn test_from_json_with_defaults() {
        let config =
            ElevationMapConfig::from_json_str(r#"{"resolution": 0.1, "width": 100, "height": 100}"#)
                .unwrap();
        assert_eq!(config.resolution, 0.1);
        assert_eq!(config.width, 100);
        assert_eq!(config.dilation_size, 2);
        assert!(config.edge_shaped_enabled);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let err = ElevationMapConfig::from_json_str(r#"{"width": 10, "height": 20}"#).unwrap_err();
        assert!(err.to_string().contains("height"), "{err}");

        assert!(ElevationMapConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ElevationMapConfig {
            dilation_size: 4,
            edge_shaped_enabled: false,
            ..Default::default()
        };
        let json = config.to_json_pretty().unwrap();
        assert_eq!(ElevationMapConfig::from_json_str(&json).unwrap(), config);
    }
}
