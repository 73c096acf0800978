//! Error types for elevation grid construction.
//!
//! The kernels themselves never fail: off-grid coordinates are clamped and
//! unreliable cells are reset. Errors only surface when a configuration or a
//! caller-supplied buffer is rejected before any kernel runs.

use thiserror::Error;

/// Errors raised while building grids and buffers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapError {
    #[error("invalid configuration: `{field}` {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    #[error("buffer length mismatch: expected {expected} cells, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

impl MapError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }
}
