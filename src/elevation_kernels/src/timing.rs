//! Per-kernel timing instrumentation.
//!
//! Timing is collected when the `profiling` feature is enabled. Without the
//! feature the timer is a zero-sized no-op and every field reads zero.

use serde::{Deserialize, Serialize};
#[cfg(feature = "profiling")]
use std::time::Instant;

/// Wall clock breakdown of one map update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTiming {
    pub total_ms: f64,
    /// Point fusion pass
    pub fusion_ms: f64,
    /// Residual counting pass (zero when skipped)
    pub residual_ms: f64,
    /// Accumulator reduction pass
    pub reduce_ms: f64,
}

/// Timer that can be enabled/disabled at compile time.
#[cfg(feature = "profiling")]
pub struct Timer {
    start: Instant,
}

#[cfg(feature = "profiling")]
impl Timer {
    #[inline]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// No-op timer when profiling is disabled.
#[cfg(not(feature = "profiling"))]
pub struct Timer;

#[cfg(not(feature = "profiling"))]
impl Timer {
    #[inline(always)]
    pub fn new() -> Self {
        Self
    }

    #[inline(always)]
    pub fn elapsed_ms(&self) -> f64 {
        0.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `$block`, storing its wall time in `$timing.$field`.
///
/// ```ignore
/// let stats = time_kernel!(timing, fusion_ms, fuse_sensor_points(..));
/// ```
#[macro_export]
macro_rules! time_kernel {
    ($timing:expr, $field:ident, $block:expr) => {{
        let timer = $crate::timing::Timer::new();
        let result = $block;
        $timing.$field = timer.elapsed_ms();
        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_kernel_records_field() {
        let mut timing = FrameTiming::default();
        let value = time_kernel!(timing, reduce_ms, {
            std::thread::sleep(std::time::Duration::from_millis(2));
            7
        });
        assert_eq!(value, 7);

        #[cfg(feature = "profiling")]
        assert!(timing.reduce_ms >= 2.0);

        #[cfg(not(feature = "profiling"))]
        assert_eq!(timing.reduce_ms, 0.0);

        assert_eq!(timing.fusion_ms, 0.0);
    }

    #[test]
    fn test_frame_timing_serializes() {
        let timing = FrameTiming {
            total_ms: 3.5,
            fusion_ms: 2.0,
            residual_ms: 0.5,
            reduce_ms: 1.0,
        };
        let json = serde_json::to_string(&timing).unwrap();
        let back: FrameTiming = serde_json::from_str(&json).unwrap();
        assert_eq!(back, timing);
    }
}
