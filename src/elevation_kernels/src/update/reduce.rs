//! Reduction kernel: commit accumulated sums into the live map.

use rayon::prelude::*;
use tracing::debug;

use crate::config::ElevationMapConfig;
use crate::grid::{ElevationLayers, Layer};

/// Cell counts from one reduction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReductionStats {
    /// Cells that took the averaged estimate.
    pub committed: usize,
    /// Cells whose mean variance exceeded `max_variance` and were reset.
    pub reset: usize,
}

impl ReductionStats {
    fn merge(self, other: Self) -> Self {
        Self {
            committed: self.committed + other.committed,
            reset: self.reset + other.reset,
        }
    }
}

/// Average the accumulator into the live map.
///
/// One task per cell. Cells with a zero count are left untouched. Otherwise
/// the mean variance decides: above `max_variance` the cell is reset to
/// height 0, variance `initial_variance`, invalid; else the mean height and
/// variance are committed and the cell is marked valid.
///
/// Each cell is written by exactly one task, so plain stores suffice.
pub fn reduce_accumulator(
    config: &ElevationMapConfig,
    accumulator: &ElevationLayers,
    live_map: &mut ElevationLayers,
) -> ReductionStats {
    let live_map = &*live_map;
    let num_cells = live_map.num_cells();

    let stats = (0..num_cells)
        .into_par_iter()
        .fold(ReductionStats::default, |mut stats, idx| {
            let count = accumulator.get(Layer::Validity, idx);
            if count > 0.0 {
                let mean_v = accumulator.get(Layer::Variance, idx) / count;
                if mean_v > config.max_variance {
                    live_map.set(Layer::Height, idx, 0.0);
                    live_map.set(Layer::Variance, idx, config.initial_variance);
                    live_map.set(Layer::Validity, idx, 0.0);
                    stats.reset += 1;
                } else {
                    live_map.set(Layer::Height, idx, accumulator.get(Layer::Height, idx) / count);
                    live_map.set(Layer::Variance, idx, mean_v);
                    live_map.set(Layer::Validity, idx, 1.0);
                    stats.committed += 1;
                }
            }
            stats
        })
        .reduce(ReductionStats::default, ReductionStats::merge);

    debug!(
        committed = stats.committed,
        reset = stats.reset,
        "reduced accumulator"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config() -> ElevationMapConfig {
        ElevationMapConfig {
            resolution: 0.1,
            width: 10,
            height: 10,
            max_variance: 1.0,
            initial_variance: 1000.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_accumulator_leaves_map_unchanged() {
        let config = config();
        let acc = ElevationLayers::zeros(config.geometry());
        let mut map = ElevationLayers::new_live_map(config.geometry(), config.initial_variance);
        map.set(Layer::Height, 3, 1.5);
        map.set(Layer::Variance, 3, 0.2);
        map.set(Layer::Validity, 3, 1.0);
        map.set(Layer::Traversability, 7, 4.0);
        let before = map.to_vec();

        let stats = reduce_accumulator(&config, &acc, &mut map);
        assert_eq!(stats, ReductionStats::default());
        assert_eq!(map.to_vec(), before);
    }

    #[test]
    fn test_commit_averages() {
        let config = config();
        let acc = ElevationLayers::zeros(config.geometry());
        acc.set(Layer::Height, 12, 3.0);
        acc.set(Layer::Variance, 12, 0.6);
        acc.set(Layer::Validity, 12, 3.0);
        let mut map = ElevationLayers::new_live_map(config.geometry(), config.initial_variance);

        let stats = reduce_accumulator(&config, &acc, &mut map);
        assert_eq!(stats.committed, 1);
        assert_relative_eq!(map.get(Layer::Height, 12), 1.0);
        assert_relative_eq!(map.get(Layer::Variance, 12), 0.2);
        assert_eq!(map.get(Layer::Validity, 12), 1.0);
        // Neighbours untouched
        assert_eq!(map.get(Layer::Variance, 13), 1000.0);
    }

    #[test]
    fn test_high_variance_resets_cell() {
        let config = config();
        let acc = ElevationLayers::zeros(config.geometry());
        acc.set(Layer::Height, 40, 4.0);
        acc.set(Layer::Variance, 40, 5.0);
        acc.set(Layer::Validity, 40, 2.0);

        let mut map = ElevationLayers::new_live_map(config.geometry(), config.initial_variance);
        map.set(Layer::Height, 40, 0.7);
        map.set(Layer::Variance, 40, 0.1);
        map.set(Layer::Validity, 40, 1.0);
        map.set(Layer::Traversability, 40, 3.0);

        let stats = reduce_accumulator(&config, &acc, &mut map);
        assert_eq!(stats.reset, 1);
        assert_eq!(map.get(Layer::Height, 40), 0.0);
        assert_eq!(map.get(Layer::Variance, 40), 1000.0);
        assert_eq!(map.get(Layer::Validity, 40), 0.0);
        // Traversability is not part of the commit
        assert_eq!(map.get(Layer::Traversability, 40), 3.0);
    }

    #[test]
    fn test_mean_variance_at_limit_commits() {
        let config = config();
        let acc = ElevationLayers::zeros(config.geometry());
        acc.set(Layer::Height, 0, 2.0);
        acc.set(Layer::Variance, 0, 2.0);
        acc.set(Layer::Validity, 0, 2.0);
        let mut map = ElevationLayers::new_live_map(config.geometry(), config.initial_variance);

        let stats = reduce_accumulator(&config, &acc, &mut map);
        assert_eq!(stats.committed, 1);
        assert_eq!(map.get(Layer::Variance, 0), 1.0);
    }
}
