//! Point-fusion kernel: fold sensor points into per-cell height estimates.

use rayon::prelude::*;
use tracing::debug;

use super::project_point;
use crate::config::ElevationMapConfig;
use crate::grid::{ElevationLayers, Layer};
use crate::pose::SensorPose;

/// What happened to a single point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointOutcome {
    Inlier,
    Outlier,
    EdgeRejected,
}

/// Point counts from one fusion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionStats {
    /// Points fused into the accumulator.
    pub inliers: usize,
    /// Points that inflated the live map variance instead.
    pub outliers: usize,
    /// Inliers dropped for lying below a well-supported cell.
    pub edge_rejected: usize,
}

impl FusionStats {
    fn record(mut self, outcome: PointOutcome) -> Self {
        match outcome {
            PointOutcome::Inlier => self.inliers += 1,
            PointOutcome::Outlier => self.outliers += 1,
            PointOutcome::EdgeRejected => self.edge_rejected += 1,
        }
        self
    }

    fn merge(self, other: Self) -> Self {
        Self {
            inliers: self.inliers + other.inliers,
            outliers: self.outliers + other.outliers,
            edge_rejected: self.edge_rejected + other.edge_rejected,
        }
    }

    pub fn total(&self) -> usize {
        self.inliers + self.outliers + self.edge_rejected
    }
}

/// Fuse a batch of sensor points into the accumulator.
///
/// One task per point. Each point is transformed to the map frame and tested
/// against the current cell estimate:
/// - `|map_h - z| > map_v * mahalanobis_threshold`: outlier, the live map
///   variance at the cell grows by `outlier_variance`.
/// - inlier below a cell already holding more than `wall_num_threshold`
///   points (edge shaping on): dropped, so stray low points do not eat into
///   walls.
/// - otherwise the precision-weighted estimate
///   `((map_h * v + z * map_v) / (map_v + v), map_v * v / (map_v + v))` and a
///   unit count are added to accumulator layers 0/1/2, and the live cell is
///   marked valid.
///
/// The accumulator must be zeroed by the caller beforehand, except for the
/// traversability counts [`count_residual_errors`](super::count_residual_errors)
/// leaves for edge shaping. Points are not modified.
pub fn fuse_sensor_points(
    config: &ElevationMapConfig,
    points: &[[f32; 3]],
    pose: &SensorPose,
    center_x: f32,
    center_y: f32,
    live_map: &mut ElevationLayers,
    accumulator: &mut ElevationLayers,
) -> FusionStats {
    let geometry = config.geometry();
    let live_map = &*live_map;
    let accumulator = &*accumulator;

    let stats = points
        .par_iter()
        .map(|point| {
            let p = project_point(config, &geometry, pose, point, center_x, center_y);
            let idx = p.idx;

            let map_h = live_map.get(Layer::Height, idx);
            let map_v = live_map.get(Layer::Variance, idx);
            let num_points = accumulator.get(Layer::Traversability, idx);

            if (map_h - p.z).abs() > map_v * config.mahalanobis_threshold {
                live_map.add(Layer::Variance, idx, config.outlier_variance);
                return PointOutcome::Outlier;
            }

            if config.edge_shaped_enabled && num_points > config.wall_num_threshold && p.z < map_h
            {
                return PointOutcome::EdgeRejected;
            }

            let v = p.variance;
            let new_h = (map_h * v + p.z * map_v) / (map_v + v);
            let new_v = (map_v * v) / (map_v + v);
            accumulator.add(Layer::Height, idx, new_h);
            accumulator.add(Layer::Variance, idx, new_v);
            accumulator.add(Layer::Validity, idx, 1.0);
            // Idempotent flag, racing writers all store 1
            live_map.set(Layer::Validity, idx, 1.0);
            PointOutcome::Inlier
        })
        .fold(FusionStats::default, FusionStats::record)
        .reduce(FusionStats::default, FusionStats::merge);

    debug!(
        points = points.len(),
        inliers = stats.inliers,
        outliers = stats.outliers,
        edge_rejected = stats.edge_rejected,
        "fused sensor points"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::reduce_accumulator;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn config() -> ElevationMapConfig {
        ElevationMapConfig {
            resolution: 0.1,
            width: 100,
            height: 100,
            ..Default::default()
        }
    }

    fn buffers(config: &ElevationMapConfig) -> (ElevationLayers, ElevationLayers) {
        (
            ElevationLayers::new_live_map(config.geometry(), config.initial_variance),
            ElevationLayers::zeros(config.geometry()),
        )
    }

    const CENTER_IDX: usize = 100 * 50 + 50;

    #[test]
    fn test_single_point_into_empty_map() {
        let config = ElevationMapConfig {
            sensor_noise_factor: 1e-6,
            ..config()
        };
        let (mut map, mut acc) = buffers(&config);

        let stats = fuse_sensor_points(
            &config,
            &[[0.0, 0.0, 1.0]],
            &SensorPose::identity(),
            0.0,
            0.0,
            &mut map,
            &mut acc,
        );
        assert_eq!(stats.inliers, 1);
        assert_eq!(acc.get(Layer::Validity, CENTER_IDX), 1.0);
        assert_eq!(map.get(Layer::Validity, CENTER_IDX), 1.0);

        reduce_accumulator(&config, &acc, &mut map);
        assert_relative_eq!(map.get(Layer::Height, CENTER_IDX), 1.0, epsilon = 1e-4);
        assert_eq!(map.get(Layer::Validity, CENTER_IDX), 1.0);
    }

    #[test]
    fn test_exact_match_keeps_height() {
        let config = config();
        let (mut map, mut acc) = buffers(&config);
        map.set(Layer::Height, CENTER_IDX, 0.8);
        map.set(Layer::Variance, CENTER_IDX, 0.02);

        fuse_sensor_points(
            &config,
            &[[0.0, 0.0, 0.8]],
            &SensorPose::identity(),
            0.0,
            0.0,
            &mut map,
            &mut acc,
        );

        assert_relative_eq!(acc.get(Layer::Height, CENTER_IDX), 0.8, epsilon = 1e-6);
        // Variance still shrinks
        assert!(acc.get(Layer::Variance, CENTER_IDX) < 0.02);
    }

    #[test]
    fn test_outlier_only_inflates_live_variance() {
        let config = config();
        let (mut map, mut acc) = buffers(&config);
        map.set(Layer::Height, CENTER_IDX, 0.0);
        map.set(Layer::Variance, CENTER_IDX, 0.01);

        // deviation 1.0 > 0.01 * 2.0
        let points = vec![[0.0, 0.0, 1.0]; 3];
        let stats = fuse_sensor_points(
            &config,
            &points,
            &SensorPose::identity(),
            0.0,
            0.0,
            &mut map,
            &mut acc,
        );

        assert_eq!(stats.outliers, 3);
        assert_eq!(stats.inliers, 0);
        assert_eq!(acc.get(Layer::Height, CENTER_IDX), 0.0);
        assert_eq!(acc.get(Layer::Variance, CENTER_IDX), 0.0);
        assert_eq!(acc.get(Layer::Validity, CENTER_IDX), 0.0);
        assert_eq!(map.get(Layer::Validity, CENTER_IDX), 0.0);
        // Band after three hits is 0.04 * 2.0, still far below the deviation
        assert_relative_eq!(
            map.get(Layer::Variance, CENTER_IDX),
            0.01 + 3.0 * config.outlier_variance,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_concurrent_outliers_accumulate() {
        let config = ElevationMapConfig {
            outlier_variance: 1e-4,
            ..config()
        };
        let (mut map, mut acc) = buffers(&config);
        map.set(Layer::Height, CENTER_IDX, 0.0);
        map.set(Layer::Variance, CENTER_IDX, 1e-3);

        // Far enough that the band never reaches the points
        let points = vec![[0.0, 0.0, 5.0]; 1000];
        let stats = fuse_sensor_points(
            &config,
            &points,
            &SensorPose::identity(),
            0.0,
            0.0,
            &mut map,
            &mut acc,
        );

        assert_eq!(stats.outliers, 1000);
        assert_relative_eq!(
            map.get(Layer::Variance, CENTER_IDX),
            1e-3 + 1000.0 * 1e-4,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_edge_shaping_drops_low_points() {
        let config = config();
        let (mut map, mut acc) = buffers(&config);
        map.set(Layer::Height, CENTER_IDX, 1.0);
        map.set(Layer::Variance, CENTER_IDX, 1.0);
        acc.set(
            Layer::Traversability,
            CENTER_IDX,
            config.wall_num_threshold + 1.0,
        );

        let points = [[0.0, 0.0, 0.5], [0.0, 0.0, 1.5]];
        let stats = fuse_sensor_points(
            &config,
            &points,
            &SensorPose::identity(),
            0.0,
            0.0,
            &mut map,
            &mut acc,
        );

        assert_eq!(stats.edge_rejected, 1);
        assert_eq!(stats.inliers, 1);
        assert_eq!(acc.get(Layer::Validity, CENTER_IDX), 1.0);

        // Disabled: both points fuse
        let config = ElevationMapConfig {
            edge_shaped_enabled: false,
            ..config
        };
        acc.clear();
        acc.set(
            Layer::Traversability,
            CENTER_IDX,
            config.wall_num_threshold + 1.0,
        );
        let stats = fuse_sensor_points(
            &config,
            &points,
            &SensorPose::identity(),
            0.0,
            0.0,
            &mut map,
            &mut acc,
        );
        assert_eq!(stats.inliers, 2);
    }

    #[test]
    fn test_sequential_frames_match_closed_form() {
        // Wide band so the second point is not rejected by the tightened estimate
        let config = ElevationMapConfig {
            mahalanobis_threshold: 100.0,
            ..config()
        };
        let (mut map, mut acc) = buffers(&config);
        let (h0, v0) = (0.2f32, 0.5f32);
        map.set(Layer::Height, CENTER_IDX, h0);
        map.set(Layer::Variance, CENTER_IDX, v0);

        let z1 = 0.4f32;
        let z2 = 0.3f32;
        for z in [z1, z2] {
            acc.clear();
            fuse_sensor_points(
                &config,
                &[[0.0, 0.0, z]],
                &SensorPose::identity(),
                0.0,
                0.0,
                &mut map,
                &mut acc,
            );
            reduce_accumulator(&config, &acc, &mut map);
        }

        let v1 = config.sensor_noise_factor * z1 * z1;
        let v2 = config.sensor_noise_factor * z2 * z2;
        let precision = 1.0 / v0 + 1.0 / v1 + 1.0 / v2;
        let expected_h = (h0 / v0 + z1 / v1 + z2 / v2) / precision;
        let expected_v = 1.0 / precision;

        assert_relative_eq!(map.get(Layer::Height, CENTER_IDX), expected_h, epsilon = 1e-5);
        assert_relative_eq!(map.get(Layer::Variance, CENTER_IDX), expected_v, epsilon = 1e-6);
    }

    #[test]
    fn test_same_frame_points_average() {
        let config = config();
        let (mut map, mut acc) = buffers(&config);
        map.set(Layer::Height, CENTER_IDX, 0.0);
        map.set(Layer::Variance, CENTER_IDX, 0.5);

        // Sensor frame z equal, so both points carry the same variance
        let pose = SensorPose::from_translation([0.0, 0.0, 0.1]);
        let points = [[0.0, 0.0, 0.2], [0.01, 0.01, 0.2]];
        fuse_sensor_points(&config, &points, &pose, 0.0, 0.0, &mut map, &mut acc);
        reduce_accumulator(&config, &acc, &mut map);

        let v = config.sensor_noise_factor * 0.2 * 0.2;
        let z = 0.3f32;
        let expected_h = (z * 0.5) / (0.5 + v);
        let expected_v = (0.5 * v) / (0.5 + v);
        assert_relative_eq!(map.get(Layer::Height, CENTER_IDX), expected_h, epsilon = 1e-5);
        assert_relative_eq!(map.get(Layer::Variance, CENTER_IDX), expected_v, epsilon = 1e-6);
    }

    #[test]
    fn test_order_independent() {
        let config = config();
        let mut rng = StdRng::seed_from_u64(7);
        let points: Vec<[f32; 3]> = (0..5000)
            .map(|_| {
                [
                    rng.gen_range(-0.3..0.3),
                    rng.gen_range(-0.3..0.3),
                    rng.gen_range(0.5..0.7),
                ]
            })
            .collect();
        let mut shuffled = points.clone();
        shuffled.shuffle(&mut rng);

        let (mut map_a, mut acc_a) = buffers(&config);
        let (mut map_b, mut acc_b) = buffers(&config);
        let pose = SensorPose::identity();
        let stats_a = fuse_sensor_points(&config, &points, &pose, 0.0, 0.0, &mut map_a, &mut acc_a);
        let stats_b =
            fuse_sensor_points(&config, &shuffled, &pose, 0.0, 0.0, &mut map_b, &mut acc_b);
        assert_eq!(stats_a, stats_b);

        for (a, b) in acc_a.to_vec().iter().zip(acc_b.to_vec().iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-3, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_transform_moves_target_cell() {
        let config = config();
        let (mut map, mut acc) = buffers(&config);
        let pose = SensorPose::from_translation([1.0, -0.5, 0.0]);

        fuse_sensor_points(
            &config,
            &[[0.0, 0.0, 0.3]],
            &pose,
            0.0,
            0.0,
            &mut map,
            &mut acc,
        );

        let idx = config.geometry().linear_index(60, 45);
        assert_eq!(acc.get(Layer::Validity, idx), 1.0);
        assert_eq!(acc.get(Layer::Validity, CENTER_IDX), 0.0);
    }
}
