//! Synthetic inputs for exercising the kernels.
//!
//! Generators produce sensor-frame points with known ground truth heights.
//! Spacing is in meters; points are laid out on a regular grid so the number
//! of hits per cell is predictable when `interval` divides the resolution.

use crate::polygon::Polygon;

/// Flat ground patch: points on `[-half_extent, half_extent]²` at height `z`.
///
/// Returns `(2 * half_extent / interval + 1)²` points.
pub fn make_ground_patch(half_extent: f32, interval: f32, z: f32) -> Vec<[f32; 3]> {
    let n = ((2.0 * half_extent / interval).round() as usize) + 1;
    let mut points = Vec::with_capacity(n * n);

    for i in 0..n {
        for j in 0..n {
            let x = -half_extent + interval * (i as f32);
            let y = -half_extent + interval * (j as f32);
            points.push([x, y, z]);
        }
    }

    points
}

/// Ground patch with a step along x: `low_z` for `x < step_x`, `high_z` beyond.
pub fn make_step(
    half_extent: f32,
    interval: f32,
    step_x: f32,
    low_z: f32,
    high_z: f32,
) -> Vec<[f32; 3]> {
    make_ground_patch(half_extent, interval, low_z)
        .into_iter()
        .map(|[x, y, z]| if x < step_x { [x, y, z] } else { [x, y, high_z] })
        .collect()
}

/// Vertical column of points at `(x, y)` from `z_min` to `z_max`.
///
/// Stacks many hits into a single cell, the shape edge shaping protects.
pub fn make_wall_column(x: f32, y: f32, z_min: f32, z_max: f32, interval: f32) -> Vec<[f32; 3]> {
    let n = (((z_max - z_min) / interval).round() as usize) + 1;
    (0..n)
        .map(|k| [x, y, z_min + interval * (k as f32)])
        .collect()
}

/// Axis-aligned square polygon centered at `(cx, cy)`.
pub fn make_square_polygon(cx: f32, cy: f32, half_side: f32) -> Polygon {
    Polygon::new(vec![
        [cx - half_side, cy - half_side],
        [cx + half_side, cy - half_side],
        [cx + half_side, cy + half_side],
        [cx - half_side, cy + half_side],
    ])
}

/// Ground patch with Gaussian height noise, seeded for reproducibility.
#[cfg(test)]
pub fn make_noisy_ground_patch(
    half_extent: f32,
    interval: f32,
    z: f32,
    sigma: f32,
    seed: u64,
) -> Vec<[f32; 3]> {
    use rand::prelude::*;
    use rand_distr::Normal;

    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0f32, sigma).expect("valid sigma");
    make_ground_patch(half_extent, interval, z)
        .into_iter()
        .map(|[x, y, z]| [x, y, z + noise.sample(&mut rng)])
        .collect()
}
