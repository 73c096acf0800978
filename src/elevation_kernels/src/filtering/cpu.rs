//! CPU dilation kernel.

use rayon::prelude::*;
use tracing::debug;

use super::VALIDITY_THRESHOLD;
use crate::grid::GridGeometry;

/// Flat index of the neighbor chosen to fill cell `idx`, if any.
///
/// See the [module docs](super) for the selection order.
pub fn nearest_valid_neighbor(
    geometry: &GridGeometry,
    validity_mask: &[f32],
    idx: usize,
    dilation_size: usize,
) -> Option<usize> {
    let (i, j) = geometry.cell_coords(idx);
    let (i, j) = (i as i64, j as i64);
    let rows = geometry.height as i64;
    let cols = geometry.width as i64;
    let d = dilation_size as i64;

    let mut best: Option<(i64, usize)> = None;
    for di in -d..=d {
        let ni = i + di;
        if ni < 0 || ni >= rows {
            continue;
        }
        for dj in -d..=d {
            let nj = j + dj;
            if nj < 0 || nj >= cols {
                continue;
            }
            let n = geometry.linear_index(ni as usize, nj as usize);
            if validity_mask[n] <= VALIDITY_THRESHOLD {
                continue;
            }
            let distance = di + dj;
            if best.map_or(true, |(b, _)| distance < b) {
                best = Some((distance, n));
            }
        }
    }
    best.map(|(_, n)| n)
}

/// Fill invalid cells with the height of a nearby valid cell.
///
/// `heights` and `validity_mask` are single layers of `geometry.num_cells()`
/// cells. Valid cells are copied, invalid ones take their chosen neighbor's
/// height or keep their own when no valid neighbor is in reach.
///
/// # Panics
///
/// When either slice is shorter than the grid.
pub fn fill_holes(
    geometry: &GridGeometry,
    heights: &[f32],
    validity_mask: &[f32],
    dilation_size: usize,
) -> Vec<f32> {
    let num_cells = geometry.num_cells();
    assert!(heights.len() >= num_cells && validity_mask.len() >= num_cells);

    let filled: Vec<f32> = (0..num_cells)
        .into_par_iter()
        .map(|idx| {
            if validity_mask[idx] >= VALIDITY_THRESHOLD {
                return heights[idx];
            }
            nearest_valid_neighbor(geometry, validity_mask, idx, dilation_size)
                .map_or(heights[idx], |n| heights[n])
        })
        .collect();

    debug!(cells = num_cells, dilation_size, "filled holes");
    filled
}
