//! CubeCL kernels for the one-task-per-cell passes.
//!
//! Each thread owns one cell and writes only that cell, so no atomics are
//! needed. Point passes (fusion, residual counting) scatter into shared cells
//! with float atomics and stay on the CPU.
//!
//! Helpers are inlined into the kernel bodies and loops avoid `break`; both
//! trip up CubeCL's type inference and uniformity analysis.

use cubecl::prelude::*;

/// Commit accumulated sums into the live map.
///
/// # Inputs
/// - `accumulator`: [4 * N] height sum, variance sum, count, traversability
/// - `max_variance`, `initial_variance`: reset policy
///
/// # Outputs
/// - `live_map`: [4 * N] layers 0..3 updated in place for cells with a count
#[cube(launch_unchecked)]
pub fn reduce_accumulator_kernel<F: Float>(
    accumulator: &Array<F>,
    max_variance: F,
    initial_variance: F,
    num_cells: u32,
    live_map: &mut Array<F>,
) {
    let idx = ABSOLUTE_POS;

    if idx >= num_cells {
        terminate!();
    }

    let count = accumulator[num_cells * 2 + idx];
    if count > F::new(0.0) {
        let mean_v = accumulator[num_cells + idx] / count;
        if mean_v > max_variance {
            live_map[idx] = F::new(0.0);
            live_map[num_cells + idx] = initial_variance;
            live_map[num_cells * 2 + idx] = F::new(0.0);
        } else {
            live_map[idx] = accumulator[idx] / count;
            live_map[num_cells + idx] = mean_v;
            live_map[num_cells * 2 + idx] = F::new(1.0);
        }
    }
}

/// Fill invalid cells from the valid neighbor with the smallest signed `di + dj`.
///
/// # Inputs
/// - `heights`: [N] height layer
/// - `validity_mask`: [N] holes below 0.5, sources above 0.5
/// - `width`, `height`: grid extent (row stride is `width`)
/// - `dilation_size`: window half-width
///
/// # Outputs
/// - `output`: [N] filled heights
#[cube(launch_unchecked)]
pub fn dilation_kernel<F: Float>(
    heights: &Array<F>,
    validity_mask: &Array<F>,
    width: u32,
    height: u32,
    dilation_size: u32,
    num_cells: u32,
    output: &mut Array<F>,
) {
    let idx = ABSOLUTE_POS;

    if idx >= num_cells {
        terminate!();
    }

    let threshold = F::new(0.5);
    if validity_mask[idx] >= threshold {
        output[idx] = heights[idx];
    } else {
        let i = (idx / width) as i32;
        let j = (idx % width) as i32;
        let d = dilation_size as i32;
        let rows = height as i32;
        let cols = width as i32;
        let window = dilation_size * 2 + 1;

        let mut found = 0u32;
        let mut best_sum = 0i32;
        let mut best_idx = idx;

        // di outer, dj inner; strict < keeps the first minimum in scan order
        for a in 0..window {
            let di = a as i32 - d;
            let ni = i + di;
            if ni >= 0 && ni < rows {
                for b in 0..window {
                    let dj = b as i32 - d;
                    let nj = j + dj;
                    if nj >= 0 && nj < cols {
                        let n = (ni as u32) * width + (nj as u32);
                        if validity_mask[n] > threshold {
                            let sum = di + dj;
                            if found == 0u32 || sum < best_sum {
                                best_sum = sum;
                                best_idx = n;
                                found = 1u32;
                            }
                        }
                    }
                }
            }
        }

        output[idx] = heights[best_idx];
    }
}

/// Rasterize a polygon given in cell coordinates.
///
/// # Inputs
/// - `vertices`: [M * 2] snapped vertices `(x0, y0, x1, y1, ...)`
/// - `bbox`: [4] snapped bounding box `(min_x, min_y, max_x, max_y)`
/// - `extent`: ray end x, beyond every cell
///
/// # Outputs
/// - `mask`: [N] 1 inside or on the boundary, 0 outside
#[cube(launch_unchecked)]
pub fn polygon_mask_kernel(
    vertices: &Array<i32>,
    bbox: &Array<i32>,
    num_vertices: u32,
    extent: i32,
    width: u32,
    num_cells: u32,
    mask: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;

    if idx >= num_cells {
        terminate!();
    }

    let px = (idx / width) as i32;
    let py = (idx % width) as i32;

    if px < bbox[0] || px > bbox[2] || py < bbox[1] || py > bbox[3] {
        mask[idx] = 0u32;
    } else {
        let ex = extent;
        let ey = py;
        let mut crossings = 0u32;
        let mut on_boundary = 0u32;

        for k in 0..num_vertices {
            let k2 = (k + 1) % num_vertices;
            let ax = vertices[k * 2];
            let ay = vertices[k * 2 + 1];
            let bx = vertices[k2 * 2];
            let by = vertices[k2 * 2 + 1];

            // Orientation codes: 0 colinear, 1 clockwise, 2 counter-clockwise
            // o1 = (a, b, p), o2 = (a, b, e), o3 = (p, e, a), o4 = (p, e, b)
            let v1 = (by - ay) * (px - bx) - (bx - ax) * (py - by);
            let v2 = (by - ay) * (ex - bx) - (bx - ax) * (ey - by);
            let v3 = (ey - py) * (ax - ex) - (ex - px) * (ay - ey);
            let v4 = (ey - py) * (bx - ex) - (ex - px) * (by - ey);

            let mut o1 = 0u32;
            if v1 > 0 {
                o1 = 1u32;
            }
            if v1 < 0 {
                o1 = 2u32;
            }
            let mut o2 = 0u32;
            if v2 > 0 {
                o2 = 1u32;
            }
            if v2 < 0 {
                o2 = 2u32;
            }
            let mut o3 = 0u32;
            if v3 > 0 {
                o3 = 1u32;
            }
            if v3 < 0 {
                o3 = 2u32;
            }
            let mut o4 = 0u32;
            if v4 > 0 {
                o4 = 1u32;
            }
            if v4 < 0 {
                o4 = 2u32;
            }

            // on_segment(s, q, t): q within the box of s..t
            let p_on_ab = (px <= ax || px <= bx)
                && (px >= ax || px >= bx)
                && (py <= ay || py <= by)
                && (py >= ay || py >= by);
            let e_on_ab = (ex <= ax || ex <= bx)
                && (ex >= ax || ex >= bx)
                && (ey <= ay || ey <= by)
                && (ey >= ay || ey >= by);
            let a_on_pe = (ax <= px || ax <= ex)
                && (ax >= px || ax >= ex)
                && (ay <= py || ay <= ey)
                && (ay >= py || ay >= ey);
            let b_on_pe = (bx <= px || bx <= ex)
                && (bx >= px || bx >= ex)
                && (by <= py || by <= ey)
                && (by >= py || by >= ey);

            let intersects = (o1 != o2 && o3 != o4)
                || (o1 == 0u32 && p_on_ab)
                || (o2 == 0u32 && e_on_ab)
                || (o3 == 0u32 && a_on_pe)
                || (o4 == 0u32 && b_on_pe);

            if intersects {
                // orientation(a, p, b)
                let vp = (py - ay) * (bx - px) - (px - ax) * (by - py);
                if vp == 0 {
                    if p_on_ab {
                        on_boundary = 1u32;
                    }
                } else if (ay <= py && by > py) || (ay > py && by <= py) {
                    crossings += 1u32;
                }
            }
        }

        if on_boundary == 1u32 {
            mask[idx] = 1u32;
        } else {
            mask[idx] = crossings % 2u32;
        }
    }
}
