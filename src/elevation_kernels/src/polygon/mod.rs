//! Polygon rasterization onto the elevation grid.
//!
//! Produces a 0/1 mask with one entry per cell, marking cells inside a
//! world-frame polygon. All geometry is evaluated in integer cell
//! coordinates: vertices and the bounding box are snapped to cells with the
//! same clamped indexing the map uses, so the mask is consistent with the
//! grid's own discretization.
//!
//! # Algorithm
//!
//! For each cell `p`:
//! 1. Outside the bounding box (in cell space): 0.
//! 2. Cast a ray from `p` to `(extent, p.y)` far outside the grid. For every
//!    edge `p1 p2` the ray touches:
//!    - `p` colinear with and on the edge: 1, done (boundary inclusion);
//!    - otherwise count the edge if it straddles the ray's row,
//!      `(p1.y <= p.y && p2.y > p.y) || (p1.y > p.y && p2.y <= p.y)`.
//! 3. Odd count: 1, even: 0.
//!
//! The half-open straddle rule counts a vertex lying on the ray exactly once.

mod predicates;

pub use predicates::{on_segment, orientation, segments_intersect, CellPoint, Orientation};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::grid::GridGeometry;

/// An implicitly closed polygon in world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    vertices: Vec<[f32; 2]>,
    /// `[min_x, min_y, max_x, max_y]`
    bbox: [f32; 4],
}

impl Polygon {
    /// Polygon with its bounding box computed from the vertices.
    pub fn new(vertices: Vec<[f32; 2]>) -> Self {
        let bbox = vertices.iter().fold(
            [f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY],
            |[min_x, min_y, max_x, max_y], &[x, y]| {
                [min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y)]
            },
        );
        Self { vertices, bbox }
    }

    /// Polygon with an explicit bounding box `[min_x, min_y, max_x, max_y]`.
    ///
    /// Cells outside the box are never marked, even if inside the polygon.
    pub fn with_bounding_box(vertices: Vec<[f32; 2]>, bbox: [f32; 4]) -> Self {
        Self { vertices, bbox }
    }

    pub fn vertices(&self) -> &[[f32; 2]] {
        &self.vertices
    }

    pub fn bounding_box(&self) -> [f32; 4] {
        self.bbox
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertices snapped to clamped cell coordinates.
    pub fn cell_vertices(
        &self,
        geometry: &GridGeometry,
        center_x: f32,
        center_y: f32,
    ) -> Vec<CellPoint> {
        self.vertices
            .iter()
            .map(|&[x, y]| geometry.clamped_cell(x, y, center_x, center_y).into())
            .collect()
    }

    /// Bounding box corners snapped to clamped cell coordinates.
    pub fn cell_bounding_box(
        &self,
        geometry: &GridGeometry,
        center_x: f32,
        center_y: f32,
    ) -> (CellPoint, CellPoint) {
        let [min_x, min_y, max_x, max_y] = self.bbox;
        (
            geometry.clamped_cell(min_x, min_y, center_x, center_y).into(),
            geometry.clamped_cell(max_x, max_y, center_x, center_y).into(),
        )
    }
}

/// Ray end x coordinate, beyond every cell and snapped vertex of the grid.
pub fn ray_extent(geometry: &GridGeometry) -> i64 {
    2 * geometry.width.max(geometry.height) as i64
}

/// Point-in-polygon test for one cell against snapped vertices.
pub fn cell_in_polygon(p: CellPoint, vertices: &[CellPoint], extent: i64) -> bool {
    let n = vertices.len();
    let extreme = CellPoint::new(extent, p.y);
    let mut crossings = 0usize;

    for j in 0..n {
        let p1 = vertices[j];
        let p2 = vertices[(j + 1) % n];
        if !segments_intersect(p1, p2, p, extreme) {
            continue;
        }
        if orientation(p1, p, p2) == Orientation::Colinear {
            if on_segment(p1, p, p2) {
                return true;
            }
        } else if (p1.y <= p.y && p2.y > p.y) || (p1.y > p.y && p2.y <= p.y) {
            crossings += 1;
        }
    }
    crossings % 2 == 1
}

/// Rasterize `polygon` into a `width * height` 0/1 mask.
///
/// Mask entry `idx` corresponds to cell `geometry.cell_coords(idx)`.
pub fn rasterize_polygon(
    geometry: &GridGeometry,
    polygon: &Polygon,
    center_x: f32,
    center_y: f32,
) -> Vec<u8> {
    let vertices = polygon.cell_vertices(geometry, center_x, center_y);
    let (bmin, bmax) = polygon.cell_bounding_box(geometry, center_x, center_y);
    let extent = ray_extent(geometry);

    let mask: Vec<u8> = (0..geometry.num_cells())
        .into_par_iter()
        .map(|idx| {
            let p: CellPoint = geometry.cell_coords(idx).into();
            if p.x < bmin.x || p.x > bmax.x || p.y < bmin.y || p.y > bmax.y {
                return 0;
            }
            u8::from(cell_in_polygon(p, &vertices, extent))
        })
        .collect();

    debug!(
        vertices = vertices.len(),
        inside = mask.iter().filter(|&&m| m == 1).count(),
        "rasterized polygon"
    );
    mask
}
