//! Hole filling for the elevation layer.
//!
//! Invalid cells take the height of a nearby valid cell so downstream
//! consumers (planners, visualization) see a gap-free surface. The output is
//! written to a fresh buffer; the map itself is not modified.
//!
//! # Neighbor selection
//!
//! For an invalid cell at `(i, j)` the window `di, dj ∈ [-d, d]` is scanned
//! with `di` (row stride `width`) as the outer loop and `dj` as the inner loop.
//! Among valid neighbors the first one with the strictly smallest signed sum
//! `di + dj` wins. This is not a Euclidean or Manhattan nearest search: the
//! top-left diagonal `(-d, -d)` ranks first when valid.
//!
//! Neighbors outside the grid are skipped, so the window never wraps across
//! rows at the left/right edges.
//!
//! A cell is a hole when its mask is below [`VALIDITY_THRESHOLD`]; a neighbor
//! is a source only when its mask is above it. A cell at exactly the
//! threshold keeps its own height but never fills others.

mod cpu;

pub use cpu::{fill_holes, nearest_valid_neighbor};

/// Validity mask threshold, see the module docs for how ties are treated.
pub const VALIDITY_THRESHOLD: f32 = 0.5;
