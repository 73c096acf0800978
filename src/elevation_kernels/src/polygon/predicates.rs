//! Exact orientation predicates on integer cell coordinates.

/// A point in grid-cell space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellPoint {
    pub x: i64,
    pub y: i64,
}

impl CellPoint {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl From<(usize, usize)> for CellPoint {
    fn from((x, y): (usize, usize)) -> Self {
        Self::new(x as i64, y as i64)
    }
}

/// Turn direction of an ordered triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Colinear,
    Clockwise,
    CounterClockwise,
}

/// Orientation of the triplet `(p, q, r)`.
#[inline]
pub fn orientation(p: CellPoint, q: CellPoint, r: CellPoint) -> Orientation {
    let val = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);
    match val {
        0 => Orientation::Colinear,
        v if v > 0 => Orientation::Clockwise,
        _ => Orientation::CounterClockwise,
    }
}

/// Whether `q` lies within the bounding box of segment `pr`.
///
/// Only meaningful when `p`, `q`, `r` are colinear.
#[inline]
pub fn on_segment(p: CellPoint, q: CellPoint, r: CellPoint) -> bool {
    q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
}

/// Whether segments `p1q1` and `p2q2` share at least one point.
pub fn segments_intersect(p1: CellPoint, q1: CellPoint, p2: CellPoint, q2: CellPoint) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    // Colinear touching cases
    (o1 == Orientation::Colinear && on_segment(p1, p2, q1))
        || (o2 == Orientation::Colinear && on_segment(p1, q2, q1))
        || (o3 == Orientation::Colinear && on_segment(p2, p1, q2))
        || (o4 == Orientation::Colinear && on_segment(p2, q1, q2))
}
