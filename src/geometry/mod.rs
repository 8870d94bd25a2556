//! Geometric descriptors attached to tree entities.
//!
//! Cells carry an [`Element`] (volume, characteristic length, centre, extent)
//! and interfaces a [`Face`] (orientation frame, surface, centre, extent).
//! Both are immutable once created; refinement derives child geometry from the
//! parent by halving extents along the active axes.

pub mod element;
pub mod face;

pub use element::Element;
pub use face::Face;

/// A point or vector in physical space.
pub type Coord = [f64; 3];

pub(crate) fn unit(axis: usize) -> Coord {
    let mut v = [0.0; 3];
    v[axis] = 1.0;
    v
}

pub(crate) fn distance(a: Coord, b: Coord) -> f64 {
    let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
}
