//! Per-interface geometry.

use super::{Coord, Element, distance, unit};

/// Geometric descriptor of a cell interface.
///
/// Faces are axis-aligned. `normal` points from the left cell to the right
/// side; `tangent` and `binormal` complete a right-handed frame.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Face {
    /// Normal axis (0, 1 or 2).
    pub axis: usize,
    pub normal: Coord,
    pub tangent: Coord,
    pub binormal: Coord,
    pub surface: f64,
    pub position: Coord,
    /// Size along each axis; zero along the normal.
    pub extent: Coord,
}

impl Face {
    /// Face with normal `±e_axis` centred at `position`.
    pub fn cartesian(axis: usize, outward_positive: bool, position: Coord, mut extent: Coord) -> Self {
        extent[axis] = 0.0;
        let surface = (0..3).filter(|&a| a != axis).map(|a| extent[a]).product();
        let sign = if outward_positive { 1.0 } else { -1.0 };
        let mut normal = unit(axis);
        normal[axis] = sign;
        let mut tangent = unit((axis + 1) % 3);
        tangent[(axis + 1) % 3] = sign;
        Self {
            axis,
            normal,
            tangent,
            binormal: unit((axis + 2) % 3),
            surface,
            position,
            extent,
        }
    }

    /// The face on the upper side of `element` along `axis`, oriented upward.
    pub fn above(element: &Element, axis: usize) -> Self {
        let mut position = element.position;
        position[axis] += 0.5 * element.extent[axis];
        Self::cartesian(axis, true, position, element.extent)
    }

    /// The face on the lower side of `element` along `axis`.
    pub fn below(element: &Element, axis: usize, outward_positive: bool) -> Self {
        let mut position = element.position;
        position[axis] -= 0.5 * element.extent[axis];
        Self::cartesian(axis, outward_positive, position, element.extent)
    }

    /// Geometry of child `j`; bits of `j` walk the active tangent axes in
    /// increasing order.
    pub fn child(&self, j: usize, dim: usize) -> Self {
        let mut position = self.position;
        let mut extent = self.extent;
        let mut split = 0;
        for (bit, axis) in (0..dim).filter(|&a| a != self.axis).enumerate() {
            let sign = if (j >> bit) & 1 == 1 { 1.0 } else { -1.0 };
            position[axis] += sign * 0.25 * self.extent[axis];
            extent[axis] *= 0.5;
            split += 1;
        }
        Self {
            position,
            extent,
            surface: self.surface / (1usize << split) as f64,
            ..*self
        }
    }

    pub fn distance_to(&self, point: Coord) -> f64 {
        distance(self.position, point)
    }

    /// Largest tangent extent, the length scale for position tolerances.
    pub fn size(&self) -> f64 {
        self.extent.iter().copied().fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartering_a_3d_face() {
        let cell = Element::cartesian([0.5, 0.5, 0.5], [1.0, 1.0, 1.0], 3);
        let face = Face::above(&cell, 0);
        assert_eq!(face.position, [1.0, 0.5, 0.5]);
        assert_eq!(face.surface, 1.0);
        let kids: Vec<_> = (0..4).map(|j| face.child(j, 3)).collect();
        assert_eq!(kids[0].position, [1.0, 0.25, 0.25]);
        assert_eq!(kids[1].position, [1.0, 0.75, 0.25]);
        assert_eq!(kids[2].position, [1.0, 0.25, 0.75]);
        assert!(kids.iter().all(|k| (k.surface - 0.25).abs() < 1e-15));
    }

    #[test]
    fn one_dimensional_face_does_not_split_geometry() {
        let cell = Element::cartesian([0.5, 0.5, 0.5], [1.0, 1.0, 1.0], 1);
        let face = Face::below(&cell, 0, false);
        assert_eq!(face.normal, [-1.0, 0.0, 0.0]);
        let kid = face.child(0, 1);
        assert_eq!(kid.position, face.position);
        assert_eq!(kid.surface, face.surface);
    }
}
