//! Per-cell geometry.

use super::Coord;

/// Immutable geometric data of one control volume.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Element {
    pub volume: f64,
    /// Characteristic length (smallest active extent), used for CFL-type estimates.
    pub lcar: f64,
    /// Centre of the cell.
    pub position: Coord,
    /// Size along each axis. Inactive axes keep the unit depth of the domain.
    pub extent: Coord,
}

impl Element {
    /// Axis-aligned box centred at `position`.
    pub fn cartesian(position: Coord, extent: Coord, dim: usize) -> Self {
        let volume = extent.iter().product();
        let lcar = extent
            .iter()
            .take(dim)
            .copied()
            .fold(f64::INFINITY, f64::min);
        Self {
            volume,
            lcar,
            position,
            extent,
        }
    }

    /// Geometry of child `idx`: offset by a quarter extent on each active axis.
    pub fn child(&self, idx: usize, dim: usize) -> Self {
        let mut position = self.position;
        let mut extent = self.extent;
        for axis in 0..dim {
            let sign = if (idx >> axis) & 1 == 1 { 1.0 } else { -1.0 };
            position[axis] += sign * 0.25 * self.extent[axis];
            extent[axis] *= 0.5;
        }
        Self {
            volume: self.volume / (1usize << dim) as f64,
            lcar: self.lcar * 0.5,
            position,
            extent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_tile_the_parent() {
        let parent = Element::cartesian([0.5, 0.5, 0.5], [1.0, 1.0, 1.0], 2);
        let kids: Vec<_> = (0..4).map(|i| parent.child(i, 2)).collect();
        let total: f64 = kids.iter().map(|k| k.volume).sum();
        assert!((total - parent.volume).abs() < 1e-14);
        assert_eq!(kids[0].position, [0.25, 0.25, 0.5]);
        assert_eq!(kids[3].position, [0.75, 0.75, 0.5]);
        assert_eq!(kids[1].extent, [0.5, 0.5, 1.0]);
        assert_eq!(kids[2].lcar, 0.5);
    }
}
