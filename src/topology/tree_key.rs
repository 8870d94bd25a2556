//! Tree coordinates for cells and cell interfaces.
//!
//! A [`TreeKey`] places a cell on the integer lattice of its refinement level:
//! level-0 cells use their Cartesian block indices, and child `idx` of a cell
//! at `coords` sits at `2 * coords + bit(idx, axis)` on every active axis.
//! A [`FaceKey`] places an interface on the face lattice of its level: along
//! its normal axis the coordinate is the index of the face plane, along the
//! tangent axes it matches the adjacent cells.
//!
//! Keys are global: two processes holding copies of the same cell or interface
//! compute the same key, which is what the ghost mirror and the split-flag
//! stream rely on.

use std::fmt;

/// Position of a cell in the refinement tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct TreeKey {
    /// Refinement level (0 is the coarsest).
    pub level: u8,
    /// Integer coordinates at the given level (unused axes stay 0).
    pub coords: [u32; 3],
}

impl TreeKey {
    pub const fn root(coords: [u32; 3]) -> Self {
        Self { level: 0, coords }
    }

    /// Returns the parent key, or `None` for a level-0 cell.
    pub fn parent(&self, dim: usize) -> Option<Self> {
        if self.level == 0 {
            return None;
        }
        let mut coords = self.coords;
        for coord in coords.iter_mut().take(dim) {
            *coord /= 2;
        }
        Some(Self {
            level: self.level - 1,
            coords,
        })
    }

    /// Key of child `idx` (bit `a` of `idx` selects the upper half along axis `a`).
    pub fn child(&self, idx: usize, dim: usize) -> Self {
        let mut coords = self.coords;
        for (axis, coord) in coords.iter_mut().enumerate().take(dim) {
            *coord = *coord * 2 + ((idx >> axis) & 1) as u32;
        }
        Self {
            level: self.level + 1,
            coords,
        }
    }

    /// The `2^dim` children in sibling order.
    pub fn children(&self, dim: usize) -> Vec<Self> {
        (0..1usize << dim).map(|idx| self.child(idx, dim)).collect()
    }

    /// Flattened index of this cell among its siblings.
    ///
    /// This is the inverse of [`TreeKey::child`] and the order in which both
    /// owned and ghost children are stored.
    pub fn child_index(&self, dim: usize) -> usize {
        (0..dim).fold(0usize, |acc, axis| {
            acc | (((self.coords[axis] & 1) as usize) << axis)
        })
    }

    /// Neighbouring key on the same level, `None` when it would leave the lattice at 0.
    pub fn neighbor(&self, axis: usize, upward: bool) -> Option<Self> {
        let mut coords = self.coords;
        coords[axis] = if upward {
            coords[axis].checked_add(1)?
        } else {
            coords[axis].checked_sub(1)?
        };
        Some(Self {
            level: self.level,
            coords,
        })
    }

    /// Key of the face on the lower (`upward == false`) or upper side along `axis`.
    pub fn face(&self, axis: usize, upward: bool) -> FaceKey {
        let mut coords = self.coords;
        if upward {
            coords[axis] += 1;
        }
        FaceKey {
            level: self.level,
            axis: axis as u8,
            coords,
        }
    }
}

impl fmt::Display for TreeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [i, j, k] = self.coords;
        write!(f, "L{}({i},{j},{k})", self.level)
    }
}

/// Position of a cell interface on the face lattice.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct FaceKey {
    pub level: u8,
    /// Normal axis.
    pub axis: u8,
    pub coords: [u32; 3],
}

impl FaceKey {
    fn normal(&self) -> usize {
        self.axis as usize
    }

    /// Active axes other than the normal, in increasing order.
    pub fn tangent_axes(&self, dim: usize) -> impl Iterator<Item = usize> + '_ {
        (0..dim).filter(move |&a| a != self.normal())
    }

    /// Key of child `j` (bits of `j` walk the tangent axes in increasing order).
    pub fn child(&self, j: usize, dim: usize) -> Self {
        let mut coords = self.coords;
        coords[self.normal()] *= 2;
        for (bit, axis) in self.tangent_axes(dim).enumerate() {
            coords[axis] = coords[axis] * 2 + ((j >> bit) & 1) as u32;
        }
        Self {
            level: self.level + 1,
            axis: self.axis,
            coords,
        }
    }

    /// The `2^(dim-1)` children in interface-child order.
    pub fn children(&self, dim: usize) -> Vec<Self> {
        (0..1usize << (dim - 1)).map(|j| self.child(j, dim)).collect()
    }

    /// Same-level cell on the lower side of this face.
    pub fn cell_below(&self) -> Option<TreeKey> {
        let mut coords = self.coords;
        coords[self.normal()] = coords[self.normal()].checked_sub(1)?;
        Some(TreeKey {
            level: self.level,
            coords,
        })
    }

    /// Same-level cell on the upper side of this face.
    pub fn cell_above(&self) -> TreeKey {
        TreeKey {
            level: self.level,
            coords: self.coords,
        }
    }

    /// Whether `cell` (at any level not finer than the face) lies below this face.
    pub fn is_above(&self, cell: &TreeKey) -> bool {
        let shift = self.level.saturating_sub(cell.level);
        let cell_plane = (cell.coords[self.normal()] as u64 + 1) << shift;
        cell_plane == self.coords[self.normal()] as u64
    }

    /// Same-level cell adjacent to this face on the side where `cell` lies.
    pub fn cell_on_side_of(&self, cell: &TreeKey) -> Option<TreeKey> {
        if self.is_above(cell) {
            self.cell_below()
        } else {
            Some(self.cell_above())
        }
    }
}

impl fmt::Display for FaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [i, j, k] = self.coords;
        write!(f, "L{}[{}]({i},{j},{k})", self.level, self.axis)
    }
}
