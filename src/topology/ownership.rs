//! Ownership metadata for level-0 cells.
//!
//! The [`CellOwnership`] map records which rank owns each block of the root
//! lattice. It is the given domain decomposition: descendants are owned by
//! whoever owns their level-0 ancestor, and a cell is a ghost on every other
//! rank that holds a copy of it.

use crate::mesh_error::AmrError;
use crate::topology::tree_key::TreeKey;
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CellOwnership {
    /// Root lattice size per axis (unused axes are 1).
    grid: [u32; 3],
    /// Owner per root, x fastest.
    owners: Vec<usize>,
}

impl CellOwnership {
    /// Every root owned by `rank`.
    pub fn uniform(grid: [u32; 3], rank: usize) -> Self {
        let n = grid.iter().map(|&g| g as usize).product();
        Self {
            grid,
            owners: vec![rank; n],
        }
    }

    /// Build from an explicit owner list (x fastest).
    pub fn from_owners(grid: [u32; 3], owners: Vec<usize>) -> Result<Self, AmrError> {
        let n: usize = grid.iter().map(|&g| g as usize).product();
        if owners.len() != n {
            return Err(AmrError::InvalidConfig(format!(
                "ownership lists {} roots for a {}x{}x{} lattice",
                owners.len(),
                grid[0],
                grid[1],
                grid[2]
            )));
        }
        Ok(Self { grid, owners })
    }

    /// Contiguous slabs along `axis`, one per rank.
    pub fn slabs(grid: [u32; 3], axis: usize, size: usize) -> Self {
        let n = grid[axis] as usize;
        let mut owners = Vec::with_capacity(grid.iter().map(|&g| g as usize).product());
        for k in 0..grid[2] {
            for j in 0..grid[1] {
                for i in 0..grid[0] {
                    let c = [i, j, k][axis] as usize;
                    owners.push((c * size / n.max(1)).min(size.saturating_sub(1)));
                }
            }
        }
        Self { grid, owners }
    }

    pub fn grid(&self) -> [u32; 3] {
        self.grid
    }

    fn index(&self, coords: [u32; 3]) -> Option<usize> {
        if (0..3).any(|a| coords[a] >= self.grid[a]) {
            return None;
        }
        let [i, j, k] = coords.map(|c| c as usize);
        let [nx, ny, _] = self.grid.map(|c| c as usize);
        Some(i + nx * (j + ny * k))
    }

    /// Owner of the root at `coords`.
    pub fn owner_of_root(&self, coords: [u32; 3]) -> Option<usize> {
        self.index(coords).map(|idx| self.owners[idx])
    }

    /// Owner of any cell, through its level-0 ancestor.
    pub fn owner(&self, key: &TreeKey) -> Option<usize> {
        let shift = key.level as u32;
        self.owner_of_root(key.coords.map(|c| c >> shift))
    }

    pub fn is_ghost(&self, key: &TreeKey, my_rank: usize) -> Option<bool> {
        self.owner(key).map(|owner| owner != my_rank)
    }

    /// Ranks owning a root that shares a face with a root of `my_rank`.
    pub fn neighbour_ranks(&self, my_rank: usize) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        for k in 0..self.grid[2] {
            for j in 0..self.grid[1] {
                for i in 0..self.grid[0] {
                    let here = [i, j, k];
                    if self.owner_of_root(here) != Some(my_rank) {
                        continue;
                    }
                    for axis in 0..3 {
                        for up in [false, true] {
                            let key = TreeKey::root(here);
                            if let Some(n) = key.neighbor(axis, up) {
                                match self.owner_of_root(n.coords) {
                                    Some(o) if o != my_rank => {
                                        out.insert(o);
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }
}
