//! Per-level registries of cells and interfaces.
//!
//! Rebuilt after every topology change. Every list is in depth-first order
//! from the sorted level-0 roots with children visited by sibling index, so
//! two ranks walking the same subtree see the same sequence. The split-flag
//! stream and the ghost links both depend on that ordering.

use crate::mesh_error::AmrError;
use crate::topology::point::{CellId, FaceId};
use crate::topology::tree::CellTree;

#[derive(Debug, Clone, Default)]
pub struct LevelRegistry {
    /// Locally owned cells, split or leaf.
    cells: Vec<Vec<CellId>>,
    ghosts: Vec<Vec<CellId>>,
    /// Every interface, split or leaf.
    interfaces: Vec<Vec<FaceId>>,
}

impl LevelRegistry {
    /// Walk `tree` and bucket every cell and interface by level.
    pub fn rebuild<S>(tree: &CellTree<S>) -> Result<Self, AmrError> {
        let mut reg = Self::default();
        for &root in tree.roots() {
            reg.visit_cell(tree, root)?;
        }
        for &face in tree.root_faces() {
            reg.visit_face(tree, face)?;
        }
        log::trace!(
            "level registry: {} levels, {} owned cells",
            reg.num_levels(),
            reg.cells.iter().map(Vec::len).sum::<usize>()
        );
        Ok(reg)
    }

    fn visit_cell<S>(&mut self, tree: &CellTree<S>, id: CellId) -> Result<(), AmrError> {
        let cell = tree.cell(id)?;
        let level = cell.level as usize;
        let bucket = if cell.is_ghost() {
            &mut self.ghosts
        } else {
            &mut self.cells
        };
        slot(bucket, level).push(id);
        for &face in &cell.internal {
            self.visit_face(tree, face)?;
        }
        for &child in &cell.children {
            self.visit_cell(tree, child)?;
        }
        Ok(())
    }

    fn visit_face<S>(&mut self, tree: &CellTree<S>, id: FaceId) -> Result<(), AmrError> {
        let face = tree.face(id)?;
        slot(&mut self.interfaces, face.level as usize).push(id);
        for &child in &face.children {
            self.visit_face(tree, child)?;
        }
        Ok(())
    }

    /// One past the deepest level holding a cell.
    pub fn num_levels(&self) -> usize {
        self.cells.len().max(self.ghosts.len())
    }

    pub fn cells_at(&self, level: u8) -> &[CellId] {
        self.cells.get(level as usize).map_or(&[], Vec::as_slice)
    }

    pub fn ghosts_at(&self, level: u8) -> &[CellId] {
        self.ghosts.get(level as usize).map_or(&[], Vec::as_slice)
    }

    pub fn interfaces_at(&self, level: u8) -> &[FaceId] {
        self.interfaces.get(level as usize).map_or(&[], Vec::as_slice)
    }

    /// Owned leaf cells over every level (the cells a solver updates).
    pub fn leaf_cells<'a, S>(&'a self, tree: &'a CellTree<S>) -> impl Iterator<Item = CellId> + 'a {
        self.cells
            .iter()
            .flatten()
            .copied()
            .filter(move |id| tree.cells.get(*id).is_some_and(|c| !c.is_split()))
    }

    /// Leaf interfaces over every level (the ones fluxes are computed on).
    pub fn leaf_interfaces<'a, S>(
        &'a self,
        tree: &'a CellTree<S>,
    ) -> impl Iterator<Item = FaceId> + 'a {
        self.interfaces
            .iter()
            .flatten()
            .copied()
            .filter(move |id| tree.faces.get(*id).is_some_and(|f| !f.is_split()))
    }

    /// Number of owned leaf cells.
    pub fn amr_cell_count<S>(&self, tree: &CellTree<S>) -> usize {
        self.leaf_cells(tree).count()
    }

    /// Owned leaf count per level.
    pub fn leaves_per_level<S>(&self, tree: &CellTree<S>) -> Vec<usize> {
        self.cells
            .iter()
            .map(|ids| {
                ids.iter()
                    .filter(|id| tree.cells.get(**id).is_some_and(|c| !c.is_split()))
                    .count()
            })
            .collect()
    }
}

fn slot<T>(buckets: &mut Vec<Vec<T>>, level: usize) -> &mut Vec<T> {
    if buckets.len() <= level {
        buckets.resize_with(level + 1, Vec::new);
    }
    &mut buckets[level]
}
