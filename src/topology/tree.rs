//! Arena-backed storage for the cell/interface tree.

use crate::mesh_error::AmrError;
use crate::topology::arena::Arena;
use crate::topology::cell::Cell;
use crate::topology::interface::{CellInterface, Side};
use crate::topology::point::{CellId, FaceId};
use crate::topology::tree_key::TreeKey;

/// Cells and interfaces of one process, plus the ordered level-0 roots.
///
/// Children are owned through handles: freeing a subtree releases its slots
/// and any handle still held elsewhere stops resolving.
#[derive(Debug, Clone)]
pub struct CellTree<S> {
    pub(crate) dim: usize,
    pub(crate) cells: Arena<Cell<S>, CellId>,
    pub(crate) faces: Arena<CellInterface, FaceId>,
    /// Level-0 cells (local and ghost), sorted by key.
    pub(crate) roots: Vec<CellId>,
    /// Level-0 interfaces in creation order.
    pub(crate) root_faces: Vec<FaceId>,
}

impl<S> CellTree<S> {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            cells: Arena::new(),
            faces: Arena::new(),
            roots: Vec::new(),
            root_faces: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of children of a split cell.
    pub fn children_per_cell(&self) -> usize {
        1 << self.dim
    }

    /// Number of children of a split interface.
    pub fn children_per_face(&self) -> usize {
        1 << (self.dim - 1)
    }

    pub fn roots(&self) -> &[CellId] {
        &self.roots
    }

    pub fn root_faces(&self) -> &[FaceId] {
        &self.root_faces
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn cell(&self, id: CellId) -> Result<&Cell<S>, AmrError> {
        self.cells.get(id).ok_or(AmrError::UnknownCell(id))
    }

    pub fn cell_mut(&mut self, id: CellId) -> Result<&mut Cell<S>, AmrError> {
        self.cells.get_mut(id).ok_or(AmrError::UnknownCell(id))
    }

    pub fn face(&self, id: FaceId) -> Result<&CellInterface, AmrError> {
        self.faces.get(id).ok_or(AmrError::UnknownInterface(id))
    }

    pub fn face_mut(&mut self, id: FaceId) -> Result<&mut CellInterface, AmrError> {
        self.faces.get_mut(id).ok_or(AmrError::UnknownInterface(id))
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell<S>)> + '_ {
        self.cells.iter()
    }

    pub fn faces(&self) -> impl Iterator<Item = (FaceId, &CellInterface)> + '_ {
        self.faces.iter()
    }

    /// Find the root with the given key.
    pub fn root_by_key(&self, key: &TreeKey) -> Option<CellId> {
        self.roots
            .binary_search_by(|id| match self.cells.get(*id) {
                Some(cell) => cell.key.cmp(key),
                None => std::cmp::Ordering::Less,
            })
            .ok()
            .map(|idx| self.roots[idx])
    }

    /// Find a cell by key by descending from its level-0 ancestor.
    pub fn find_by_key(&self, key: &TreeKey) -> Option<CellId> {
        let mut path = vec![*key];
        while let Some(parent) = path.last().and_then(|k| k.parent(self.dim)) {
            path.push(parent);
        }
        let root_key = path.pop()?;
        let mut current = self.root_by_key(&root_key)?;
        while let Some(next) = path.pop() {
            let cell = self.cells.get(current)?;
            current = cell
                .children
                .iter()
                .copied()
                .find(|c| self.cells.get(*c).is_some_and(|child| child.key == next))?;
        }
        Some(current)
    }

    /// Child of `parent` with the given key.
    ///
    /// Owned children sit at their sibling index; ghost copies may hold a
    /// subset, so fall back to a scan.
    pub fn child_with_key(&self, parent: CellId, key: &TreeKey) -> Result<Option<CellId>, AmrError> {
        let cell = self.cell(parent)?;
        let idx = key.child_index(self.dim);
        if let Some(&candidate) = cell.children.get(idx) {
            if self.cell(candidate)?.key == *key {
                return Ok(Some(candidate));
            }
        }
        for &child in &cell.children {
            if self.cell(child)?.key == *key {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// The cell on the other side of `face` from `cell`, if any.
    pub fn neighbor_across(&self, face: FaceId, cell: CellId) -> Result<Option<CellId>, AmrError> {
        match self.face(face)?.other(cell) {
            Some(Side::Cell(c)) => Ok(Some(c)),
            Some(Side::Boundary(_)) => Ok(None),
            None => Err(AmrError::BrokenBackReference { face, cell }),
        }
    }

    /// Leaf cells in depth-first order from the roots, children by sibling index.
    pub fn leaves(&self) -> Vec<CellId> {
        let mut out = Vec::new();
        for &root in &self.roots {
            self.collect_leaves(root, &mut out);
        }
        out
    }

    fn collect_leaves(&self, id: CellId, out: &mut Vec<CellId>) {
        if let Some(cell) = self.cells.get(id) {
            if cell.children.is_empty() {
                out.push(id);
            } else {
                for &child in &cell.children {
                    self.collect_leaves(child, out);
                }
            }
        }
    }
}
