//! Cell interfaces: the shared face between two cells, or a cell and a boundary.

use crate::geometry::Face;
use crate::topology::point::{CellId, FaceId};
use crate::topology::tree_key::FaceKey;

/// Opaque boundary-condition descriptor, produced and interpreted by the flow model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct BoundaryTag(pub u32);

/// What lies on the right-hand side of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Cell(CellId),
    Boundary(BoundaryTag),
}

impl Side {
    pub fn cell(self) -> Option<CellId> {
        match self {
            Side::Cell(c) => Some(c),
            Side::Boundary(_) => None,
        }
    }
}

/// Interface between two cells (or a cell and the domain boundary).
///
/// Left/right are non-owning back-references. An interface may be split into
/// `2^(dim-1)` children independently of its cells; children always sit one
/// level below their parent.
#[derive(Debug, Clone)]
pub struct CellInterface {
    pub level: u8,
    pub key: FaceKey,
    pub face: Face,
    pub(crate) left: CellId,
    pub(crate) right: Side,
    pub(crate) children: Vec<FaceId>,
    pub(crate) parent: Option<FaceId>,
}

impl CellInterface {
    pub(crate) fn new(level: u8, key: FaceKey, face: Face, left: CellId, right: Side) -> Self {
        Self {
            level,
            key,
            face,
            left,
            right,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn left(&self) -> CellId {
        self.left
    }

    pub fn right(&self) -> Side {
        self.right
    }

    pub fn children(&self) -> &[FaceId] {
        &self.children
    }

    pub fn parent(&self) -> Option<FaceId> {
        self.parent
    }

    pub fn is_split(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self.right, Side::Boundary(_))
    }

    /// Both adjacent cells, when this is not a boundary interface.
    pub fn cells(&self) -> Option<(CellId, CellId)> {
        self.right.cell().map(|r| (self.left, r))
    }

    pub fn touches(&self, cell: CellId) -> bool {
        self.left == cell || self.right == Side::Cell(cell)
    }

    /// The side opposite to `cell`, or `None` if `cell` is not adjacent.
    pub fn other(&self, cell: CellId) -> Option<Side> {
        if self.left == cell {
            Some(self.right)
        } else if self.right == Side::Cell(cell) {
            Some(Side::Cell(self.left))
        } else {
            None
        }
    }

    /// Re-point whichever side references `old` at `new`. Returns false if
    /// `old` is not adjacent.
    pub(crate) fn replace_cell(&mut self, old: CellId, new: CellId) -> bool {
        if self.left == old {
            self.left = new;
            true
        } else if self.right == Side::Cell(old) {
            self.right = Side::Cell(new);
            true
        } else {
            false
        }
    }
}
