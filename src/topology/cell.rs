//! Tree node representing one control volume at one refinement level.

use crate::geometry::Element;
use crate::topology::point::{CellId, FaceId};
use crate::topology::tree_key::TreeKey;

/// A cell of the refinement tree.
///
/// A leaf cell owns the authoritative physical state. A split cell holds
/// exactly `2^dim` children (ghost copies hold only the children adjacent to
/// local cells) and its own state is inert until the children are merged back.
#[derive(Debug, Clone)]
pub struct Cell<S> {
    pub level: u8,
    pub key: TreeKey,
    pub element: Element,
    /// Physical state, opaque to the engine.
    pub state: S,
    /// Conservative flux accumulator.
    pub cons: Vec<f64>,
    /// Passive transported scalars.
    pub transports: Vec<f64>,
    /// Refinement indicator, reset every cycle.
    pub xi: f64,
    pub(crate) interfaces: Vec<FaceId>,
    pub(crate) children: Vec<CellId>,
    /// Interfaces joining the children, owned by this cell.
    pub(crate) internal: Vec<FaceId>,
    pub(crate) parent: Option<CellId>,
    /// Owning rank for ghost copies, `None` for locally owned cells.
    pub(crate) owner: Option<usize>,
}

impl<S> Cell<S> {
    pub(crate) fn new(
        key: TreeKey,
        element: Element,
        state: S,
        cons_len: usize,
        transports: Vec<f64>,
        owner: Option<usize>,
    ) -> Self {
        Self {
            level: key.level,
            key,
            element,
            state,
            cons: vec![0.0; cons_len],
            transports,
            xi: 0.0,
            interfaces: Vec::new(),
            children: Vec::new(),
            internal: Vec::new(),
            parent: None,
            owner,
        }
    }

    pub fn is_split(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_ghost(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<usize> {
        self.owner
    }

    pub fn interfaces(&self) -> &[FaceId] {
        &self.interfaces
    }

    pub fn children(&self) -> &[CellId] {
        &self.children
    }

    pub fn internal_interfaces(&self) -> &[FaceId] {
        &self.internal
    }

    pub fn parent(&self) -> Option<CellId> {
        self.parent
    }

    pub(crate) fn attach(&mut self, face: FaceId) {
        if !self.interfaces.contains(&face) {
            self.interfaces.push(face);
        }
    }

    pub(crate) fn detach(&mut self, face: FaceId) {
        self.interfaces.retain(|f| *f != face);
    }
}
