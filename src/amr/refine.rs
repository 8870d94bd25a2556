//! Refinement of a leaf cell into its full sibling set.
//!
//! Refining a cell
//! 1. allocates its `2^dim` children, each a verbatim copy of the parent's
//!    state (piecewise-constant injection) inheriting the parent's `xi`;
//! 2. creates the `dim * 2^(dim-1)` interfaces joining the siblings;
//! 3. walks the parent's interfaces at its own level and, for each one,
//!    either splits it into `2^(dim-1)` children wired to the matching new
//!    siblings, or, when the neighbour refined first and those children
//!    already exist, re-points their parent-side reference to the siblings.
//!
//! Matching between interface children and cells is done on tree keys only.

use crate::amr::context::AmrContext;
use crate::geometry::Face;
use crate::mesh_error::AmrError;
use crate::physics::FlowModel;
use crate::topology::cell::Cell;
use crate::topology::interface::{CellInterface, Side};
use crate::topology::point::{CellId, FaceId};
use crate::topology::tree::CellTree;

/// True when refining `id` would put its children two levels above a leaf neighbour.
pub fn lvl_neighbor_too_low<S>(tree: &CellTree<S>, id: CellId) -> Result<bool, AmrError> {
    let cell = tree.cell(id)?;
    for &face_id in &cell.interfaces {
        let face = tree.face(face_id)?;
        if face.is_split() {
            continue;
        }
        match face.other(id) {
            Some(Side::Cell(n)) => {
                if tree.cell(n)?.level < cell.level {
                    return Ok(true);
                }
            }
            Some(Side::Boundary(_)) => {}
            None => {
                return Err(AmrError::BrokenBackReference {
                    face: face_id,
                    cell: id,
                });
            }
        }
    }
    Ok(false)
}

/// Refine an owned leaf cell.
///
/// Returns `Ok(false)` when the refinement is deferred: the cell already sits
/// at `max_level`, or a coarser leaf neighbour would violate 2:1 balance.
pub fn refine_cell<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    ctx: &AmrContext,
    model: &M,
    id: CellId,
) -> Result<bool, AmrError> {
    let cell = tree.cell(id)?;
    if cell.is_split() {
        return Err(AmrError::NotALeaf(id));
    }
    if let Some(owner) = cell.owner() {
        return Err(AmrError::GhostTopologyMismatch {
            key: cell.key,
            owner,
            reason: "ghost cells only change through the mirror".into(),
        });
    }
    if cell.level >= ctx.max_level {
        return Ok(false);
    }
    if lvl_neighbor_too_low(tree, id)? {
        log::trace!("refine of {} deferred: coarser neighbour", cell.key);
        return Ok(false);
    }

    create_children(tree, model, id)?;
    create_internal_interfaces(tree, id)?;

    let level = tree.cell(id)?.level;
    let external: Vec<FaceId> = tree
        .cell(id)?
        .interfaces
        .iter()
        .copied()
        .filter(|f| tree.faces.get(*f).is_some_and(|face| face.level == level))
        .collect();
    for face in external {
        refine_interface(tree, model, face, id)?;
    }
    Ok(true)
}

/// Allocate the full sibling set of `id`, copying the parent's state.
pub(crate) fn create_children<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    model: &M,
    id: CellId,
) -> Result<(), AmrError> {
    let children = (0..tree.children_per_cell())
        .map(|idx| spawn_child(tree, model, id, idx))
        .collect::<Result<Vec<_>, _>>()?;
    tree.cell_mut(id)?.children = children;
    Ok(())
}

/// Allocate child `idx` of `parent` without registering it in the parent's
/// child list. Used for owned refinement and for ghost mirroring.
pub(crate) fn spawn_child<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    model: &M,
    parent: CellId,
    idx: usize,
) -> Result<CellId, AmrError> {
    let dim = tree.dim;
    let p = tree.cell(parent)?;
    let mut child = Cell::new(
        p.key.child(idx, dim),
        p.element.child(idx, dim),
        p.state.clone(),
        model.conservative_len(),
        p.transports.clone(),
        p.owner,
    );
    child.xi = p.xi;
    child.parent = Some(parent);
    Ok(tree.cells.insert(child))
}

/// Create the interfaces joining the children of `id`, owned by `id`.
fn create_internal_interfaces<S>(tree: &mut CellTree<S>, id: CellId) -> Result<(), AmrError> {
    let dim = tree.dim;
    let children = tree.cell(id)?.children.clone();
    let mut internal = Vec::with_capacity(dim << (dim - 1));
    for axis in 0..dim {
        for (idx, &lo) in children.iter().enumerate() {
            if (idx >> axis) & 1 == 1 {
                continue;
            }
            let hi = children[idx | (1 << axis)];
            let lo_cell = tree.cell(lo)?;
            let face = CellInterface::new(
                lo_cell.level,
                lo_cell.key.face(axis, true),
                Face::above(&lo_cell.element, axis),
                lo,
                Side::Cell(hi),
            );
            let fid = tree.faces.insert(face);
            tree.cell_mut(lo)?.attach(fid);
            tree.cell_mut(hi)?.attach(fid);
            internal.push(fid);
        }
    }
    tree.cell_mut(id)?.internal = internal;
    Ok(())
}

/// Bring interface `face_id` of the freshly split cell `cell_id` down to the
/// children's level.
///
/// If the interface is still a leaf it is split and its children wired to
/// the matching siblings (create branch). If the neighbour already refined,
/// the existing children are re-pointed from `cell_id` to the siblings
/// (attach branch).
pub(crate) fn refine_interface<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    model: &M,
    face_id: FaceId,
    cell_id: CellId,
) -> Result<(), AmrError> {
    if tree.face(face_id)?.is_split() {
        attach_interface_children(tree, face_id, cell_id)
    } else {
        split_interface(tree, model, face_id, cell_id)
    }
}

fn split_interface<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    model: &M,
    face_id: FaceId,
    cell_id: CellId,
) -> Result<(), AmrError> {
    let dim = tree.dim;
    let cell_key = tree.cell(cell_id)?.key;
    let face = tree.face(face_id)?.clone();
    let cell_is_left = face.left == cell_id;
    let other = face.other(cell_id).ok_or(AmrError::BrokenBackReference {
        face: face_id,
        cell: cell_id,
    })?;

    let mut children = Vec::with_capacity(tree.children_per_face());
    for j in 0..tree.children_per_face() {
        let key = face.key.child(j, dim);
        let sibling_key = key
            .cell_on_side_of(&cell_key)
            .ok_or(AmrError::BrokenBackReference {
                face: face_id,
                cell: cell_id,
            })?;
        let sibling = tree
            .child_with_key(cell_id, &sibling_key)?
            .ok_or(AmrError::BrokenBackReference {
                face: face_id,
                cell: cell_id,
            })?;
        let far = match other {
            Side::Cell(n) => Side::Cell(n),
            Side::Boundary(tag) => Side::Boundary(model.child_boundary(tag, j)),
        };
        let (left, right) = match (cell_is_left, far) {
            (true, far) => (sibling, far),
            (false, Side::Cell(n)) => (n, Side::Cell(sibling)),
            (false, Side::Boundary(_)) => {
                return Err(AmrError::BrokenBackReference {
                    face: face_id,
                    cell: cell_id,
                });
            }
        };
        let mut child = CellInterface::new(face.level + 1, key, face.face.child(j, dim), left, right);
        child.parent = Some(face_id);
        let fid = tree.faces.insert(child);
        tree.cell_mut(sibling)?.attach(fid);
        if let Side::Cell(n) = far {
            tree.cell_mut(n)?.attach(fid);
        }
        children.push(fid);
    }
    tree.face_mut(face_id)?.children = children;
    Ok(())
}

fn attach_interface_children<S>(
    tree: &mut CellTree<S>,
    face_id: FaceId,
    cell_id: CellId,
) -> Result<(), AmrError> {
    let children = tree.face(face_id)?.children.clone();
    if children.len() != tree.children_per_face() {
        return Err(AmrError::InterfaceChildCount {
            face: face_id,
            found: children.len(),
            expected: tree.children_per_face(),
        });
    }
    let cell_key = tree.cell(cell_id)?.key;
    for child in children {
        let sibling_key = tree
            .face(child)?
            .key
            .cell_on_side_of(&cell_key)
            .ok_or(AmrError::BrokenBackReference {
                face: child,
                cell: cell_id,
            })?;
        let sibling = tree
            .child_with_key(cell_id, &sibling_key)?
            .ok_or(AmrError::BrokenBackReference {
                face: child,
                cell: cell_id,
            })?;
        if !tree.face_mut(child)?.replace_cell(cell_id, sibling) {
            return Err(AmrError::BrokenBackReference {
                face: child,
                cell: cell_id,
            });
        }
        tree.cell_mut(cell_id)?.detach(child);
        tree.cell_mut(sibling)?.attach(child);
    }
    Ok(())
}
