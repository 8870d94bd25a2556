//! Unrefinement of a split cell whose children are all leaves.
//!
//! The parent's state is rebuilt from its children: their conservative
//! vectors are summed into the parent's flux accumulator, averaged over the
//! `2^dim` equal-volume children, and passed through the model's rebuild
//! (primitive recovery plus relaxation). Transport scalars are averaged
//! arithmetically. The children, their internal interfaces, and every
//! interface child no longer needed on the parent's boundary are then freed.

use crate::amr::context::AmrContext;
use crate::mesh_error::AmrError;
use crate::physics::FlowModel;
use crate::topology::interface::Side;
use crate::topology::point::{CellId, FaceId};
use crate::topology::tree::CellTree;

/// True when removing the children of `id` would leave a neighbour two levels finer.
pub fn lvl_neighbor_too_high<S>(tree: &CellTree<S>, id: CellId) -> Result<bool, AmrError> {
    let cell = tree.cell(id)?;
    for &face_id in &cell.interfaces {
        let face = tree.face(face_id)?;
        if face.level != cell.level {
            continue;
        }
        for &child in &face.children {
            if tree.face(child)?.is_split() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Whether every child of `id` is a leaf.
pub fn children_are_leaves<S>(tree: &CellTree<S>, id: CellId) -> Result<bool, AmrError> {
    for &child in &tree.cell(id)?.children {
        if tree.cell(child)?.is_split() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Unrefine an owned split cell.
///
/// Returns `Ok(false)` without touching the tree when a child is itself
/// split (collapse happens one level per cycle) or when a neighbour is too
/// fine for the 2:1 balance to survive the merge.
pub fn unrefine_cell<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    _ctx: &AmrContext,
    model: &M,
    id: CellId,
) -> Result<bool, AmrError> {
    let cell = tree.cell(id)?;
    if !cell.is_split() {
        return Err(AmrError::NotSplit(id, "cell is a leaf"));
    }
    if let Some(owner) = cell.owner() {
        return Err(AmrError::GhostTopologyMismatch {
            key: cell.key,
            owner,
            reason: "ghost cells only change through the mirror".into(),
        });
    }
    if cell.children.len() != tree.children_per_cell() {
        return Err(AmrError::PartialChildren {
            cell: id,
            key: cell.key,
            found: cell.children.len(),
            expected: tree.children_per_cell(),
        });
    }
    if !children_are_leaves(tree, id)? {
        return Ok(false);
    }
    if lvl_neighbor_too_high(tree, id)? {
        log::trace!("unrefine of {} deferred: finer neighbour", cell.key);
        return Ok(false);
    }

    average_children(tree, model, id)?;
    collapse(tree, id)?;
    Ok(true)
}

/// Fold the children's state back into the parent.
pub(crate) fn average_children<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    model: &M,
    id: CellId,
) -> Result<(), AmrError> {
    let children = tree.cell(id)?.children.clone();
    if children.is_empty() {
        return Ok(());
    }
    let mut acc = std::mem::take(&mut tree.cell_mut(id)?.cons);
    acc.clear();
    acc.resize(model.conservative_len(), 0.0);
    let mut transports = vec![0.0; tree.cell(id)?.transports.len()];
    for &child in &children {
        let c = tree.cell(child)?;
        model.accumulate(&c.state, &mut acc);
        for (sum, t) in transports.iter_mut().zip(&c.transports) {
            *sum += t;
        }
    }
    let factor = 1.0 / children.len() as f64;
    model.average(&mut acc, factor);
    for t in transports.iter_mut() {
        *t *= factor;
    }

    let parent = tree.cell_mut(id)?;
    model.rebuild(&acc, &mut parent.state);
    parent.transports = transports;
    acc.iter_mut().for_each(|v| *v = 0.0);
    parent.cons = acc;
    Ok(())
}

/// Drop the children of `id` and reconnect its interfaces to it.
pub(crate) fn collapse<S>(tree: &mut CellTree<S>, id: CellId) -> Result<(), AmrError> {
    let level = tree.cell(id)?.level;
    let external: Vec<FaceId> = tree
        .cell(id)?
        .interfaces
        .iter()
        .copied()
        .filter(|f| tree.faces.get(*f).is_some_and(|face| face.level == level))
        .collect();
    for face in external {
        merge_interface(tree, face, id)?;
    }

    let internal = std::mem::take(&mut tree.cell_mut(id)?.internal);
    for face in internal {
        tree.faces.remove(face);
    }
    let children = std::mem::take(&mut tree.cell_mut(id)?.children);
    for child in children {
        tree.cells.remove(child);
    }
    Ok(())
}

/// Reconnect interface `face_id` of the collapsing cell `cell_id`.
///
/// If the neighbour across it is itself split, the interface children stay
/// and their collapsing side is re-pointed at `cell_id`. Otherwise they are
/// freed and the interface becomes a leaf again.
pub(crate) fn merge_interface<S>(
    tree: &mut CellTree<S>,
    face_id: FaceId,
    cell_id: CellId,
) -> Result<(), AmrError> {
    let face = tree.face(face_id)?;
    if !face.is_split() {
        return Err(AmrError::BrokenBackReference {
            face: face_id,
            cell: cell_id,
        });
    }
    let children = face.children.clone();
    let keep = match face.other(cell_id) {
        Some(Side::Cell(n)) => tree.cell(n)?.is_split(),
        Some(Side::Boundary(_)) => false,
        None => {
            return Err(AmrError::BrokenBackReference {
                face: face_id,
                cell: cell_id,
            });
        }
    };

    for child in children.iter().copied() {
        let g = tree.face(child)?;
        let mut collapsing = None;
        let mut far = None;
        for side in [Side::Cell(g.left), g.right] {
            if let Side::Cell(c) = side {
                if tree.cell(c)?.parent == Some(cell_id) {
                    collapsing = Some(c);
                } else {
                    far = Some(c);
                }
            }
        }
        let collapsing = collapsing.ok_or(AmrError::BrokenBackReference {
            face: child,
            cell: cell_id,
        })?;

        if keep {
            tree.face_mut(child)?.replace_cell(collapsing, cell_id);
            tree.cell_mut(cell_id)?.attach(child);
        } else {
            if tree.face(child)?.is_split() {
                return Err(AmrError::InterfaceChildCount {
                    face: child,
                    found: tree.face(child)?.children.len(),
                    expected: 0,
                });
            }
            if let Some(n) = far {
                tree.cell_mut(n)?.detach(child);
            }
            tree.faces.remove(child);
        }
    }
    if !keep {
        tree.face_mut(face_id)?.children.clear();
    }
    Ok(())
}
