//! Replaying an owner's refine/unrefine decisions on the local ghost copies.
//!
//! A ghost only ever changes in response to the owning rank's split flag.
//! Refining a ghost creates just the children that touch a local cell: for
//! every interface of the ghost at its own level, each interface child gets
//! the ghost child on its side (created on first use), and the interface is
//! either split (local side still a leaf) or its existing children are
//! re-pointed from the ghost to the ghost children. Existing children are
//! matched by face key; if no key matches, the nearest child within the
//! position tolerance is taken and a warning is logged.

use crate::amr::coarsen::{average_children, collapse};
use crate::amr::context::AmrContext;
use crate::amr::refine::spawn_child;
use crate::geometry::distance;
use crate::mesh_error::AmrError;
use crate::physics::FlowModel;
use crate::topology::interface::{CellInterface, Side};
use crate::topology::point::{CellId, FaceId};
use crate::topology::tree::CellTree;
use crate::topology::tree_key::{FaceKey, TreeKey};

/// Counts of ghost transitions applied by one [`mirror_level`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorStats {
    pub refined: usize,
    pub unrefined: usize,
}

fn mismatch(key: TreeKey, owner: usize, reason: impl Into<String>) -> AmrError {
    AmrError::GhostTopologyMismatch {
        key,
        owner,
        reason: reason.into(),
    }
}

/// Bring the ghosts of one level in line with their owner's split flags.
///
/// `ghosts[i]` must be the copy of the cell whose flag the owner sent as
/// `flags[i]`.
pub fn mirror_level<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    ctx: &AmrContext,
    model: &M,
    level: u8,
    ghosts: &[CellId],
    flags: &[bool],
) -> Result<MirrorStats, AmrError> {
    if ghosts.len() != flags.len() {
        return Err(AmrError::SplitFlagMismatch {
            level,
            expected: ghosts.len(),
            found: flags.len(),
        });
    }
    let mut stats = MirrorStats::default();
    for (&ghost, &split) in ghosts.iter().zip(flags) {
        match (split, tree.cell(ghost)?.is_split()) {
            (true, false) => {
                mirror_refine(tree, ctx, model, ghost)?;
                stats.refined += 1;
            }
            (false, true) => {
                mirror_unrefine(tree, model, ghost)?;
                stats.unrefined += 1;
            }
            _ => {}
        }
    }
    if stats != MirrorStats::default() {
        log::debug!(
            "mirrored level {level}: {} ghosts refined, {} unrefined",
            stats.refined,
            stats.unrefined
        );
    }
    Ok(stats)
}

/// Split ghost `ghost`, creating the children adjacent to local cells.
pub fn mirror_refine<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    ctx: &AmrContext,
    model: &M,
    ghost: CellId,
) -> Result<(), AmrError> {
    let dim = tree.dim;
    let cell = tree.cell(ghost)?;
    let (key, level) = (cell.key, cell.level);
    let Some(owner) = cell.owner() else {
        return Err(mismatch(key, ctx.rank, "mirror target is locally owned"));
    };
    if cell.is_split() {
        return Ok(());
    }
    let external: Vec<FaceId> = cell
        .interfaces
        .iter()
        .copied()
        .filter(|f| tree.faces.get(*f).is_some_and(|face| face.level == level))
        .collect();

    for face_id in external {
        let face = tree.face(face_id)?.clone();
        let Some(Side::Cell(local)) = face.other(ghost) else {
            return Err(mismatch(key, owner, "ghost interface without a local neighbour"));
        };
        let ghost_is_left = face.left == ghost;
        let mut created = Vec::new();
        for j in 0..tree.children_per_face() {
            let child_key = face.key.child(j, dim);
            let cell_key = child_key
                .cell_on_side_of(&key)
                .ok_or_else(|| mismatch(key, owner, format!("no cell below {child_key}")))?;
            let child = ghost_child(tree, model, ghost, cell_key)?;

            if face.is_split() {
                let existing = match_child_interface(tree, ctx, &face, j, child_key, key, owner)?;
                if !tree.face_mut(existing)?.replace_cell(ghost, child) {
                    return Err(mismatch(
                        key,
                        owner,
                        format!("interface {child_key} does not reference the ghost"),
                    ));
                }
                tree.cell_mut(ghost)?.detach(existing);
                tree.cell_mut(child)?.attach(existing);
            } else {
                let (left, right) = if ghost_is_left {
                    (child, Side::Cell(local))
                } else {
                    (local, Side::Cell(child))
                };
                let mut iface =
                    CellInterface::new(face.level + 1, child_key, face.face.child(j, dim), left, right);
                iface.parent = Some(face_id);
                let fid = tree.faces.insert(iface);
                tree.cell_mut(child)?.attach(fid);
                tree.cell_mut(local)?.attach(fid);
                created.push(fid);
            }
        }
        if !face.is_split() {
            tree.face_mut(face_id)?.children = created;
        }
    }

    let mut children = std::mem::take(&mut tree.cell_mut(ghost)?.children);
    let mut keyed = Vec::with_capacity(children.len());
    for &c in &children {
        keyed.push((tree.cell(c)?.key.child_index(dim), c));
    }
    keyed.sort_unstable_by_key(|&(idx, _)| idx);
    children.clear();
    children.extend(keyed.into_iter().map(|(_, c)| c));
    tree.cell_mut(ghost)?.children = children;
    Ok(())
}

/// The child of `ghost` with `key`, created if this is the first interface
/// that needs it.
fn ghost_child<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    model: &M,
    ghost: CellId,
    key: TreeKey,
) -> Result<CellId, AmrError> {
    if let Some(c) = tree.child_with_key(ghost, &key)? {
        return Ok(c);
    }
    let child = spawn_child(tree, model, ghost, key.child_index(tree.dim))?;
    tree.cell_mut(ghost)?.children.push(child);
    Ok(child)
}

/// Locate child `j` of the already split interface `face`.
fn match_child_interface<S>(
    tree: &CellTree<S>,
    ctx: &AmrContext,
    face: &CellInterface,
    j: usize,
    key: FaceKey,
    ghost_key: TreeKey,
    owner: usize,
) -> Result<FaceId, AmrError> {
    let expected = face.face.child(j, tree.dim);
    let scale = face.face.size().max(expected.size()).max(f64::EPSILON);
    let tolerance = ctx.position_tolerance * scale;

    for &c in &face.children {
        let candidate = tree.face(c)?;
        if candidate.key == key {
            let off = distance(candidate.face.position, expected.position);
            if off > tolerance {
                return Err(mismatch(
                    ghost_key,
                    owner,
                    format!("interface {key} sits {off:e} away from its expected centre"),
                ));
            }
            return Ok(c);
        }
    }

    let mut nearest: Option<(FaceId, f64)> = None;
    for &c in &face.children {
        let d = distance(tree.face(c)?.face.position, expected.position);
        if nearest.is_none_or(|(_, best)| d < best) {
            nearest = Some((c, d));
        }
    }
    match nearest {
        Some((c, d)) if d <= tolerance => {
            log::warn!(
                "ghost {ghost_key}: no interface with key {key}, using nearest child at distance {d:e}"
            );
            Ok(c)
        }
        _ => Err(mismatch(
            ghost_key,
            owner,
            format!("no interface child matches {key}"),
        )),
    }
}

/// Collapse ghost `ghost` back to a leaf.
///
/// The ghost only holds the children next to local cells, so its averaged
/// state is approximate until the next [`exchange_states`](super::exchange_states)
/// from the owner, which [`AmrMesh::adapt`](crate::amr::AmrMesh::adapt) runs
/// after its unrefine pass.
pub fn mirror_unrefine<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    model: &M,
    ghost: CellId,
) -> Result<(), AmrError> {
    let cell = tree.cell(ghost)?;
    let key = cell.key;
    let owner = cell.owner().unwrap_or_default();
    if !cell.is_split() {
        return Ok(());
    }
    for &child in &cell.children {
        if tree.cell(child)?.is_split() {
            return Err(mismatch(key, owner, "collapsing ghost has split children"));
        }
    }
    average_children(tree, model, ghost)?;
    collapse(tree, ghost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amr::refine::refine_cell;
    use crate::amr::{AmrContext, AmrMesh, CartesianGrid};
        use crate::physics::{IdealGasMixture, MixtureState};
    use crate::topology::ownership::CellOwnership;
    use std::sync::Arc;

    /// Rank 0 of a 4x2 grid split in two slabs along x.
    fn rank0() -> AmrMesh<IdealGasMixture> {
        let ctx = AmrContext {
            max_level: 2,
            ..AmrContext::new(2)
        }
        .for_rank(0, 2);
        let grid = CartesianGrid::new(2, &[4, 2], &[4.0, 2.0]).unwrap();
        let ownership = CellOwnership::slabs(grid.cells, 0, 2);
        AmrMesh::cartesian_partitioned(Arc::new(ctx), IdealGasMixture::air(), grid, ownership, |_| {
            MixtureState::pure(1.0, [0.0; 3], 1.0e5)
        })
        .unwrap()
    }

    fn key(level: u8, coords: [u32; 3]) -> TreeKey {
        TreeKey { level, coords }
    }

    #[test]
    fn ghost_keeps_only_children_next_to_local_cells() {
        let mut mesh = rank0();
        let (ctx, model) = (mesh.ctx().clone(), mesh.model().clone());
        let ghost = mesh.tree().find_by_key(&key(0, [2, 0, 0])).unwrap();
        let local = mesh.tree().find_by_key(&key(0, [1, 0, 0])).unwrap();

        mirror_refine(mesh.tree_mut(), &ctx, &model, ghost).unwrap();
        let kids: Vec<TreeKey> = mesh
            .tree()
            .cell(ghost)
            .unwrap()
            .children()
            .iter()
            .map(|&c| mesh.tree().cell(c).unwrap().key)
            .collect();
        assert_eq!(kids, vec![key(1, [4, 0, 0]), key(1, [4, 1, 0])]);
        mesh.tree().validate_invariants().unwrap();

        // the local side now attaches to the interface children the mirror made
        assert!(refine_cell(mesh.tree_mut(), &ctx, &model, local).unwrap());
        mesh.tree().validate_invariants().unwrap();

        // collapsing the ghost keeps those children for the local side
        mirror_unrefine(mesh.tree_mut(), &model, ghost).unwrap();
        mesh.tree().validate_invariants().unwrap();
        assert!(!mesh.tree().cell(ghost).unwrap().is_split());
        assert!(mesh.tree().cell(local).unwrap().is_split());
    }

    #[test]
    fn unkeyed_interface_children_match_by_position() {
        let mut mesh = rank0();
        let (ctx, model) = (mesh.ctx().clone(), mesh.model().clone());
        let ghost = mesh.tree().find_by_key(&key(0, [2, 1, 0])).unwrap();
        let local = mesh.tree().find_by_key(&key(0, [1, 1, 0])).unwrap();
        assert!(refine_cell(mesh.tree_mut(), &ctx, &model, local).unwrap());

        let shared = mesh
            .tree()
            .cell(ghost)
            .unwrap()
            .interfaces()
            .iter()
            .copied()
            .find(|&f| mesh.tree().face(f).unwrap().touches(local))
            .unwrap();
        for child in mesh.tree().face(shared).unwrap().children().to_vec() {
            mesh.tree_mut().face_mut(child).unwrap().key.level = 9;
        }

        mirror_refine(mesh.tree_mut(), &ctx, &model, ghost).unwrap();
        assert_eq!(mesh.tree().cell(ghost).unwrap().children().len(), 2);
        for &child in mesh.tree().face(shared).unwrap().children() {
            let face = mesh.tree().face(child).unwrap();
            let (l, r) = face.cells().unwrap();
            assert_eq!(mesh.tree().cell(l).unwrap().level, 1);
            assert_eq!(mesh.tree().cell(r).unwrap().level, 1);
        }
    }

    #[test]
    fn flag_count_must_match_the_ghost_list() {
        let mut mesh = rank0();
        let (ctx, model) = (mesh.ctx().clone(), mesh.model().clone());
        let ghosts = mesh.levels().ghosts_at(0).to_vec();
        assert_eq!(ghosts.len(), 2);
        let err = mirror_level(mesh.tree_mut(), &ctx, &model, 0, &ghosts, &[true]).unwrap_err();
        assert!(matches!(err, AmrError::SplitFlagMismatch { level: 0, .. }));

        let stats = mirror_level(mesh.tree_mut(), &ctx, &model, 0, &ghosts, &[true, false]).unwrap();
        assert_eq!(stats, MirrorStats { refined: 1, unrefined: 0 });
    }

    #[test]
    fn locally_owned_cells_are_not_mirrored() {
        let mut mesh = rank0();
        let (ctx, model) = (mesh.ctx().clone(), mesh.model().clone());
        let local = mesh.tree().find_by_key(&key(0, [0, 0, 0])).unwrap();
        assert!(matches!(
            mirror_refine(mesh.tree_mut(), &ctx, &model, local),
            Err(AmrError::GhostTopologyMismatch { .. })
        ));
    }
}
