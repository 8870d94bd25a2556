//! Refinement indicator `xi`.
//!
//! Each adapt cycle resets `xi` on every cell, flags both sides of any leaf
//! interface whose sampled fields vary by more than the configured threshold,
//! widens the flagged region across level jumps, and finally lets every split
//! cell vote with the maximum `xi` of its children.

use crate::amr::context::AmrContext;
use crate::amr::levels::LevelRegistry;
use crate::mesh_error::AmrError;
use crate::physics::{FlowModel, IndicatorField};
use crate::topology::point::{CellId, FaceId};
use crate::topology::tree::CellTree;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Set `xi = 0` on every cell, ghosts included.
pub fn reset_xi<S>(tree: &mut CellTree<S>) {
    for (_, cell) in tree.cells.iter_mut() {
        cell.xi = 0.0;
    }
}

/// `|r - l| / max(|r|, |l|, floor)`.
pub fn relative_variation(left: f64, right: f64, floor: f64) -> f64 {
    (right - left).abs() / right.abs().max(left.abs()).max(floor)
}

/// The cell pair of `face` if any enabled field varies beyond the threshold.
///
/// Fields are tried in priority order and the first one over the threshold
/// settles the interface.
fn flagged_pair<M: FlowModel>(
    tree: &CellTree<M::State>,
    model: &M,
    fields: &[IndicatorField],
    threshold: f64,
    face: FaceId,
) -> Result<Option<(CellId, CellId)>, AmrError> {
    let Some((l, r)) = tree.face(face)?.cells() else {
        return Ok(None);
    };
    let (left, right) = (tree.cell(l)?, tree.cell(r)?);
    if left.xi >= 1.0 && right.xi >= 1.0 {
        return Ok(None);
    }
    let hit = fields.iter().any(|&field| {
        let a = model.sample(&left.state, field);
        let b = model.sample(&right.state, field);
        relative_variation(a, b, field.floor()) > threshold
    });
    Ok(hit.then_some((l, r)))
}

/// Primary indicator pass over `faces`. Returns the number of flagged interfaces.
pub fn propagate<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    ctx: &AmrContext,
    model: &M,
    faces: &[FaceId],
) -> Result<usize, AmrError> {
    let fields = ctx.indicator.fields(model.num_phases());
    if fields.is_empty() {
        return Ok(0);
    }
    let threshold = ctx.indicator.threshold;

    #[cfg(feature = "rayon")]
    let pairs: Vec<_> = {
        let view = &*tree;
        faces
            .par_iter()
            .map(|&f| flagged_pair(view, model, &fields, threshold, f))
            .collect::<Result<_, _>>()?
    };
    #[cfg(not(feature = "rayon"))]
    let pairs: Vec<_> = faces
        .iter()
        .map(|&f| flagged_pair(tree, model, &fields, threshold, f))
        .collect::<Result<_, _>>()?;

    let mut flagged = 0;
    for (l, r) in pairs.into_iter().flatten() {
        tree.cell_mut(l)?.xi = 1.0;
        tree.cell_mut(r)?.xi = 1.0;
        flagged += 1;
    }
    Ok(flagged)
}

/// Buffer pass: where the two sides of a leaf interface sit at different
/// levels and either already exceeds the activation value, bump both.
///
/// Candidates are collected before any update so the result does not depend
/// on interface order.
pub fn buffer<S>(
    tree: &mut CellTree<S>,
    ctx: &AmrContext,
    faces: &[FaceId],
) -> Result<usize, AmrError> {
    let policy = ctx.buffer;
    let mut bumps = Vec::new();
    for &face in faces {
        let Some((l, r)) = tree.face(face)?.cells() else {
            continue;
        };
        let (left, right) = (tree.cell(l)?, tree.cell(r)?);
        if left.level != right.level && (left.xi > policy.activation || right.xi > policy.activation)
        {
            bumps.push((l, r));
        }
    }
    for &(l, r) in &bumps {
        tree.cell_mut(l)?.xi += policy.increment;
        tree.cell_mut(r)?.xi += policy.increment;
    }
    Ok(bumps.len())
}

/// Give every owned split cell the maximum `xi` of its children, finest first.
pub fn restrict_votes<S>(tree: &mut CellTree<S>, levels: &LevelRegistry) -> Result<(), AmrError> {
    for level in (0..levels.num_levels() as u8).rev() {
        for &id in levels.cells_at(level) {
            let cell = tree.cell(id)?;
            if !cell.is_split() {
                continue;
            }
            let mut xi = 0.0_f64;
            for &child in &cell.children {
                xi = xi.max(tree.cell(child)?.xi);
            }
            tree.cell_mut(id)?.xi = xi;
        }
    }
    Ok(())
}
