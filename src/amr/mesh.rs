//! The per-process AMR mesh and its adapt cycle.
//!
//! [`AmrMesh`] owns the cell tree, the level registries and the ghost links,
//! and drives the refine/unrefine passes. The host solver reads and writes
//! cell states through [`AmrMesh::tree_mut`] between adapt cycles and iterates
//! the registries for its flux and update loops.

use crate::algs::communicator::{
    CELL_STATE_TAG, Communicator, INDICATOR_TAG, REDUCE_TAG, SPLIT_FLAGS_TAG,
};
use crate::algs::ghost::{self, GhostLinks, MirrorStats};
use crate::amr::coarsen::{children_are_leaves, unrefine_cell};
use crate::amr::context::AmrContext;
use crate::amr::indicator;
use crate::amr::levels::LevelRegistry;
use crate::amr::refine::refine_cell;
use crate::amr::split_flags::SplitFlags;
use crate::geometry::{Coord, Element, Face};
use crate::mesh_error::AmrError;
use crate::physics::FlowModel;
use crate::topology::cell::Cell;
use crate::topology::interface::{BoundaryTag, CellInterface, Side};
use crate::topology::ownership::CellOwnership;
use crate::topology::point::{CellId, FaceId};
use crate::topology::tree::CellTree;
use crate::topology::tree_key::TreeKey;
use itertools::iproduct;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Level-0 lattice of an axis-aligned box domain.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CartesianGrid {
    /// Roots per axis; inactive axes hold 1.
    pub cells: [u32; 3],
    pub origin: Coord,
    /// Domain size per axis; inactive axes give the unit depth.
    pub lengths: Coord,
    /// Boundary tag of the lower and upper domain face along each axis.
    pub boundaries: [[BoundaryTag; 2]; 3],
}

impl CartesianGrid {
    /// A box at the origin with `cells[a]` roots over `lengths[a]` on each of the
    /// first `dim` axes, all boundaries tagged 0.
    pub fn new(dim: usize, cells: &[u32], lengths: &[f64]) -> Result<Self, AmrError> {
        if !(1..=3).contains(&dim) || cells.len() != dim || lengths.len() != dim {
            return Err(AmrError::InvalidConfig(format!(
                "grid needs {dim} cell counts and lengths"
            )));
        }
        let mut grid = Self {
            cells: [1; 3],
            origin: [0.0; 3],
            lengths: [1.0; 3],
            boundaries: [[BoundaryTag(0); 2]; 3],
        };
        for axis in 0..dim {
            if cells[axis] == 0 || !(lengths[axis] > 0.0) {
                return Err(AmrError::InvalidConfig(format!(
                    "axis {axis}: {} cells over length {}",
                    cells[axis], lengths[axis]
                )));
            }
            grid.cells[axis] = cells[axis];
            grid.lengths[axis] = lengths[axis];
        }
        Ok(grid)
    }

    pub fn with_origin(mut self, origin: Coord) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_boundaries(mut self, axis: usize, lower: BoundaryTag, upper: BoundaryTag) -> Self {
        self.boundaries[axis] = [lower, upper];
        self
    }

    fn contains(&self, coords: [u32; 3]) -> bool {
        (0..3).all(|a| coords[a] < self.cells[a])
    }

    /// Geometry of the root at `coords`.
    pub fn root_element(&self, coords: [u32; 3], dim: usize) -> Element {
        let mut position = [0.0; 3];
        let mut extent = [0.0; 3];
        for axis in 0..3 {
            extent[axis] = self.lengths[axis] / self.cells[axis] as f64;
            position[axis] = self.origin[axis] + (coords[axis] as f64 + 0.5) * extent[axis];
        }
        Element::cartesian(position, extent, dim)
    }
}

/// Outcome of one [`AmrMesh::adapt`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AdaptReport {
    pub refined: usize,
    pub unrefined: usize,
    pub ghosts_refined: usize,
    pub ghosts_unrefined: usize,
    /// Owned leaf cells after the cycle.
    pub leaf_cells: usize,
    /// Owned leaf cells per level after the cycle.
    pub per_level: Vec<usize>,
}

impl AdaptReport {
    fn add_mirror(&mut self, stats: MirrorStats) {
        self.ghosts_refined += stats.refined;
        self.ghosts_unrefined += stats.unrefined;
    }
}

pub struct AmrMesh<M: FlowModel> {
    ctx: Arc<AmrContext>,
    model: M,
    grid: CartesianGrid,
    ownership: CellOwnership,
    neighbours: BTreeSet<usize>,
    tree: CellTree<M::State>,
    levels: LevelRegistry,
    links: GhostLinks,
}

impl<M: FlowModel> std::fmt::Debug for AmrMesh<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmrMesh")
            .field("rank", &self.ctx.rank)
            .field("cells", &self.tree.cell_count())
            .field("interfaces", &self.tree.face_count())
            .field("levels", &self.levels.num_levels())
            .finish()
    }
}

impl<M: FlowModel> AmrMesh<M> {
    /// Serial mesh: every root owned by `ctx.rank`, no ghosts.
    pub fn cartesian(
        ctx: Arc<AmrContext>,
        model: M,
        grid: CartesianGrid,
        init: impl FnMut(&Element) -> M::State,
    ) -> Result<Self, AmrError> {
        let ownership = CellOwnership::uniform(grid.cells, ctx.rank);
        Self::cartesian_partitioned(ctx, model, grid, ownership, init)
    }

    /// Local part of a decomposed mesh: the roots `ownership` gives to
    /// `ctx.rank`, one layer of ghost roots sharing a face with them, and the
    /// local–local, local–ghost and local–boundary interfaces.
    pub fn cartesian_partitioned(
        ctx: Arc<AmrContext>,
        model: M,
        grid: CartesianGrid,
        ownership: CellOwnership,
        mut init: impl FnMut(&Element) -> M::State,
    ) -> Result<Self, AmrError> {
        ctx.validate()?;
        if model.num_phases() != ctx.num_phases {
            return Err(AmrError::InvalidConfig(format!(
                "model carries {} phases, context expects {}",
                model.num_phases(),
                ctx.num_phases
            )));
        }
        if ownership.grid() != grid.cells {
            return Err(AmrError::InvalidConfig(
                "ownership lattice does not match the grid".into(),
            ));
        }
        let dim = ctx.dim;
        if (dim..3).any(|a| grid.cells[a] != 1) {
            return Err(AmrError::InvalidConfig(format!(
                "grid {:?} has cells along an inactive axis for dim {dim}",
                grid.cells
            )));
        }
        // face keys of the finest level run up to `cells << max_level`
        for axis in 0..dim {
            let finest = u64::from(grid.cells[axis]) << ctx.max_level;
            if finest > u64::from(u32::MAX) {
                return Err(AmrError::InvalidConfig(format!(
                    "axis {axis}: {} roots refined {} times overflow the key lattice",
                    grid.cells[axis], ctx.max_level
                )));
            }
        }
        let rank = ctx.rank;
        let mut tree = CellTree::new(dim);
        let mut roots: HashMap<[u32; 3], CellId> = HashMap::new();

        let [nx, ny, nz] = grid.cells;
        let local: Vec<[u32; 3]> = iproduct!(0..nz, 0..ny, 0..nx)
            .map(|(k, j, i)| [i, j, k])
            .filter(|&c| ownership.owner_of_root(c) == Some(rank))
            .collect();
        let mut spawn = |tree: &mut CellTree<M::State>, coords: [u32; 3], owner: Option<usize>| {
            let element = grid.root_element(coords, dim);
            let state = init(&element);
            tree.cells.insert(Cell::new(
                TreeKey::root(coords),
                element,
                state,
                model.conservative_len(),
                vec![0.0; ctx.num_transports],
                owner,
            ))
        };
        for &coords in &local {
            let id = spawn(&mut tree, coords, None);
            roots.insert(coords, id);
        }
        for &coords in &local {
            for (axis, up) in iproduct!(0..dim, [false, true]) {
                let Some(n) = TreeKey::root(coords).neighbor(axis, up) else {
                    continue;
                };
                if !grid.contains(n.coords) || roots.contains_key(&n.coords) {
                    continue;
                }
                let owner = ownership.owner_of_root(n.coords);
                let id = spawn(&mut tree, n.coords, owner);
                roots.insert(n.coords, id);
            }
        }

        let lookup = |coords: [u32; 3]| {
            roots.get(&coords).copied().ok_or_else(|| {
                AmrError::InvalidConfig(format!("no root at {}", TreeKey::root(coords)))
            })
        };
        let mut root_faces = Vec::new();
        for &coords in &local {
            let id = lookup(coords)?;
            let key = TreeKey::root(coords);
            let element = tree.cell(id)?.element;
            for (axis, up) in iproduct!(0..dim, [false, true]) {
                let neighbour = match key.neighbor(axis, up).filter(|n| grid.contains(n.coords)) {
                    Some(n) => Some(lookup(n.coords)?),
                    None => None,
                };
                let face = match neighbour {
                    None => {
                        let geometry = if up {
                            Face::above(&element, axis)
                        } else {
                            Face::below(&element, axis, false)
                        };
                        let tag = grid.boundaries[axis][usize::from(up)];
                        CellInterface::new(0, key.face(axis, up), geometry, id, Side::Boundary(tag))
                    }
                    Some(n) if up => CellInterface::new(
                        0,
                        key.face(axis, true),
                        Face::above(&element, axis),
                        id,
                        Side::Cell(n),
                    ),
                    Some(n) => {
                        let below = tree.cell(n)?;
                        if !below.is_ghost() {
                            // created from the local neighbour's side
                            continue;
                        }
                        let geometry = Face::above(&below.element, axis);
                        CellInterface::new(0, key.face(axis, false), geometry, n, Side::Cell(id))
                    }
                };
                let (left, right) = (face.left, face.right);
                let fid = tree.faces.insert(face);
                tree.cell_mut(left)?.attach(fid);
                if let Side::Cell(r) = right {
                    tree.cell_mut(r)?.attach(fid);
                }
                root_faces.push(fid);
            }
        }

        let mut sorted: Vec<(TreeKey, CellId)> = roots
            .into_iter()
            .map(|(coords, id)| (TreeKey::root(coords), id))
            .collect();
        sorted.sort_unstable_by_key(|&(key, _)| key);
        tree.roots = sorted.into_iter().map(|(_, id)| id).collect();
        tree.root_faces = root_faces;

        let neighbours = ownership.neighbour_ranks(rank);
        let levels = LevelRegistry::rebuild(&tree)?;
        let links = GhostLinks::rebuild(&tree, &levels, &neighbours)?;
        let mesh = Self {
            ctx,
            model,
            grid,
            ownership,
            neighbours,
            tree,
            levels,
            links,
        };
        mesh.tree.debug_assert_invariants();
        log::info!(
            "rank {}: {} local roots, {} ghost roots, {} interfaces",
            rank,
            local.len(),
            mesh.tree.roots.len() - local.len(),
            mesh.tree.face_count()
        );
        Ok(mesh)
    }

    pub fn ctx(&self) -> &AmrContext {
        &self.ctx
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn grid(&self) -> &CartesianGrid {
        &self.grid
    }

    pub fn ownership(&self) -> &CellOwnership {
        &self.ownership
    }

    pub fn tree(&self) -> &CellTree<M::State> {
        &self.tree
    }

    /// Mutable access for the host's state updates. Topology fields stay
    /// crate-private.
    pub fn tree_mut(&mut self) -> &mut CellTree<M::State> {
        &mut self.tree
    }

    pub fn levels(&self) -> &LevelRegistry {
        &self.levels
    }

    pub fn links(&self) -> &GhostLinks {
        &self.links
    }

    /// Owned leaf cells, the cells a solver updates.
    pub fn leaf_cells(&self) -> Vec<CellId> {
        self.levels.leaf_cells(&self.tree).collect()
    }

    /// Leaf interfaces, the ones fluxes are computed on.
    pub fn leaf_interfaces(&self) -> Vec<FaceId> {
        self.levels.leaf_interfaces(&self.tree).collect()
    }

    pub fn amr_cell_count(&self) -> usize {
        self.levels.amr_cell_count(&self.tree)
    }

    /// Owned leaf count summed over all ranks.
    pub fn global_cell_count<C: Communicator>(&self, comm: &C) -> Result<u64, AmrError> {
        ghost::all_reduce_sum(comm, self.amr_cell_count() as u64, REDUCE_TAG)
    }

    /// Rebuild the level registries and ghost links after a topology change.
    pub fn rebuild(&mut self) -> Result<(), AmrError> {
        self.levels = LevelRegistry::rebuild(&self.tree)?;
        self.links = GhostLinks::rebuild(&self.tree, &self.levels, &self.neighbours)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AmrError> {
        self.tree.validate_invariants()
    }

    /// Compute `xi` on every cell: reset, primary pass, ghost `xi` from the
    /// owners, buffer pass, vote restriction.
    pub fn evaluate_indicator<C: Communicator>(&mut self, comm: &C) -> Result<(), AmrError> {
        indicator::reset_xi(&mut self.tree);
        let faces = self.leaf_interfaces();
        let flagged = indicator::propagate(&mut self.tree, &self.ctx, &self.model, &faces)?;
        if !self.links.is_empty() {
            ghost::exchange_xi(&mut self.tree, &self.links, comm, INDICATOR_TAG)?;
        }
        let buffered = indicator::buffer(&mut self.tree, &self.ctx, &faces)?;
        indicator::restrict_votes(&mut self.tree, &self.levels)?;
        log::debug!("indicator: {flagged} interfaces flagged, {buffered} buffered");
        Ok(())
    }

    /// Refine one owned leaf, subject to `max_level` and 2:1 balance.
    pub fn refine(&mut self, id: CellId) -> Result<bool, AmrError> {
        let done = refine_cell(&mut self.tree, &self.ctx, &self.model, id)?;
        if done {
            self.rebuild()?;
        }
        Ok(done)
    }

    /// Unrefine one owned split cell, subject to 2:1 balance.
    pub fn unrefine(&mut self, id: CellId) -> Result<bool, AmrError> {
        let done = unrefine_cell(&mut self.tree, &self.ctx, &self.model, id)?;
        if done {
            self.rebuild()?;
        }
        Ok(done)
    }

    /// Refine every owned leaf of `level` with `xi >= xi_split`.
    pub fn refine_level(&mut self, level: u8) -> Result<usize, AmrError> {
        let mut refined = 0;
        for id in self.levels.cells_at(level).to_vec() {
            let cell = self.tree.cell(id)?;
            if cell.is_split() || cell.xi < self.ctx.xi_split {
                continue;
            }
            if refine_cell(&mut self.tree, &self.ctx, &self.model, id)? {
                refined += 1;
            }
        }
        self.rebuild()?;
        if refined > 0 {
            log::debug!("level {level}: refined {refined} cells");
        }
        Ok(refined)
    }

    /// Unrefine every owned split cell of `level` with `xi < xi_join`.
    pub fn unrefine_level(&mut self, level: u8) -> Result<usize, AmrError> {
        self.unrefine_level_except(level, &HashSet::new())
    }

    fn unrefine_level_except(
        &mut self,
        level: u8,
        blocked: &HashSet<CellId>,
    ) -> Result<usize, AmrError> {
        let mut unrefined = 0;
        for id in self.levels.cells_at(level).to_vec() {
            let cell = self.tree.cell(id)?;
            if !cell.is_split() || cell.xi >= self.ctx.xi_join || blocked.contains(&id) {
                continue;
            }
            if unrefine_cell(&mut self.tree, &self.ctx, &self.model, id)? {
                unrefined += 1;
            }
        }
        self.rebuild()?;
        if unrefined > 0 {
            log::debug!("level {level}: unrefined {unrefined} cells");
        }
        Ok(unrefined)
    }

    /// Refine an owned leaf regardless of its indicator (restart replay).
    pub(crate) fn force_refine(&mut self, id: CellId) -> Result<(), AmrError> {
        if refine_cell(&mut self.tree, &self.ctx, &self.model, id)? {
            Ok(())
        } else {
            Err(AmrError::RestartMismatch {
                key: self.tree.cell(id)?.key,
                reason: "refinement deferred by max level or 2:1 balance",
            })
        }
    }

    /// Exchange the split flags of `level` and replay them on the ghosts.
    pub fn sync_level<C: Communicator>(
        &mut self,
        level: u8,
        comm: &C,
    ) -> Result<MirrorStats, AmrError> {
        if self.links.is_empty() {
            return Ok(MirrorStats::default());
        }
        let tag = SPLIT_FLAGS_TAG.offset(u16::from(level));
        let received = ghost::exchange_split_flags(&self.tree, &self.links, level, comm, tag)?;
        let mut stats = MirrorStats::default();
        for (peer, flags) in received {
            let ghosts = self
                .links
                .peer(peer)
                .map(|l| l.recv(level).to_vec())
                .unwrap_or_default();
            let s = ghost::mirror_level(&mut self.tree, &self.ctx, &self.model, level, &ghosts, &flags)?;
            stats.refined += s.refined;
            stats.unrefined += s.unrefined;
        }
        self.rebuild()?;
        Ok(stats)
    }

    /// Push owned states onto the ghost copies held by neighbour ranks.
    pub fn exchange_ghost_states<C: Communicator>(&mut self, comm: &C) -> Result<usize, AmrError> {
        if self.links.is_empty() {
            return Ok(0);
        }
        ghost::exchange_states(
            &mut self.tree,
            &self.model,
            &self.links,
            self.ctx.num_transports,
            comm,
            CELL_STATE_TAG,
        )
    }

    /// One adapt cycle.
    ///
    /// Evaluates the indicator, refines level by level coarsest first
    /// (children created at level `L` may refine again at `L + 1`), then
    /// unrefines finest first. Each level is followed by a ghost sync, so
    /// every rank sees its neighbours' final topology of a level before
    /// deciding on the next. A split cell collapses at most one level per
    /// cycle: cells whose children were split when unrefinement started stay
    /// split. Ghost states are refreshed from their owners at the end.
    pub fn adapt<C: Communicator>(&mut self, comm: &C) -> Result<AdaptReport, AmrError> {
        if comm.size() != self.ctx.size || comm.rank() != self.ctx.rank {
            return Err(AmrError::InvalidConfig(format!(
                "communicator is rank {}/{} but the context says {}/{}",
                comm.rank(),
                comm.size(),
                self.ctx.rank,
                self.ctx.size
            )));
        }
        self.evaluate_indicator(comm)?;
        let mut report = AdaptReport::default();

        for level in 0..self.ctx.max_level {
            report.refined += self.refine_level(level)?;
            let stats = self.sync_level(level, comm)?;
            report.add_mirror(stats);
        }

        let mut blocked = HashSet::new();
        for level in 0..self.levels.num_levels() as u8 {
            for &id in self.levels.cells_at(level) {
                if self.tree.cell(id)?.is_split() && !children_are_leaves(&self.tree, id)? {
                    blocked.insert(id);
                }
            }
        }
        for level in (0..self.ctx.max_level).rev() {
            report.unrefined += self.unrefine_level_except(level, &blocked)?;
            let stats = self.sync_level(level, comm)?;
            report.add_mirror(stats);
        }
        // collapsed ghosts averaged only their mirrored children
        self.exchange_ghost_states(comm)?;

        self.tree.debug_assert_invariants();
        report.leaf_cells = self.amr_cell_count();
        report.per_level = self.levels.leaves_per_level(&self.tree);
        log::info!(
            "rank {}: adapt refined {} / unrefined {} cells, {} leaves {:?}",
            self.ctx.rank,
            report.refined,
            report.unrefined,
            report.leaf_cells,
            report.per_level
        );
        Ok(report)
    }

    /// Capture the split-flag stream for a checkpoint.
    pub fn split_flags(&self) -> Result<SplitFlags, AmrError> {
        SplitFlags::capture(&self.tree, &self.levels)
    }

    /// Rebuild a checkpointed topology on this (level-0) mesh.
    pub fn restore_split_flags<C: Communicator>(
        &mut self,
        flags: &SplitFlags,
        comm: &C,
    ) -> Result<usize, AmrError> {
        flags.apply(self, comm)
    }
}
