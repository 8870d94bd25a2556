#![allow(dead_code)]
use mesh_amr::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

pub type Mesh = AmrMesh<IdealGasMixture>;

/// Serial context: `dim`, single-phase, given `max_level`.
pub fn ctx(dim: usize, max_level: u8) -> AmrContext {
    AmrContext {
        max_level,
        ..AmrContext::new(dim)
    }
}

pub fn air(density: f64) -> MixtureState {
    MixtureState::pure(density, [0.0; 3], 1.0e5)
}

/// 1-D mesh on [0, n] with one root per density value.
pub fn mesh_1d(densities: &[f64], max_level: u8) -> Mesh {
    let grid = CartesianGrid::new(1, &[densities.len() as u32], &[densities.len() as f64]).unwrap();
    AmrMesh::cartesian(Arc::new(ctx(1, max_level)), IdealGasMixture::air(), grid, |e| {
        air(densities[e.position[0].floor() as usize])
    })
    .unwrap()
}

/// 2-D unit-square mesh with a dense disc of radius 0.25 at the centre.
pub fn disc_density(e: &Element) -> MixtureState {
    let [x, y, _] = e.position;
    let r2 = (x - 0.5).powi(2) + (y - 0.5).powi(2);
    air(if r2 < 0.0625 { 4.0 } else { 1.0 })
}

pub fn grid_2d(n: u32) -> CartesianGrid {
    CartesianGrid::new(2, &[n, n], &[1.0, 1.0]).unwrap()
}

pub fn mesh_2d(n: u32, max_level: u8) -> Mesh {
    AmrMesh::cartesian(
        Arc::new(ctx(2, max_level)),
        IdealGasMixture::air(),
        grid_2d(n),
        disc_density,
    )
    .unwrap()
}

/// Owned leaf cell with the given key.
pub fn cell_at(mesh: &Mesh, key: TreeKey) -> CellId {
    mesh.tree()
        .find_by_key(&key)
        .unwrap_or_else(|| panic!("no cell at {key}"))
}

pub fn key(level: u8, coords: [u32; 3]) -> TreeKey {
    TreeKey { level, coords }
}

pub fn leaf_keys(mesh: &Mesh) -> BTreeSet<TreeKey> {
    mesh.leaf_cells()
        .into_iter()
        .map(|id| mesh.tree().cell(id).unwrap().key)
        .collect()
}

/// Σ volume · ρ over owned leaves.
pub fn total_mass(mesh: &Mesh) -> f64 {
    mesh.leaf_cells()
        .into_iter()
        .map(|id| {
            let c = mesh.tree().cell(id).unwrap();
            c.element.volume * c.state.mixture_density()
        })
        .sum()
}

/// Σ volume over owned leaves.
pub fn total_volume(mesh: &Mesh) -> f64 {
    mesh.leaf_cells()
        .into_iter()
        .map(|id| mesh.tree().cell(id).unwrap().element.volume)
        .sum()
}

pub fn assert_close(a: f64, b: f64, tol: f64) {
    assert!(
        (a - b).abs() <= tol * a.abs().max(b.abs()).max(1.0),
        "{a} != {b} (tol {tol})"
    );
}

/// Run `f` on `size` ranks, one thread each, sharing a private mailbox.
pub fn run_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(RayonComm) -> R + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let handles: Vec<_> = RayonComm::world(size)
        .into_iter()
        .map(|comm| {
            let f = Arc::clone(&f);
            std::thread::spawn(move || f(comm))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}
