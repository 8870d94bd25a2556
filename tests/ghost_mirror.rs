mod util;
use util::*;

use mesh_amr::prelude::*;
use mesh_amr::topology::ownership::CellOwnership;
use serial_test::serial;
use std::collections::BTreeSet;
use std::sync::Arc;

const STEP: [f64; 8] = [1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0];

fn slab_mesh_1d<C: Communicator>(comm: &C, max_level: u8) -> Mesh {
    let ctx = ctx(1, max_level).for_rank(comm.rank(), comm.size());
    let grid = CartesianGrid::new(1, &[8], &[8.0]).unwrap();
    let ownership = CellOwnership::slabs(grid.cells, 0, comm.size());
    AmrMesh::cartesian_partitioned(Arc::new(ctx), IdealGasMixture::air(), grid, ownership, |e| {
        air(STEP[e.position[0].floor() as usize])
    })
    .unwrap()
}

fn quadrant_mesh_2d<C: Communicator>(comm: &C, max_level: u8) -> Mesh {
    let ctx = ctx(2, max_level).for_rank(comm.rank(), comm.size());
    let grid = grid_2d(4);
    let owners = (0..4u32)
        .flat_map(|j| (0..4u32).map(move |i| (i / 2 + 2 * (j / 2)) as usize))
        .collect();
    let ownership = CellOwnership::from_owners(grid.cells, owners).unwrap();
    AmrMesh::cartesian_partitioned(
        Arc::new(ctx),
        IdealGasMixture::air(),
        grid,
        ownership,
        disc_density,
    )
    .unwrap()
}

/// Owned leaves of every rank, checked to be disjoint.
fn union(parts: Vec<BTreeSet<TreeKey>>) -> BTreeSet<TreeKey> {
    let total: usize = parts.iter().map(BTreeSet::len).sum();
    let all: BTreeSet<TreeKey> = parts.into_iter().flatten().collect();
    assert_eq!(all.len(), total, "a leaf is owned by more than one rank");
    all
}

#[test]
fn partition_layout_has_one_ghost_layer() {
    let ranks = run_ranks(2, |comm| {
        let mesh = slab_mesh_1d(&comm, 2);
        mesh.validate().unwrap();
        let ghosts: Vec<TreeKey> = mesh
            .tree()
            .cells()
            .filter(|(_, c)| c.is_ghost())
            .map(|(_, c)| c.key)
            .collect();
        let links = mesh.links().peer(1 - comm.rank()).unwrap();
        (ghosts, links.send(0).len(), links.recv(0).len(), mesh.tree().face_count())
    });
    assert_eq!(ranks[0].0, vec![key(0, [4, 0, 0])]);
    assert_eq!(ranks[1].0, vec![key(0, [3, 0, 0])]);
    for (_, send, recv, faces) in &ranks {
        assert_eq!((*send, *recv), (1, 1));
        // 4 local cells: 3 local-local, 1 local-ghost, 1 boundary
        assert_eq!(*faces, 5);
    }
}

#[test]
fn two_ranks_match_the_serial_run_in_1d() {
    let mut serial = mesh_1d(&STEP, 2);
    for _ in 0..2 {
        serial.adapt(&NoComm).unwrap();
    }
    let expected = leaf_keys(&serial);

    let ranks = run_ranks(2, |comm| {
        let mut mesh = slab_mesh_1d(&comm, 2);
        let mut mirrored = 0;
        for _ in 0..2 {
            let report = mesh.adapt(&comm).unwrap();
            mirrored += report.ghosts_refined;
            mesh.validate().unwrap();
        }
        let total = mesh.global_cell_count(&comm).unwrap();
        (leaf_keys(&mesh), total, mirrored, ghost_keys(&mesh))
    });

    assert!(ranks.iter().all(|r| r.2 > 0));
    assert!(ranks.iter().all(|r| r.1 as usize == expected.len()));
    let ghosts_on_0 = ranks[0].3.clone();
    assert_eq!(union(ranks.into_iter().map(|r| r.0).collect()), expected);

    // rank 0 only holds the children of its ghost that touch its own cells
    assert!(ghosts_on_0.contains(&key(1, [8, 0, 0])));
    assert!(!ghosts_on_0.contains(&key(1, [9, 0, 0])));
}

fn ghost_keys(mesh: &Mesh) -> BTreeSet<TreeKey> {
    mesh.tree()
        .cells()
        .filter(|(_, c)| c.is_ghost())
        .map(|(_, c)| c.key)
        .collect()
}

#[test]
fn four_ranks_match_the_serial_run_in_2d() {
    let mut serial = mesh_2d(4, 2);
    for _ in 0..3 {
        serial.adapt(&NoComm).unwrap();
    }
    let expected = leaf_keys(&serial);
    let expected_mass = total_mass(&serial);

    let ranks = run_ranks(4, |comm| {
        let mut mesh = quadrant_mesh_2d(&comm, 2);
        for _ in 0..3 {
            mesh.adapt(&comm).unwrap();
            mesh.validate().unwrap();
        }
        (leaf_keys(&mesh), total_mass(&mesh))
    });

    let mass: f64 = ranks.iter().map(|r| r.1).sum();
    assert_close(mass, expected_mass, 1e-12);
    assert_eq!(union(ranks.into_iter().map(|r| r.0).collect()), expected);
}

#[test]
fn ghost_states_follow_their_owner() {
    let ranks = run_ranks(2, |comm| {
        let mut mesh = slab_mesh_1d(&comm, 2);
        mesh.adapt(&comm).unwrap();
        let rho = 3.0 + comm.rank() as f64;
        for id in mesh.leaf_cells() {
            mesh.tree_mut().cell_mut(id).unwrap().state = air(rho);
        }
        let updated = mesh.exchange_ghost_states(&comm).unwrap();
        let ghost_leaves: Vec<f64> = mesh
            .tree()
            .cells()
            .filter(|(_, c)| c.is_ghost() && !c.is_split())
            .map(|(_, c)| c.state.mixture_density())
            .collect();
        (updated, ghost_leaves)
    });
    for (rank, (updated, ghost_leaves)) in ranks.into_iter().enumerate() {
        assert!(updated > 0);
        assert!(!ghost_leaves.is_empty());
        let owner_rho = 3.0 + (1 - rank) as f64;
        for rho in ghost_leaves {
            assert_close(rho, owner_rho, 1e-12);
        }
    }
}

#[test]
fn collapsed_ghost_carries_the_owner_average() {
    let ranks = run_ranks(2, |comm| {
        let mut mesh = slab_mesh_1d(&comm, 1);
        mesh.adapt(&comm).unwrap();
        for id in mesh.leaf_cells() {
            let cell = mesh.tree_mut().cell_mut(id).unwrap();
            let rho = if cell.key == key(1, [9, 0, 0]) { 1.04 } else { 1.0 };
            cell.state = air(rho);
        }
        mesh.exchange_ghost_states(&comm).unwrap();

        let report = mesh.adapt(&comm).unwrap();
        let jump = cell_at(&mesh, key(0, [4, 0, 0]));
        let cell = mesh.tree().cell(jump).unwrap();
        assert!(!cell.is_split());
        (report.unrefined, cell.is_ghost(), cell.state.mixture_density())
    });
    // rank 0 mirrored only L1(8) of the ghost, yet holds the average of both children
    assert!(ranks[0].1);
    assert!(!ranks[1].1);
    for (unrefined, _, rho) in ranks {
        assert_eq!(unrefined, 1);
        assert_close(rho, 1.02, 1e-12);
    }
}

#[test]
fn smoothing_collapses_on_both_sides() {
    let ranks = run_ranks(2, |comm| {
        let mut mesh = slab_mesh_1d(&comm, 2);
        mesh.adapt(&comm).unwrap();
        for id in mesh.leaf_cells() {
            mesh.tree_mut().cell_mut(id).unwrap().state = air(1.0);
        }
        mesh.exchange_ghost_states(&comm).unwrap();
        // one level per cycle
        let mut cycles = 0;
        while mesh.global_cell_count(&comm).unwrap() > 8 {
            mesh.adapt(&comm).unwrap();
            mesh.validate().unwrap();
            cycles += 1;
            assert!(cycles <= 3);
        }
        (mesh.tree().cell_count(), cycles)
    });
    for (cells, _) in &ranks {
        // 4 owned roots and 1 ghost root, nothing else
        assert_eq!(*cells, 5);
    }
    assert_eq!(ranks[0].1, ranks[1].1);
}

#[test]
fn communicator_must_match_the_context() {
    let mut mesh = mesh_1d(&[1.0; 2], 1);
    let comm = RayonComm::world(2).remove(1);
    assert!(matches!(
        mesh.adapt(&comm),
        Err(AmrError::InvalidConfig(_))
    ));
}

#[test]
#[serial]
fn global_mailbox_ranks_agree_on_the_cell_count() {
    let handles: Vec<_> = (0..2)
        .map(|rank| {
            std::thread::spawn(move || {
                let comm = RayonComm::new(rank, 2);
                let mut mesh = slab_mesh_1d(&comm, 1);
                mesh.adapt(&comm).unwrap();
                mesh.global_cell_count(&comm).unwrap()
            })
        })
        .collect();
    let counts: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    // the two cells on either side of the jump split
    assert_eq!(counts, vec![10, 10]);
}
