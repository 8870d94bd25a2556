mod util;
use util::*;

use mesh_amr::prelude::*;
use mesh_amr::topology::ownership::CellOwnership;
use std::sync::Arc;

fn adapted_2d(cycles: usize) -> Mesh {
    let mut mesh = mesh_2d(4, 3);
    for _ in 0..cycles {
        mesh.adapt(&NoComm).unwrap();
    }
    mesh
}

#[test]
fn restart_rebuilds_the_same_tree() {
    let mesh = adapted_2d(3);
    let flags = mesh.split_flags().unwrap();
    assert_eq!(flags.levels.len(), mesh.levels().num_levels());
    assert_eq!(flags.levels[0].len(), 16);
    assert!(flags.split_count() > 0);

    let mut fresh = mesh_2d(4, 3);
    let refined = fresh.restore_split_flags(&flags, &NoComm).unwrap();
    assert_eq!(refined, flags.split_count());
    fresh.validate().unwrap();
    assert_eq!(leaf_keys(&fresh), leaf_keys(&mesh));
    assert_eq!(fresh.split_flags().unwrap(), flags);
    assert_eq!(fresh.tree().face_count(), mesh.tree().face_count());
}

#[test]
fn restart_stream_survives_serialisation() {
    let mesh = adapted_2d(2);
    let flags = mesh.split_flags().unwrap();

    let bytes = flags.to_bytes();
    let from_wire = SplitFlags::from_bytes(&bytes).unwrap();
    assert_eq!(from_wire, flags);

    let encoded = bincode::serialize(&flags).unwrap();
    let from_bincode: SplitFlags = bincode::deserialize(&encoded).unwrap();
    assert_eq!(from_bincode, flags);

    let mut fresh = mesh_2d(4, 3);
    fresh.restore_split_flags(&from_wire, &NoComm).unwrap();
    assert_eq!(leaf_keys(&fresh), leaf_keys(&mesh));
}

#[test]
fn restart_on_another_grid_is_rejected() {
    let flags = adapted_2d(1).split_flags().unwrap();
    let mut small = mesh_2d(2, 3);
    assert!(matches!(
        small.restore_split_flags(&flags, &NoComm),
        Err(AmrError::SplitFlagMismatch {
            level: 0,
            expected: 4,
            found: 16
        })
    ));
}

#[test]
fn restart_on_a_refined_mesh_is_rejected() {
    let flags = mesh_2d(4, 3).split_flags().unwrap();
    assert_eq!(flags.split_count(), 0);

    let mut mesh = mesh_2d(4, 3);
    let c = cell_at(&mesh, key(0, [2, 2, 0]));
    mesh.refine(c).unwrap();
    assert!(matches!(
        mesh.restore_split_flags(&flags, &NoComm),
        Err(AmrError::RestartMismatch { .. })
    ));
}

#[test]
fn restart_deeper_than_max_level_is_rejected() {
    let flags = adapted_2d(3).split_flags().unwrap();
    assert!(flags.levels.len() > 2);
    let mut shallow = AmrMesh::cartesian(
        Arc::new(ctx(2, 1)),
        IdealGasMixture::air(),
        grid_2d(4),
        disc_density,
    )
    .unwrap();
    assert!(matches!(
        shallow.restore_split_flags(&flags, &NoComm),
        Err(AmrError::RestartMismatch { .. })
    ));
}

#[test]
fn partitioned_restart_matches_per_rank() {
    let ranks = run_ranks(2, |comm| {
        let build = || {
            let ctx = ctx(2, 2).for_rank(comm.rank(), comm.size());
            let grid = grid_2d(4);
            let ownership = CellOwnership::slabs(grid.cells, 1, comm.size());
            AmrMesh::cartesian_partitioned(
                Arc::new(ctx),
                IdealGasMixture::air(),
                grid,
                ownership,
                disc_density,
            )
            .unwrap()
        };
        let mut mesh = build();
        mesh.adapt(&comm).unwrap();
        mesh.adapt(&comm).unwrap();
        let flags = mesh.split_flags().unwrap();

        let mut fresh = build();
        fresh.restore_split_flags(&flags, &comm).unwrap();
        fresh.validate().unwrap();
        (leaf_keys(&mesh) == leaf_keys(&fresh), flags.levels[0].len())
    });
    for (same, roots) in ranks {
        assert!(same);
        assert_eq!(roots, 8);
    }
}
