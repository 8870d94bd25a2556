mod util;
use util::*;

use mesh_amr::prelude::*;
use proptest::prelude::*;

/// Owned split cells whose children are all leaves.
fn collapsible(mesh: &Mesh) -> Vec<CellId> {
    let tree = mesh.tree();
    let levels = mesh.levels();
    (0..levels.num_levels() as u8)
        .flat_map(|l| levels.cells_at(l).iter().copied())
        .filter(|&id| {
            let cell = tree.cell(id).unwrap();
            cell.is_split()
                && cell
                    .children()
                    .iter()
                    .all(|&c| !tree.cell(c).unwrap().is_split())
        })
        .collect()
}

fn check_leaf_balance(mesh: &Mesh) {
    let tree = mesh.tree();
    for face in mesh.leaf_interfaces() {
        if let Some((l, r)) = tree.face(face).unwrap().cells() {
            let (a, b) = (tree.cell(l).unwrap().level, tree.cell(r).unwrap().level);
            assert!(a.abs_diff(b) <= 1, "levels {a} and {b} across {face}");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_refine_unrefine_keeps_the_tree_balanced(
        ops in proptest::collection::vec((any::<bool>(), 0usize..1000), 1..40)
    ) {
        let mut mesh = mesh_2d(3, 3);
        let volume = total_volume(&mesh);
        let mass = total_mass(&mesh);
        for (refine, pick) in ops {
            if refine {
                let leaves = mesh.leaf_cells();
                let id = leaves[pick % leaves.len()];
                mesh.refine(id).unwrap();
            } else {
                let split = collapsible(&mesh);
                if split.is_empty() {
                    continue;
                }
                mesh.unrefine(split[pick % split.len()]).unwrap();
            }
            prop_assert!(mesh.validate().is_ok());
            check_leaf_balance(&mesh);
            assert_close(total_volume(&mesh), volume, 1e-12);
        }
        // piecewise-constant injection and volume averaging both preserve mass
        assert_close(total_mass(&mesh), mass, 1e-10);
    }

    #[test]
    fn adapt_cycles_keep_the_tree_balanced(radius in 0.1f64..0.45, cycles in 1usize..4) {
        let mut mesh = AmrMesh::cartesian(
            std::sync::Arc::new(ctx(2, 3)),
            IdealGasMixture::air(),
            grid_2d(4),
            |e| {
                let [x, y, _] = e.position;
                let r = ((x - 0.5).powi(2) + (y - 0.5).powi(2)).sqrt();
                air(if r < radius { 3.0 } else { 1.0 })
            },
        )
        .unwrap();
        for _ in 0..cycles {
            let report = mesh.adapt(&NoComm).unwrap();
            prop_assert!(mesh.validate().is_ok());
            check_leaf_balance(&mesh);
            prop_assert_eq!(report.leaf_cells, mesh.leaf_cells().len());
            prop_assert_eq!(report.per_level.iter().sum::<usize>(), report.leaf_cells);
        }
    }
}
