//! Structural validation of the cell/interface tree.
//!
//! Checks the invariants that every adapt cycle must preserve:
//! - a locally owned cell has 0 or `2^dim` children, a ghost at most `2^dim`
//!   stored in sibling order;
//! - an interface has 0 or `2^(dim-1)` children;
//! - parent/child back-references and level offsets agree;
//! - every interface is listed by the cells it references and vice versa;
//! - a leaf interface only references leaf cells, and those differ by at
//!   most one level (2:1 balance).

use crate::mesh_error::AmrError;
use crate::topology::interface::Side;
use crate::topology::tree::CellTree;

/// Validate every cell and interface of `tree`.
pub fn validate_tree<S>(tree: &CellTree<S>) -> Result<(), AmrError> {
    let per_cell = tree.children_per_cell();
    let per_face = tree.children_per_face();

    for (id, cell) in tree.cells() {
        let n = cell.children.len();
        let complete = n == 0 || n == per_cell;
        if !(complete || (cell.is_ghost() && n < per_cell)) {
            return Err(AmrError::PartialChildren {
                cell: id,
                key: cell.key,
                found: n,
                expected: per_cell,
            });
        }
        let mut last_index = None;
        for &child_id in &cell.children {
            let child = tree.cell(child_id)?;
            let index = child.key.child_index(tree.dim);
            let ordered = last_index.is_none_or(|last| last < index);
            if child.parent != Some(id) || child.level != cell.level + 1 || !ordered {
                return Err(AmrError::PartialChildren {
                    cell: id,
                    key: cell.key,
                    found: n,
                    expected: per_cell,
                });
            }
            last_index = Some(index);
        }
        for &face_id in &cell.interfaces {
            if !tree.face(face_id)?.touches(id) {
                return Err(AmrError::BrokenBackReference {
                    face: face_id,
                    cell: id,
                });
            }
        }
    }

    for (id, face) in tree.faces() {
        let n = face.children.len();
        if n != 0 && n != per_face {
            return Err(AmrError::InterfaceChildCount {
                face: id,
                found: n,
                expected: per_face,
            });
        }
        for &child in &face.children {
            let c = tree.face(child)?;
            if c.parent != Some(id) || c.level != face.level + 1 {
                return Err(AmrError::InterfaceChildCount {
                    face: id,
                    found: n,
                    expected: per_face,
                });
            }
        }

        let left = tree.cell(face.left)?;
        if !left.interfaces.contains(&id) {
            return Err(AmrError::BrokenBackReference {
                face: id,
                cell: face.left,
            });
        }
        let right = match face.right {
            Side::Cell(r) => {
                let cell = tree.cell(r)?;
                if !cell.interfaces.contains(&id) {
                    return Err(AmrError::BrokenBackReference { face: id, cell: r });
                }
                Some((r, cell))
            }
            Side::Boundary(_) => None,
        };

        if face.is_split() {
            continue;
        }
        if left.is_split() {
            return Err(AmrError::BrokenBackReference {
                face: id,
                cell: face.left,
            });
        }
        if let Some((r, right)) = right {
            if right.is_split() {
                return Err(AmrError::BrokenBackReference { face: id, cell: r });
            }
            if left.level.abs_diff(right.level) > 1 {
                return Err(AmrError::BalanceViolation {
                    face: id,
                    left: left.level,
                    right: right.level,
                });
            }
        }
    }
    Ok(())
}

impl<S> CellTree<S> {
    /// Full structural check, see [`validate_tree`].
    pub fn validate_invariants(&self) -> Result<(), AmrError> {
        validate_tree(self)
    }

    /// Panics on the first violated invariant. Compiled out of release builds
    /// unless `strict-invariants` is enabled.
    pub fn debug_assert_invariants(&self) {
        #[cfg(any(debug_assertions, feature = "strict-invariants"))]
        if let Err(e) = validate_tree(self) {
            panic!("[invariants] cell tree at {} cells: {e}", self.cell_count());
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::amr::{AmrContext, AmrMesh, CartesianGrid};
    use crate::mesh_error::AmrError;
    use crate::physics::{IdealGasMixture, MixtureState};
    use std::sync::Arc;

    fn line(n: u32) -> AmrMesh<IdealGasMixture> {
        let grid = CartesianGrid::new(1, &[n], &[n as f64]).unwrap();
        AmrMesh::cartesian(Arc::new(AmrContext::new(1)), IdealGasMixture::air(), grid, |_| {
            MixtureState::pure(1.0, [0.0; 3], 1.0e5)
        })
        .unwrap()
    }

    #[test]
    fn level_jump_across_a_leaf_interface_is_reported() {
        let mut mesh = line(3);
        mesh.tree().validate_invariants().unwrap();
        let middle = mesh.tree().roots()[1];
        mesh.tree_mut().cell_mut(middle).unwrap().level = 2;
        assert!(matches!(
            mesh.tree().validate_invariants(),
            Err(AmrError::BalanceViolation { left: 0, right: 2, .. })
                | Err(AmrError::BalanceViolation { left: 2, right: 0, .. })
        ));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "[invariants]")]
    fn debug_assertion_panics_on_a_broken_tree() {
        let mut mesh = line(2);
        let first = mesh.tree().roots()[0];
        mesh.tree_mut().cell_mut(first).unwrap().level = 2;
        mesh.tree().debug_assert_invariants();
    }
}
