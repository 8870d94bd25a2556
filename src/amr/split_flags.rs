//! Persisted refinement topology for checkpoint/restart.
//!
//! The stream holds one boolean per locally owned cell at every level,
//! `true` when the cell is split, in level-registry order (depth-first from
//! the sorted roots, children by sibling index). Replaying it level by level
//! on a fresh level-0 mesh reproduces the captured tree exactly.

use crate::algs::communicator::Communicator;
use crate::algs::wire::{self, KIND_RESTART, WireCount};
use crate::amr::levels::LevelRegistry;
use crate::amr::mesh::AmrMesh;
use crate::mesh_error::AmrError;
use crate::physics::FlowModel;
use crate::topology::tree::CellTree;

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SplitFlags {
    /// `levels[l][i]`: whether the `i`-th owned cell of level `l` is split.
    pub levels: Vec<Vec<bool>>,
}

impl SplitFlags {
    /// Record the topology of `tree` as indexed by `registry`.
    pub fn capture<S>(tree: &CellTree<S>, registry: &LevelRegistry) -> Result<Self, AmrError> {
        let levels = (0..registry.num_levels() as u8)
            .map(|level| {
                registry
                    .cells_at(level)
                    .iter()
                    .map(|&id| tree.cell(id).map(|c| c.is_split()))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { levels })
    }

    /// Number of split cells over all levels.
    pub fn split_count(&self) -> usize {
        self.levels.iter().flatten().filter(|&&f| f).count()
    }

    /// Replay the flags on `mesh`, coarsest level first.
    ///
    /// Each level is refined as recorded, then the ghost copies are brought up
    /// to date before the next level is visited. Every level up to
    /// `max_level` is synchronised, so ranks whose streams differ in depth
    /// still take part in the same exchanges.
    pub fn apply<M: FlowModel, C: Communicator>(
        &self,
        mesh: &mut AmrMesh<M>,
        comm: &C,
    ) -> Result<usize, AmrError> {
        let depth = self
            .levels
            .len()
            .max(usize::from(mesh.ctx().max_level) + 1);
        let mut refined = 0;
        for level in 0..depth {
            let flags = self.levels.get(level).map_or(&[][..], Vec::as_slice);
            let level = level as u8;
            let cells = mesh.levels().cells_at(level).to_vec();
            if cells.len() != flags.len() {
                return Err(AmrError::SplitFlagMismatch {
                    level,
                    expected: cells.len(),
                    found: flags.len(),
                });
            }
            for (&id, &split) in cells.iter().zip(flags) {
                let cell = mesh.tree().cell(id)?;
                match (split, cell.is_split()) {
                    (true, false) => {
                        mesh.force_refine(id)?;
                        refined += 1;
                    }
                    (false, true) => {
                        return Err(AmrError::RestartMismatch {
                            key: cell.key,
                            reason: "cell is split but recorded as a leaf",
                        });
                    }
                    _ => {}
                }
            }
            mesh.rebuild()?;
            mesh.sync_level(level, comm)?;
        }
        log::info!("restart: replayed {refined} refinements over {} levels", self.levels.len());
        Ok(refined)
    }

    /// Versioned little-endian encoding: header, level count, then per level
    /// a cell count followed by one byte per cell.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = wire::begin(KIND_RESTART, self.levels.len());
        for flags in &self.levels {
            wire::put(&mut out, &WireCount::new(flags.len()));
            out.extend(flags.iter().map(|&f| u8::from(f)));
        }
        out
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, AmrError> {
        let n_levels = wire::open(&mut bytes, KIND_RESTART)?;
        // every level carries at least its count word
        let max_levels = bytes.len() / std::mem::size_of::<WireCount>();
        let mut levels = Vec::with_capacity(n_levels.min(max_levels));
        for level in 0..n_levels {
            let n = wire::take::<WireCount>(&mut bytes)?.get();
            if bytes.len() < n {
                return Err(AmrError::Wire(format!(
                    "level {level}: {n} flags announced, {} bytes left",
                    bytes.len()
                )));
            }
            let (head, rest) = bytes.split_at(n);
            bytes = rest;
            let flags = head
                .iter()
                .map(|&b| match b {
                    0 => Ok(false),
                    1 => Ok(true),
                    other => Err(AmrError::Wire(format!("invalid flag byte {other}"))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            levels.push(flags);
        }
        if !bytes.is_empty() {
            return Err(AmrError::Wire(format!("{} trailing bytes", bytes.len())));
        }
        Ok(Self { levels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip_and_reject_garbage() {
        let flags = SplitFlags {
            levels: vec![vec![false, true, false], vec![true, false], vec![false; 4]],
        };
        let bytes = flags.to_bytes();
        assert_eq!(SplitFlags::from_bytes(&bytes).unwrap(), flags);
        assert_eq!(flags.split_count(), 2);

        let mut extra = bytes.clone();
        extra.push(0);
        assert!(SplitFlags::from_bytes(&extra).is_err());
        assert!(SplitFlags::from_bytes(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn forged_level_count_is_a_wire_error() {
        let mut bytes = SplitFlags {
            levels: vec![vec![true]],
        }
        .to_bytes();
        let at = std::mem::size_of::<crate::algs::wire::WireHdr>();
        bytes[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            SplitFlags::from_bytes(&bytes),
            Err(AmrError::Wire(_))
        ));
    }

    #[test]
    fn serde_json_shape() {
        let flags = SplitFlags {
            levels: vec![vec![true], vec![false, false]],
        };
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, r#"{"levels":[[true],[false,false]]}"#);
        let back: SplitFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }
}
