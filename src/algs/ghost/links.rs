//! Per-neighbour send and receive lists for ghost exchange.
//!
//! For every neighbour rank and every level, the send list holds the locally
//! owned cells that touch a ghost of that rank, and the receive list holds
//! the ghosts that rank owns. Both are in level-registry order, so the
//! `i`-th entry sent by the owner is the `i`-th ghost on the receiver.

use crate::amr::levels::LevelRegistry;
use crate::mesh_error::AmrError;
use crate::topology::interface::Side;
use crate::topology::point::CellId;
use crate::topology::tree::CellTree;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct PeerLinks {
    send: Vec<Vec<CellId>>,
    recv: Vec<Vec<CellId>>,
}

impl PeerLinks {
    pub fn send(&self, level: u8) -> &[CellId] {
        self.send.get(level as usize).map_or(&[], Vec::as_slice)
    }

    pub fn recv(&self, level: u8) -> &[CellId] {
        self.recv.get(level as usize).map_or(&[], Vec::as_slice)
    }

    fn push(lists: &mut Vec<Vec<CellId>>, level: usize, id: CellId) {
        if lists.len() <= level {
            lists.resize_with(level + 1, Vec::new);
        }
        lists[level].push(id);
    }

    /// Send lists of every level, coarsest first.
    pub fn all_send(&self) -> Vec<CellId> {
        self.send.iter().flatten().copied().collect()
    }

    pub fn all_recv(&self) -> Vec<CellId> {
        self.recv.iter().flatten().copied().collect()
    }

    pub fn total_send(&self) -> usize {
        self.send.iter().map(Vec::len).sum()
    }

    pub fn total_recv(&self) -> usize {
        self.recv.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GhostLinks {
    peers: BTreeMap<usize, PeerLinks>,
}

impl GhostLinks {
    /// Build the links for the given neighbour ranks.
    ///
    /// `neighbours` is the static set of ranks sharing a level-0 face with
    /// this one; every rank in it gets an entry even when its lists are empty,
    /// so both sides of a pair always take part in the same exchanges.
    pub fn rebuild<S>(
        tree: &CellTree<S>,
        levels: &LevelRegistry,
        neighbours: &BTreeSet<usize>,
    ) -> Result<Self, AmrError> {
        let mut peers: BTreeMap<usize, PeerLinks> = neighbours
            .iter()
            .map(|&r| (r, PeerLinks::default()))
            .collect();

        for level in 0..levels.num_levels() as u8 {
            for &id in levels.cells_at(level) {
                let mut ranks = BTreeSet::new();
                for &face in tree.cell(id)?.interfaces() {
                    if let Some(Side::Cell(n)) = tree.face(face)?.other(id) {
                        if let Some(owner) = tree.cell(n)?.owner() {
                            ranks.insert(owner);
                        }
                    }
                }
                for rank in ranks {
                    let peer = peers.get_mut(&rank).ok_or_else(|| AmrError::CommError {
                        neighbor: rank,
                        reason: format!("ghost owned by rank {rank} outside the neighbour set"),
                    })?;
                    PeerLinks::push(&mut peer.send, level as usize, id);
                }
            }
            for &id in levels.ghosts_at(level) {
                let Some(owner) = tree.cell(id)?.owner() else {
                    continue;
                };
                let peer = peers.get_mut(&owner).ok_or_else(|| AmrError::CommError {
                    neighbor: owner,
                    reason: format!("ghost owned by rank {owner} outside the neighbour set"),
                })?;
                PeerLinks::push(&mut peer.recv, level as usize, id);
            }
        }
        Ok(Self { peers })
    }

    pub fn peers(&self) -> impl Iterator<Item = (usize, &PeerLinks)> + '_ {
        self.peers.iter().map(|(&r, l)| (r, l))
    }

    pub fn peer(&self, rank: usize) -> Option<&PeerLinks> {
        self.peers.get(&rank)
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
