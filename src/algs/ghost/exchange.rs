//! Collective exchanges between neighbour ranks.
//!
//! Every exchange posts all receives, then all sends, then drains the
//! receives before the sends. Each rank takes part with every neighbour in
//! every call, even with an empty list, so a call never returns before all
//! of its messages have been delivered.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::ghost::links::GhostLinks;
use crate::algs::wire::{
    self, KIND_CELL_STATE, KIND_INDICATOR, KIND_REDUCE, KIND_SPLIT_FLAGS, WireCount, WireHdr,
    WireKey,
};
use crate::mesh_error::AmrError;
use crate::physics::FlowModel;
use crate::topology::point::CellId;
use crate::topology::tree::CellTree;
use std::collections::BTreeMap;
use std::mem::size_of;

const FRAME: usize = size_of::<WireHdr>() + size_of::<WireCount>();

fn lost(peer: usize, what: &str) -> AmrError {
    AmrError::CommError {
        neighbor: peer,
        reason: format!("no {what} message received"),
    }
}

/// Send the split flag of every level-`level` cell in the send lists and
/// return, per neighbour, the flags for its ghosts in receive-list order.
pub fn exchange_split_flags<S, C: Communicator>(
    tree: &CellTree<S>,
    links: &GhostLinks,
    level: u8,
    comm: &C,
    tag: CommTag,
) -> Result<BTreeMap<usize, Vec<bool>>, AmrError> {
    let mut recvs = Vec::new();
    for (peer, lists) in links.peers() {
        let expected = lists.recv(level).len();
        let mut buf = vec![0u8; FRAME + expected];
        let handle = comm.irecv(peer, tag.base(), &mut buf);
        recvs.push((peer, expected, handle));
    }

    let mut sends = Vec::new();
    for (peer, lists) in links.peers() {
        let flags = lists
            .send(level)
            .iter()
            .map(|&id| tree.cell(id).map(|c| c.is_split()))
            .collect::<Result<Vec<_>, _>>()?;
        let payload = wire::encode_flags(KIND_SPLIT_FLAGS, &flags);
        sends.push(comm.isend(peer, tag.base(), &payload));
    }

    let mut out = BTreeMap::new();
    let mut first_err = None;
    for (peer, expected, handle) in recvs {
        let result = handle
            .wait()
            .ok_or_else(|| lost(peer, "split-flag"))
            .and_then(|bytes| wire::decode_flags(&bytes, KIND_SPLIT_FLAGS));
        match result {
            Ok(flags) if flags.len() == expected => {
                out.insert(peer, flags);
            }
            Ok(flags) => {
                first_err.get_or_insert(AmrError::SplitFlagMismatch {
                    level,
                    expected,
                    found: flags.len(),
                });
            }
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    for send in sends {
        let _ = send.wait();
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

/// Push the state of every cell in the send lists onto its ghost copies.
///
/// Each cell travels as its key, its conservative vector and its transport
/// scalars; the receiver checks the key and rebuilds the ghost state. Returns
/// the number of ghosts updated.
pub fn exchange_states<M: FlowModel, C: Communicator>(
    tree: &mut CellTree<M::State>,
    model: &M,
    links: &GhostLinks,
    num_transports: usize,
    comm: &C,
    tag: CommTag,
) -> Result<usize, AmrError> {
    let clen = model.conservative_len();
    let record = size_of::<WireKey>() + size_of::<f64>() * (clen + num_transports);
    let mut recvs = Vec::new();
    for (peer, lists) in links.peers() {
        let ghosts = lists.all_recv();
        let mut buf = vec![0u8; FRAME + ghosts.len() * record];
        let handle = comm.irecv(peer, tag.base(), &mut buf);
        recvs.push((peer, ghosts, handle));
    }

    let mut sends = Vec::new();
    for (peer, lists) in links.peers() {
        let cells = lists.all_send();
        let mut payload = wire::begin(KIND_CELL_STATE, cells.len());
        let mut cons = vec![0.0; clen];
        for id in cells {
            let cell = tree.cell(id)?;
            cons.iter_mut().for_each(|v| *v = 0.0);
            model.accumulate(&cell.state, &mut cons);
            wire::put(&mut payload, &WireKey::of(&cell.key));
            wire::put_f64s(&mut payload, &cons);
            let mut transports = cell.transports.clone();
            transports.resize(num_transports, 0.0);
            wire::put_f64s(&mut payload, &transports);
        }
        sends.push(comm.isend(peer, tag.base(), &payload));
    }

    let mut updated = 0;
    let mut first_err = None;
    for (peer, ghosts, handle) in recvs {
        let Some(bytes) = handle.wait() else {
            first_err.get_or_insert(lost(peer, "cell-state"));
            continue;
        };
        if let Err(e) = apply_states(tree, model, &bytes, &ghosts, clen, num_transports, peer) {
            first_err.get_or_insert(e);
            continue;
        }
        updated += ghosts.len();
    }
    for send in sends {
        let _ = send.wait();
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(updated),
    }
}

fn apply_states<M: FlowModel>(
    tree: &mut CellTree<M::State>,
    model: &M,
    mut bytes: &[u8],
    ghosts: &[CellId],
    clen: usize,
    num_transports: usize,
    peer: usize,
) -> Result<(), AmrError> {
    let n = wire::open(&mut bytes, KIND_CELL_STATE)?;
    if n != ghosts.len() {
        return Err(AmrError::CommError {
            neighbor: peer,
            reason: format!("expected {} ghost states, got {n}", ghosts.len()),
        });
    }
    for &id in ghosts {
        let key = wire::take::<WireKey>(&mut bytes)?.get();
        let cons = wire::take_f64s(&mut bytes, clen)?;
        let transports = wire::take_f64s(&mut bytes, num_transports)?;
        let ghost = tree.cell_mut(id)?;
        if ghost.key != key {
            return Err(AmrError::GhostTopologyMismatch {
                key: ghost.key,
                owner: peer,
                reason: format!("owner sent state for {key}"),
            });
        }
        model.rebuild(&cons, &mut ghost.state);
        ghost.transports = transports;
    }
    Ok(())
}

/// Overwrite the `xi` of every ghost with its owner's value.
pub fn exchange_xi<S, C: Communicator>(
    tree: &mut CellTree<S>,
    links: &GhostLinks,
    comm: &C,
    tag: CommTag,
) -> Result<(), AmrError> {
    let mut recvs = Vec::new();
    for (peer, lists) in links.peers() {
        let ghosts = lists.all_recv();
        let mut buf = vec![0u8; FRAME + ghosts.len() * size_of::<f64>()];
        let handle = comm.irecv(peer, tag.base(), &mut buf);
        recvs.push((peer, ghosts, handle));
    }

    let mut sends = Vec::new();
    for (peer, lists) in links.peers() {
        let xi = lists
            .all_send()
            .into_iter()
            .map(|id| tree.cell(id).map(|c| c.xi))
            .collect::<Result<Vec<_>, _>>()?;
        let mut payload = wire::begin(KIND_INDICATOR, xi.len());
        wire::put_f64s(&mut payload, &xi);
        sends.push(comm.isend(peer, tag.base(), &payload));
    }

    let mut first_err = None;
    for (peer, ghosts, handle) in recvs {
        let decoded = handle
            .wait()
            .ok_or_else(|| lost(peer, "indicator"))
            .and_then(|bytes| {
                let mut buf = bytes.as_slice();
                let n = wire::open(&mut buf, KIND_INDICATOR)?;
                if n != ghosts.len() {
                    return Err(AmrError::CommError {
                        neighbor: peer,
                        reason: format!("expected {} indicator values, got {n}", ghosts.len()),
                    });
                }
                wire::take_f64s(&mut buf, n)
            });
        match decoded {
            Ok(values) => {
                for (&id, xi) in ghosts.iter().zip(values) {
                    tree.cell_mut(id)?.xi = xi;
                }
            }
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    for send in sends {
        let _ = send.wait();
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Sum `value` over all ranks of `comm`.
pub fn all_reduce_sum<C: Communicator>(comm: &C, value: u64, tag: CommTag) -> Result<u64, AmrError> {
    let me = comm.rank();
    let others: Vec<usize> = (0..comm.size()).filter(|&r| r != me).collect();

    let mut recvs = Vec::with_capacity(others.len());
    for &peer in &others {
        let mut buf = vec![0u8; FRAME + size_of::<u64>()];
        recvs.push((peer, comm.irecv(peer, tag.base(), &mut buf)));
    }
    let mut payload = wire::begin(KIND_REDUCE, 1);
    wire::put(&mut payload, &value.to_le_bytes());
    let sends: Vec<_> = others
        .iter()
        .map(|&peer| comm.isend(peer, tag.base(), &payload))
        .collect();

    let mut total = value;
    let mut first_err = None;
    for (peer, handle) in recvs {
        let decoded = handle
            .wait()
            .ok_or_else(|| lost(peer, "reduction"))
            .and_then(|bytes| {
                let mut buf = bytes.as_slice();
                wire::open(&mut buf, KIND_REDUCE)?;
                wire::take::<[u8; 8]>(&mut buf).map(u64::from_le_bytes)
            });
        match decoded {
            Ok(v) => total += v,
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    for send in sends {
        let _ = send.wait();
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(total),
    }
}
