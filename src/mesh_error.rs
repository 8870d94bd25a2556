//! AmrError: Unified error type for mesh-amr public APIs
//!
//! Balance deferrals are not errors: refine/unrefine report them as `Ok(false)`.
//! Everything in here is either a corrupted tree, a cross-process topology
//! disagreement, or a configuration/communication fault. None of them is
//! recoverable locally; callers are expected to abort the run with the message.

use crate::topology::point::{CellId, FaceId};
use crate::topology::tree_key::TreeKey;
use thiserror::Error;

/// Unified error type for mesh-amr operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AmrError {
    /// A cell id does not refer to a live cell (freed or never allocated).
    #[error("unknown cell {0}")]
    UnknownCell(CellId),
    /// An interface id does not refer to a live interface.
    #[error("unknown cell interface {0}")]
    UnknownInterface(FaceId),
    /// A split cell holds a child set of the wrong size.
    #[error("cell {cell} at {key} has {found} children (expected 0 or {expected})")]
    PartialChildren {
        cell: CellId,
        key: TreeKey,
        found: usize,
        expected: usize,
    },
    /// A split interface holds a child set of the wrong size.
    #[error("interface {face} has {found} children (expected 0 or {expected})")]
    InterfaceChildCount {
        face: FaceId,
        found: usize,
        expected: usize,
    },
    /// Two leaf cells sharing a leaf interface differ by more than one level.
    #[error("2:1 balance violated across interface {face}: levels {left} and {right}")]
    BalanceViolation { face: FaceId, left: u8, right: u8 },
    /// An interface and one of its cells disagree about their connection.
    #[error("interface {face} and cell {cell} disagree about their connection")]
    BrokenBackReference { face: FaceId, cell: CellId },
    /// The ghost mirror could not reconcile the owner's topology with the local one.
    #[error("ghost topology mismatch for {key} (owner rank {owner}): {reason}")]
    GhostTopologyMismatch {
        key: TreeKey,
        owner: usize,
        reason: String,
    },
    /// A persisted or received split-flag sequence does not match the tree.
    #[error("split-flag mismatch at level {level}: expected {expected} flags, found {found}")]
    SplitFlagMismatch {
        level: u8,
        expected: usize,
        found: usize,
    },
    /// A restart flag could not be replayed on the cell it names.
    #[error("restart flag for {key} cannot be replayed: {reason}")]
    RestartMismatch { key: TreeKey, reason: &'static str },
    /// A forced refine targeted a cell that already has children.
    #[error("cell {0} is already split")]
    NotALeaf(CellId),
    /// A forced unrefine targeted a leaf, or a cell with split children.
    #[error("cell {0} cannot be unrefined: {1}")]
    NotSplit(CellId, &'static str),
    /// The AMR context failed validation.
    #[error("invalid AMR configuration: {0}")]
    InvalidConfig(String),
    /// Communication with a neighbour rank failed.
    #[error("communication error with rank {neighbor}: {reason}")]
    CommError { neighbor: usize, reason: String },
    /// A wire payload could not be decoded.
    #[error("wire format error: {0}")]
    Wire(String),
}
