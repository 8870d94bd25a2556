//! Tree topology: cells, cell interfaces and the arenas that own them.
//!
//! This module provides the data side of the AMR engine:
//! - [`point`]: `CellId` / `FaceId` arena handles
//! - [`tree_key`]: process-independent tree coordinates for cells and faces
//! - [`cell`], [`interface`], [`tree`]: the records and their container
//! - [`ownership`]: the given level-0 domain decomposition
//! - [`validation`]: structural and 2:1-balance checks
//!
//! The operations that mutate the tree (refine, unrefine, ghost mirroring)
//! live in [`crate::amr`] and [`crate::algs::ghost`].

pub mod arena;
pub mod cell;
pub mod interface;
pub mod ownership;
pub mod point;
pub mod tree;
pub mod tree_key;
pub mod validation;

pub use cell::Cell;
pub use interface::{BoundaryTag, CellInterface, Side};
pub use point::{CellId, FaceId};
pub use tree::CellTree;
pub use tree_key::{FaceKey, TreeKey};
