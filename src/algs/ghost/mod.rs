//! Ghost layer maintenance across process boundaries.
//!
//! After each level of a refine or unrefine pass, every rank sends the split
//! flag of its boundary cells to the neighbours holding ghost copies of them
//! ([`exchange::exchange_split_flags`]), and replays the flags it received
//! on its own ghosts ([`mirror::mirror_level`]). The send/receive pairing is
//! fixed by [`links::GhostLinks`].

pub mod exchange;
pub mod links;
pub mod mirror;

pub use exchange::{all_reduce_sum, exchange_split_flags, exchange_states, exchange_xi};
pub use links::{GhostLinks, PeerLinks};
pub use mirror::{MirrorStats, mirror_level, mirror_refine, mirror_unrefine};
