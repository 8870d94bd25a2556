//! Message passing, wire formats and ghost-layer algorithms.

pub mod communicator;
pub mod ghost;
pub mod wire;

pub use communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
