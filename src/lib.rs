#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-amr
//!
//! mesh-amr is a tree-structured adaptive mesh refinement engine for
//! finite-volume flow solvers on Cartesian meshes in 1, 2 or 3 dimensions.
//!
//! ## Features
//! - Cell and interface trees stored in slot arenas, addressed by handles
//! - Refinement indicator from relative field variation, with a buffer pass
//!   across level jumps
//! - Conservative refine/unrefine with 2:1 level balance across every interface
//! - Ghost-cell mirroring of neighbour ranks' topology after every level
//! - Pluggable communication backends (serial, Rayon threads, MPI)
//! - Split-flag stream for checkpoint/restart
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-amr = "0.1"
//! # Optional features:
//! # features = ["mpi-support", "rayon", "strict-invariants"]
//! ```
//!
//! The physical model is supplied by the host through [`physics::FlowModel`];
//! [`physics::IdealGasMixture`] is a ready-made multiphase reference model.

pub mod algs;
pub mod amr;
pub mod geometry;
pub mod mesh_error;
pub mod physics;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm, Wait};
    pub use crate::amr::{
        AdaptReport, AmrContext, AmrMesh, BufferPolicy, CartesianGrid, IndicatorConfig,
        LevelRegistry, SplitFlags,
    };
    pub use crate::geometry::{Element, Face};
    pub use crate::mesh_error::AmrError;
    pub use crate::physics::{FlowModel, IdealGasMixture, IndicatorField, MixtureState};
    pub use crate::topology::{
        BoundaryTag, Cell, CellId, CellInterface, CellTree, FaceId, FaceKey, Side, TreeKey,
    };
}
