//! Adaptive refinement: indicator, refine/unrefine, registries and the
//! adapt-cycle driver.

pub mod coarsen;
pub mod context;
pub mod indicator;
pub mod levels;
pub mod mesh;
pub mod refine;
pub mod split_flags;

pub use coarsen::{lvl_neighbor_too_high, unrefine_cell};
pub use context::{AmrContext, BufferPolicy, IndicatorConfig};
pub use levels::LevelRegistry;
pub use mesh::{AdaptReport, AmrMesh, CartesianGrid};
pub use refine::{lvl_neighbor_too_low, refine_cell};
pub use split_flags::SplitFlags;
