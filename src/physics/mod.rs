//! Flow-model collaborator seen by the AMR engine.
//!
//! The engine never interprets a cell's physical state. Everything it needs
//! (field sampling for the refinement indicator, the conservative
//! accumulate/average/rebuild triple used when coarsening, and boundary
//! descriptors for split boundary interfaces) goes through [`FlowModel`].

pub mod mixture;

use crate::topology::interface::BoundaryTag;
use std::fmt::Debug;

pub use mixture::{IdealGasMixture, MixtureState};

/// Scalar fields the refinement indicator can compare across an interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum IndicatorField {
    Density,
    Pressure,
    VelocityMagnitude,
    /// Volume fraction of the given phase.
    VolumeFraction(usize),
}

impl IndicatorField {
    /// Near-zero floor used in the relative-variation denominator.
    pub fn floor(self) -> f64 {
        match self {
            IndicatorField::VelocityMagnitude => 0.1,
            _ => 1e-2,
        }
    }
}

/// Physical model collaborator.
pub trait FlowModel: Send + Sync {
    /// Opaque per-cell physical state (phases, mixture, primitive variables).
    type State: Clone + Debug + Send + Sync;

    /// Number of phases the model carries.
    fn num_phases(&self) -> usize;

    /// Length of the conservative vector.
    fn conservative_len(&self) -> usize;

    /// Sample a scalar field on a cell state.
    fn sample(&self, state: &Self::State, field: IndicatorField) -> f64;

    /// Add the conservative vector of `state` to `acc`.
    fn accumulate(&self, state: &Self::State, acc: &mut [f64]);

    /// Scale an accumulated conservative vector, typically by `1 / 2^dim`.
    fn average(&self, acc: &mut [f64], factor: f64) {
        for v in acc.iter_mut() {
            *v *= factor;
        }
    }

    /// Rebuild primitive variables from a conservative vector, re-applying the
    /// model's equilibrium (relaxation) conditions.
    fn rebuild(&self, cons: &[f64], state: &mut Self::State);

    /// Boundary descriptor for child `child` of a split boundary interface.
    fn child_boundary(&self, tag: BoundaryTag, _child: usize) -> BoundaryTag {
        tag
    }
}
