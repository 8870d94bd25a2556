//! Reference model: a mixture of ideal-gas phases in mechanical equilibrium.
//!
//! Phases share one velocity and one pressure. The conservative vector is
//! `[α_0..α_n, (αρ)_0..(αρ)_n, ρu, ρv, ρw, E]`. Averaging that vector does not
//! by itself preserve pressure equilibrium, so [`FlowModel::rebuild`] recomputes
//! the common pressure from the total energy:
//! `p = (E − ½ρ|u|²) / Σ α_k / (γ_k − 1)`.

use super::{FlowModel, IndicatorField};

const ALPHA_FLOOR: f64 = 1e-15;

/// Primitive state of one cell.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MixtureState {
    pub alpha: Vec<f64>,
    /// Phase densities.
    pub density: Vec<f64>,
    pub velocity: [f64; 3],
    pub pressure: f64,
}

impl MixtureState {
    /// Single-phase state.
    pub fn pure(density: f64, velocity: [f64; 3], pressure: f64) -> Self {
        Self {
            alpha: vec![1.0],
            density: vec![density],
            velocity,
            pressure,
        }
    }

    pub fn mixture_density(&self) -> f64 {
        self.alpha
            .iter()
            .zip(&self.density)
            .map(|(a, rho)| a * rho)
            .sum()
    }
}

/// Ideal-gas phases with their heat-capacity ratios.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct IdealGasMixture {
    pub gammas: Vec<f64>,
}

impl IdealGasMixture {
    pub fn new(gammas: Vec<f64>) -> Self {
        Self { gammas }
    }

    /// Single-phase air.
    pub fn air() -> Self {
        Self::new(vec![1.4])
    }

    fn compressibility(&self, alpha: &[f64]) -> f64 {
        alpha
            .iter()
            .zip(&self.gammas)
            .map(|(a, g)| a / (g - 1.0))
            .sum()
    }
}

impl FlowModel for IdealGasMixture {
    type State = MixtureState;

    fn num_phases(&self) -> usize {
        self.gammas.len()
    }

    fn conservative_len(&self) -> usize {
        2 * self.gammas.len() + 4
    }

    fn sample(&self, state: &MixtureState, field: IndicatorField) -> f64 {
        match field {
            IndicatorField::Density => state.mixture_density(),
            IndicatorField::Pressure => state.pressure,
            IndicatorField::VelocityMagnitude => {
                state.velocity.iter().map(|u| u * u).sum::<f64>().sqrt()
            }
            IndicatorField::VolumeFraction(k) => state.alpha.get(k).copied().unwrap_or(0.0),
        }
    }

    fn accumulate(&self, state: &MixtureState, acc: &mut [f64]) {
        let n = self.gammas.len();
        let rho = state.mixture_density();
        for k in 0..n {
            acc[k] += state.alpha[k];
            acc[n + k] += state.alpha[k] * state.density[k];
        }
        let kinetic: f64 = state.velocity.iter().map(|u| u * u).sum::<f64>() * 0.5 * rho;
        for axis in 0..3 {
            acc[2 * n + axis] += rho * state.velocity[axis];
        }
        acc[2 * n + 3] += state.pressure * self.compressibility(&state.alpha) + kinetic;
    }

    fn rebuild(&self, cons: &[f64], state: &mut MixtureState) {
        let n = self.gammas.len();
        state.alpha.resize(n, 0.0);
        state.density.resize(n, 0.0);
        let mut rho = 0.0;
        for k in 0..n {
            state.alpha[k] = cons[k];
            state.density[k] = cons[n + k] / cons[k].max(ALPHA_FLOOR);
            rho += cons[n + k];
        }
        for axis in 0..3 {
            state.velocity[axis] = cons[2 * n + axis] / rho;
        }
        let kinetic: f64 = state.velocity.iter().map(|u| u * u).sum::<f64>() * 0.5 * rho;
        state.pressure = (cons[2 * n + 3] - kinetic) / self.compressibility(&state.alpha);
    }
}
