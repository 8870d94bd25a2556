//! Immutable configuration shared by every AMR operation.
//!
//! An [`AmrContext`] is built once at setup (or deserialised from the host's
//! input deck), validated, and then passed by reference to refine, unrefine
//! and the ghost mirror. Nothing in the engine mutates it afterwards.

use crate::mesh_error::AmrError;
use crate::physics::IndicatorField;

/// Largest supported refinement depth (tree coordinates are `u32`).
pub const MAX_SUPPORTED_LEVEL: u8 = 24;

/// Which scalar fields feed the refinement indicator.
///
/// Fields are always tested in the fixed priority order density, pressure,
/// velocity magnitude, then each phase's volume fraction.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Relative variation above which both cells of an interface are flagged.
    pub threshold: f64,
    pub density: bool,
    pub pressure: bool,
    pub velocity: bool,
    pub volume_fractions: bool,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            density: true,
            pressure: false,
            velocity: false,
            volume_fractions: false,
        }
    }
}

impl IndicatorConfig {
    /// Enabled fields in priority order.
    pub fn fields(&self, num_phases: usize) -> Vec<IndicatorField> {
        let mut out = Vec::new();
        if self.density {
            out.push(IndicatorField::Density);
        }
        if self.pressure {
            out.push(IndicatorField::Pressure);
        }
        if self.velocity {
            out.push(IndicatorField::VelocityMagnitude);
        }
        if self.volume_fractions {
            out.extend((0..num_phases).map(IndicatorField::VolumeFraction));
        }
        out
    }
}

/// Secondary indicator pass widening the refined region across level jumps.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BufferPolicy {
    /// An interface is buffered when either side already exceeds this value.
    pub activation: f64,
    /// Amount added to both sides of a buffered interface.
    pub increment: f64,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            activation: 0.05,
            increment: 0.1,
        }
    }
}

/// Run-wide AMR configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AmrContext {
    /// Spatial dimension (1, 2 or 3).
    pub dim: usize,
    pub num_phases: usize,
    pub num_transports: usize,
    /// Rank of this process and number of processes.
    pub rank: usize,
    pub size: usize,
    /// Deepest level a cell may be refined to.
    pub max_level: u8,
    /// A leaf refines when `xi >= xi_split`.
    pub xi_split: f64,
    /// A split cell coarsens when `xi < xi_join`.
    pub xi_join: f64,
    pub indicator: IndicatorConfig,
    pub buffer: BufferPolicy,
    /// Ghost face matching tolerance, relative to the face size.
    pub position_tolerance: f64,
}

impl Default for AmrContext {
    fn default() -> Self {
        Self {
            dim: 1,
            num_phases: 1,
            num_transports: 0,
            rank: 0,
            size: 1,
            max_level: 2,
            xi_split: 0.11,
            xi_join: 0.05,
            indicator: IndicatorConfig::default(),
            buffer: BufferPolicy::default(),
            position_tolerance: 1e-6,
        }
    }
}

impl AmrContext {
    /// Serial context of the given dimension with default thresholds.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    /// The same configuration seen from another rank.
    pub fn for_rank(&self, rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            ..self.clone()
        }
    }

    pub fn children_per_cell(&self) -> usize {
        1 << self.dim
    }

    pub fn children_per_face(&self) -> usize {
        1 << (self.dim - 1)
    }

    pub fn validate(&self) -> Result<(), AmrError> {
        let fail = |msg: String| Err(AmrError::InvalidConfig(msg));
        if !(1..=3).contains(&self.dim) {
            return fail(format!("dimension must be 1, 2 or 3 (got {})", self.dim));
        }
        if self.num_phases == 0 {
            return fail("at least one phase is required".into());
        }
        if self.size == 0 || self.rank >= self.size {
            return fail(format!("rank {} outside of {} processes", self.rank, self.size));
        }
        if self.max_level > MAX_SUPPORTED_LEVEL {
            return fail(format!(
                "max_level {} exceeds {MAX_SUPPORTED_LEVEL}",
                self.max_level
            ));
        }
        if !(self.xi_join >= 0.0 && self.xi_join <= self.xi_split) {
            return fail(format!(
                "xi_join ({}) must lie in [0, xi_split ({})]",
                self.xi_join, self.xi_split
            ));
        }
        if !(self.indicator.threshold > 0.0) {
            return fail("indicator threshold must be positive".into());
        }
        if !(self.position_tolerance > 0.0) {
            return fail("position tolerance must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AmrContext::default().validate().is_ok());
        assert!(AmrContext::new(3).validate().is_ok());
    }

    #[test]
    fn rejects_inconsistent_settings() {
        assert!(AmrContext::new(4).validate().is_err());
        let ctx = AmrContext {
            xi_join: 0.5,
            xi_split: 0.2,
            ..AmrContext::default()
        };
        assert!(matches!(ctx.validate(), Err(AmrError::InvalidConfig(_))));
        assert!(AmrContext::default().for_rank(2, 2).validate().is_err());
    }

    #[test]
    fn fields_follow_priority_order() {
        let cfg = IndicatorConfig {
            pressure: true,
            velocity: true,
            volume_fractions: true,
            ..IndicatorConfig::default()
        };
        assert_eq!(
            cfg.fields(2),
            vec![
                IndicatorField::Density,
                IndicatorField::Pressure,
                IndicatorField::VelocityMagnitude,
                IndicatorField::VolumeFraction(0),
                IndicatorField::VolumeFraction(1),
            ]
        );
    }

    #[test]
    fn partial_json_uses_defaults() {
        let ctx: AmrContext =
            serde_json::from_str(r#"{"dim": 2, "max_level": 3, "indicator": {"threshold": 0.2}}"#)
                .unwrap();
        assert_eq!(ctx.dim, 2);
        assert_eq!(ctx.max_level, 3);
        assert_eq!(ctx.indicator.threshold, 0.2);
        assert!(ctx.indicator.density);
        assert_eq!(ctx.buffer, BufferPolicy::default());
    }
}
