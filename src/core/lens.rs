//! Lens weighting.
//!
//! Turns the four lens weights plus the current metrics into the scalar
//! control parameters the stepping engine consumes for one tick.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{
    check_finite, check_interval, check_non_negative, check_unit, ConfigError,
};
use crate::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LensWeights {
    pub human: f32,
    pub predictive: f32,
    pub systemic: f32,
    pub harmonic: f32,
}

impl Default for LensWeights {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl LensWeights {
    /// Returned by [`normalized`](Self::normalized) for a degenerate sum.
    pub const NEUTRAL: LensWeights = LensWeights {
        human: 0.25,
        predictive: 0.25,
        systemic: 0.25,
        harmonic: 0.25,
    };

    pub fn new(human: f32, predictive: f32, systemic: f32, harmonic: f32) -> Self {
        Self {
            human,
            predictive,
            systemic,
            harmonic,
        }
    }

    pub fn from_profile(profile: LensProfile) -> Self {
        match profile {
            LensProfile::Calm => Self::new(0.6, 0.2, 0.25, 0.7),
            LensProfile::Curious => Self::new(0.35, 0.55, 0.35, 0.4),
            LensProfile::Alert => Self::new(0.4, 0.65, 0.45, 0.35),
            LensProfile::Harmonic => Self::new(0.45, 0.35, 0.4, 0.9),
        }
    }

    pub fn sum(&self) -> f32 {
        self.human + self.predictive + self.systemic + self.harmonic
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.human, self.predictive, self.systemic, self.harmonic]
    }

    /// Scale to sum 1. Zero, negative or non-finite sums fall back to
    /// [`NEUTRAL`](Self::NEUTRAL). Negative components are treated as 0.
    pub fn normalized(&self) -> Self {
        let c = |v: f32| if v.is_finite() { v.max(0.0) } else { 0.0 };
        let w = Self::new(c(self.human), c(self.predictive), c(self.systemic), c(self.harmonic));
        let sum = w.sum();
        if !(sum.is_finite() && sum > 0.0) {
            return Self::NEUTRAL;
        }
        Self::new(
            w.human / sum,
            w.predictive / sum,
            w.systemic / sum,
            w.harmonic / sum,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("lens_weights.human", self.human)?;
        check_non_negative("lens_weights.predictive", self.predictive)?;
        check_non_negative("lens_weights.systemic", self.systemic)?;
        check_non_negative("lens_weights.harmonic", self.harmonic)?;
        Ok(())
    }
}

/// Named weight presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LensProfile {
    Calm,
    Curious,
    Alert,
    Harmonic,
}

impl LensProfile {
    pub const ALL: [LensProfile; 4] = [
        LensProfile::Calm,
        LensProfile::Curious,
        LensProfile::Alert,
        LensProfile::Harmonic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LensProfile::Calm => "calm",
            LensProfile::Curious => "curious",
            LensProfile::Alert => "alert",
            LensProfile::Harmonic => "harmonic",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LensConfig {
    /// Clamp range for the Path B probability, within `[0, 1]`.
    pub path_probability_range: [f32; 2],
    /// Baseline Path B probability. Clamped into range, never rejected.
    pub base_path_b: f32,
    pub exploration_gain: f32,
    pub stability_gain: f32,
    pub bias_gain_range: [f32; 2],
    /// Systemic weight contribution to bias coupling.
    pub systemic_gain: f32,
    /// Energy contribution to bias coupling, centered at 0.5.
    pub energy_gain: f32,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            path_probability_range: [0.05, 0.95],
            base_path_b: 0.35,
            exploration_gain: 0.3,
            stability_gain: 0.3,
            bias_gain_range: [0.5, 2.0],
            systemic_gain: 0.6,
            energy_gain: 0.4,
        }
    }
}

impl LensConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_interval("lens.path_probability_range", self.path_probability_range, 0.0, 1.0)?;
        check_finite("lens.base_path_b", self.base_path_b)?;
        check_non_negative("lens.exploration_gain", self.exploration_gain)?;
        check_non_negative("lens.stability_gain", self.stability_gain)?;
        check_interval("lens.bias_gain_range", self.bias_gain_range, 0.0, f32::MAX)?;
        check_finite("lens.systemic_gain", self.systemic_gain)?;
        check_finite("lens.energy_gain", self.energy_gain)?;
        Ok(())
    }
}

/// What the forgiveness threshold is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ForgivenessTrigger {
    /// Population variance of the metric field.
    #[default]
    Dispersion,
    /// `1 - coherence`.
    Incoherence,
    /// Per cell: `|candidate - neighbor mean|`.
    LocalAgitation,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForgivenessConfig {
    pub threshold: f32,
    pub damping_floor: f32,
    /// Harmonic-scaled damping applied as soon as the trigger fires.
    pub gain: f32,
    /// Additional damping per unit of overflow above `threshold`.
    pub overflow_gain: f32,
    pub trigger: ForgivenessTrigger,
}

impl Default for ForgivenessConfig {
    fn default() -> Self {
        Self {
            threshold: 0.06,
            damping_floor: 0.4,
            gain: 0.4,
            overflow_gain: 2.0,
            trigger: ForgivenessTrigger::Dispersion,
        }
    }
}

impl ForgivenessConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("forgiveness.threshold", self.threshold)?;
        check_unit("forgiveness.damping_floor", self.damping_floor)?;
        check_non_negative("forgiveness.gain", self.gain)?;
        check_non_negative("forgiveness.overflow_gain", self.overflow_gain)?;
        Ok(())
    }

    /// Damping for a measured value, or `None` when below threshold.
    ///
    /// The result always lies in `[damping_floor, 1]`.
    #[inline]
    pub fn damping(&self, harmonic: f32, measure: f32) -> Option<f32> {
        if !(measure >= self.threshold) {
            return None;
        }
        let overflow = measure - self.threshold;
        let d = 1.0 - harmonic * (self.gain + self.overflow_gain * overflow);
        Some(d.clamp(self.damping_floor, 1.0))
    }
}

/// Control parameters for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LensParams {
    /// Normalized weights.
    pub weights: LensWeights,
    pub stability: f32,
    pub exploration: f32,
    /// Probability of choosing Path B (neighbor divergence).
    pub path_probability: f32,
    pub bias_coupling: f32,
    /// Lattice-wide damping; 1 when inactive.
    pub damping: f32,
    /// Lattice-wide trigger state. Always false for per-cell triggers.
    pub forgiveness_active: bool,
    /// Value compared against the threshold (0 for per-cell triggers).
    pub forgiveness_measure: f32,
    pub forgiveness: ForgivenessConfig,
}

impl LensParams {
    /// Damping for a per-cell measure under the same policy.
    #[inline]
    pub fn local_damping(&self, measure: f32) -> Option<f32> {
        self.forgiveness.damping(self.weights.harmonic, measure)
    }
}

/// Derive this tick's parameters. Pure.
pub fn compute(
    weights: &LensWeights,
    metrics: &Metrics,
    lens: &LensConfig,
    forgiveness: &ForgivenessConfig,
) -> LensParams {
    let w = weights.normalized();
    let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
    let energy = finite(metrics.energy);
    let coherence = finite(metrics.coherence).clamp(0.0, 1.0);
    let bias_energy = finite(metrics.bias_energy);

    let stability =
        (0.6 * w.human + 0.4 * w.harmonic) * lens.stability_gain * (0.5 + 0.5 * coherence);
    let exploration = (0.8 * w.predictive + 0.2 * w.systemic) * lens.exploration_gain;

    let [gain_lo, gain_hi] = lens.bias_gain_range;
    let bias_coupling = (1.0 + w.systemic * lens.systemic_gain + (energy - 0.5) * lens.energy_gain)
        .clamp(gain_lo, gain_hi);

    let [lo, hi] = lens.path_probability_range;
    let base = lens.base_path_b.clamp(lo, hi);
    let path_probability =
        finite(base + exploration - stability + bias_energy * bias_coupling).clamp(lo, hi);

    let measure = match forgiveness.trigger {
        ForgivenessTrigger::Dispersion => Some(finite(metrics.dispersion)),
        ForgivenessTrigger::Incoherence => Some(1.0 - coherence),
        ForgivenessTrigger::LocalAgitation => None,
    };
    let engaged = measure.and_then(|m| forgiveness.damping(w.harmonic, m));

    LensParams {
        weights: w,
        stability,
        exploration,
        path_probability,
        bias_coupling,
        damping: engaged.unwrap_or(1.0),
        forgiveness_active: engaged.is_some(),
        forgiveness_measure: measure.unwrap_or(0.0),
        forgiveness: *forgiveness,
    }
}
