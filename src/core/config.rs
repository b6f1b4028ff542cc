#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bias::{BiasBound, BiasConfig, DistanceMetric, Falloff};
use crate::error::{check_non_negative, check_unit, ConfigError};
use crate::lattice::{BlendRule, ExecutionTier, PlasmaMutation};
use crate::lens::{
    ForgivenessConfig, ForgivenessTrigger, LensConfig, LensProfile, LensWeights,
};
use crate::metrics::MetricField;
use crate::topology::{Neighborhood, PlasticityConfig, Topology};

/// Complete session configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LatticeConfig {
    /// Cube side; `grid_size³` cells.
    pub grid_size: usize,
    pub neighborhood: Neighborhood,

    /// Per-cell chance of a plasma mutation during perturb.
    pub flip_probability: f32,
    /// Per-cell chance of flipping parity during perturb.
    pub parity_probability: f32,
    pub plasma_mutation: PlasmaMutation,
    /// Bias-driven nudge applied to plasma (and half of it to liquid).
    pub bias_nudge: f32,

    /// Divergence bonus for cells with parity set.
    pub parity_kick: f32,
    /// Gain on `bias * bias_coupling` added to the candidate.
    pub bias_blend: f32,
    pub blend_rule: BlendRule,
    /// Solid low-pass mixing factor.
    pub alpha: f32,

    pub metric_field: MetricField,
    /// Dedicated stencil for coherence (e.g. Moore while the lattice stays
    /// von Neumann). `None` reuses the lattice topology.
    pub metrics_neighborhood: Option<Neighborhood>,

    pub lens_weights: LensWeights,
    pub lens: LensConfig,
    pub forgiveness: ForgivenessConfig,
    pub bias: BiasConfig,
    pub plasticity: PlasticityConfig,

    /// RNG seed; `None` uses a fixed default.
    pub seed: Option<u64>,
    pub execution_tier: ExecutionTier,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            grid_size: 16,
            neighborhood: Neighborhood::VonNeumann,
            flip_probability: 0.02,
            parity_probability: 0.02,
            plasma_mutation: PlasmaMutation::default(),
            bias_nudge: 0.1,
            parity_kick: 0.06,
            bias_blend: 0.5,
            blend_rule: BlendRule::Stochastic,
            alpha: 0.16,
            metric_field: MetricField::Liquid,
            metrics_neighborhood: None,
            lens_weights: LensWeights::default(),
            lens: LensConfig::default(),
            forgiveness: ForgivenessConfig::default(),
            bias: BiasConfig::default(),
            plasticity: PlasticityConfig::default(),
            seed: None,
            execution_tier: ExecutionTier::Scalar,
        }
    }
}

impl LatticeConfig {
    /// Default config with a given grid side.
    pub fn with_size(grid_size: usize) -> Self {
        Self {
            grid_size,
            ..Default::default()
        }
    }

    /// Set the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_weights(mut self, weights: LensWeights) -> Self {
        self.lens_weights = weights;
        self
    }

    pub fn with_profile(mut self, profile: LensProfile) -> Self {
        self.lens_weights = LensWeights::from_profile(profile);
        self
    }

    pub fn with_neighborhood(mut self, neighborhood: Neighborhood) -> Self {
        self.neighborhood = neighborhood;
        self
    }

    pub fn with_execution_tier(mut self, tier: ExecutionTier) -> Self {
        self.execution_tier = tier;
        self
    }

    pub fn cell_count(&self) -> usize {
        self.grid_size * self.grid_size * self.grid_size
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(Topology::MIN_SIZE..=Topology::MAX_SIZE).contains(&self.grid_size) {
            return Err(ConfigError::GridSize {
                size: self.grid_size,
                min: Topology::MIN_SIZE,
                max: Topology::MAX_SIZE,
            });
        }
        check_unit("flip_probability", self.flip_probability)?;
        check_unit("parity_probability", self.parity_probability)?;
        check_unit("alpha", self.alpha)?;
        if let PlasmaMutation::Jitter { amplitude } = self.plasma_mutation {
            check_non_negative("plasma_mutation.amplitude", amplitude)?;
        }
        check_non_negative("bias_nudge", self.bias_nudge)?;
        check_non_negative("parity_kick", self.parity_kick)?;
        check_non_negative("bias_blend", self.bias_blend)?;
        self.lens_weights.validate()?;
        self.lens.validate()?;
        self.forgiveness.validate()?;
        self.bias.validate()?;
        self.plasticity.validate()?;
        Ok(())
    }
}

/// Live configuration deltas. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConfigOverrides {
    /// Only honoured before a session exists.
    pub grid_size: Option<usize>,
    /// Only honoured before a session exists.
    pub neighborhood: Option<Neighborhood>,

    pub flip_probability: Option<f32>,
    pub parity_probability: Option<f32>,
    pub plasma_mutation: Option<PlasmaMutation>,
    pub bias_nudge: Option<f32>,
    pub parity_kick: Option<f32>,
    pub bias_blend: Option<f32>,
    pub blend_rule: Option<BlendRule>,
    pub alpha: Option<f32>,
    pub metric_field: Option<MetricField>,
    /// `Some(None)` falls back to the lattice stencil. In JSON, an explicit
    /// `null` clears and an absent key leaves it alone.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "present_or_null", skip_serializing_if = "Option::is_none")
    )]
    pub metrics_neighborhood: Option<Option<Neighborhood>>,

    /// Applied before `lens_weights`.
    pub profile: Option<LensProfile>,
    pub lens_weights: Option<LensWeights>,
    pub path_probability_range: Option<[f32; 2]>,
    pub base_path_b: Option<f32>,
    pub exploration_gain: Option<f32>,
    pub stability_gain: Option<f32>,
    pub bias_gain_range: Option<[f32; 2]>,
    pub systemic_gain: Option<f32>,
    pub energy_gain: Option<f32>,

    pub forgiveness_threshold: Option<f32>,
    pub damping_floor: Option<f32>,
    pub forgiveness_gain: Option<f32>,
    pub forgiveness_overflow_gain: Option<f32>,
    pub forgiveness_trigger: Option<ForgivenessTrigger>,

    pub bias_decay: Option<f32>,
    pub bias_strength: Option<f32>,
    pub bias_radius: Option<f32>,
    pub bias_diffusion_rate: Option<f32>,
    pub bias_bound: Option<BiasBound>,
    pub bias_falloff: Option<Falloff>,
    pub bias_metric: Option<DistanceMetric>,

    pub rewire_probability: Option<f32>,
    pub rewire_window: Option<u32>,

    pub seed: Option<u64>,
    pub execution_tier: Option<ExecutionTier>,
}

/// A key that is present maps to `Some`, even when its value is `null`.
#[cfg(feature = "serde")]
fn present_or_null<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layer the set fields over `base`. The result is not validated.
    pub fn merge(&self, base: &LatticeConfig) -> LatticeConfig {
        fn set<T: Copy>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }

        let mut cfg = *base;
        set(&mut cfg.grid_size, self.grid_size);
        set(&mut cfg.neighborhood, self.neighborhood);

        set(&mut cfg.flip_probability, self.flip_probability);
        set(&mut cfg.parity_probability, self.parity_probability);
        set(&mut cfg.plasma_mutation, self.plasma_mutation);
        set(&mut cfg.bias_nudge, self.bias_nudge);
        set(&mut cfg.parity_kick, self.parity_kick);
        set(&mut cfg.bias_blend, self.bias_blend);
        set(&mut cfg.blend_rule, self.blend_rule);
        set(&mut cfg.alpha, self.alpha);
        set(&mut cfg.metric_field, self.metric_field);
        set(&mut cfg.metrics_neighborhood, self.metrics_neighborhood);

        if let Some(profile) = self.profile {
            cfg.lens_weights = LensWeights::from_profile(profile);
        }
        set(&mut cfg.lens_weights, self.lens_weights);
        set(&mut cfg.lens.path_probability_range, self.path_probability_range);
        set(&mut cfg.lens.base_path_b, self.base_path_b);
        set(&mut cfg.lens.exploration_gain, self.exploration_gain);
        set(&mut cfg.lens.stability_gain, self.stability_gain);
        set(&mut cfg.lens.bias_gain_range, self.bias_gain_range);
        set(&mut cfg.lens.systemic_gain, self.systemic_gain);
        set(&mut cfg.lens.energy_gain, self.energy_gain);

        set(&mut cfg.forgiveness.threshold, self.forgiveness_threshold);
        set(&mut cfg.forgiveness.damping_floor, self.damping_floor);
        set(&mut cfg.forgiveness.gain, self.forgiveness_gain);
        set(&mut cfg.forgiveness.overflow_gain, self.forgiveness_overflow_gain);
        set(&mut cfg.forgiveness.trigger, self.forgiveness_trigger);

        set(&mut cfg.bias.decay, self.bias_decay);
        set(&mut cfg.bias.strength, self.bias_strength);
        set(&mut cfg.bias.radius, self.bias_radius);
        set(&mut cfg.bias.diffusion_rate, self.bias_diffusion_rate);
        set(&mut cfg.bias.bound, self.bias_bound);
        set(&mut cfg.bias.falloff, self.bias_falloff);
        set(&mut cfg.bias.metric, self.bias_metric);

        set(&mut cfg.plasticity.rewire_probability, self.rewire_probability);
        set(&mut cfg.plasticity.window, self.rewire_window);

        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        set(&mut cfg.execution_tier, self.execution_tier);
        cfg
    }
}
