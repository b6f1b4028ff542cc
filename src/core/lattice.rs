//! Stepping engine.
//!
//! One tick is two ordered phases over the whole cell array:
//!
//! - **Perturb** mutates `plasma` and `parity` in place (plus a bias nudge on
//!   `liquid`).
//! - **Step** reads the perturbed `plasma` and the pre-step `liquid`/`solid`,
//!   writes `next_liquid`/`next_solid`, then swaps.
//!
//! Step draws are generated up front so the per-cell update is a pure
//! function of the snapshots. Scalar and parallel tiers produce identical
//! results for the same draws.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bias::BiasField;
use crate::config::LatticeConfig;
use crate::error::ConfigError;
use crate::lens::{ForgivenessTrigger, LensParams};
use crate::prng::RandomSource;
use crate::topology::{Rewire, Topology};

/// Execution tier for the step phase.
///
/// - `Scalar`: single-threaded (default, works everywhere)
/// - `Parallel`: multi-threaded via rayon (requires `parallel` feature)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExecutionTier {
    #[default]
    Scalar,
    Parallel,
}

impl ExecutionTier {
    /// Tier actually used, honoring compile-time feature gates.
    pub fn effective(self) -> ExecutionTier {
        match self {
            ExecutionTier::Scalar => ExecutionTier::Scalar,
            ExecutionTier::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    ExecutionTier::Parallel
                }
                #[cfg(not(feature = "parallel"))]
                {
                    ExecutionTier::Scalar
                }
            }
        }
    }
}

/// How the two candidates are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BlendRule {
    /// Pick Path B with `path_probability`, Path A otherwise.
    #[default]
    Stochastic,
    /// `local * (1 - p) + divergence * p`. Consumes no draws.
    Weighted,
}

/// Plasma mutation applied when the flip draw passes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PlasmaMutation {
    /// Add `(r - 0.5) * amplitude` and wrap into `[0, 1)`.
    Jitter { amplitude: f32 },
    /// Replace with a fresh uniform sample.
    Reroll,
    /// `1 - p`.
    Toggle,
}

impl Default for PlasmaMutation {
    fn default() -> Self {
        PlasmaMutation::Jitter { amplitude: 0.3 }
    }
}

/// Cyclic wrap into `[0, 1]`; never negative.
#[inline]
fn wrap01(v: f32) -> f32 {
    if v.is_finite() {
        v.rem_euclid(1.0)
    } else {
        0.0
    }
}

#[inline]
fn clamp01(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Counts from one step phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepReport {
    /// Cells where forgiveness fired.
    pub forgiven: usize,
    /// Cells that took Path B (always 0 under `BlendRule::Weighted`).
    pub path_b: usize,
}

/// Read-only inputs of the per-cell update.
struct StepContext<'a> {
    topology: &'a Topology,
    plasma: &'a [f32],
    liquid: &'a [f32],
    solid: &'a [f32],
    parity: &'a [u8],
    bias: &'a [f32],
    draws: &'a [f32],
    params: &'a LensParams,
    rule: BlendRule,
    parity_kick: f32,
    bias_blend: f32,
    alpha: f32,
}

#[derive(Clone, Copy)]
struct CellUpdate {
    liquid: f32,
    solid: f32,
    forgiven: bool,
    path_b: bool,
}

impl StepContext<'_> {
    #[inline]
    fn update(&self, i: usize) -> CellUpdate {
        let p0 = self.plasma[i];
        let l0 = self.liquid[i];
        let s0 = self.solid[i];
        let params = self.params;

        let local = (p0 + l0 + s0) / 3.0;
        let divergence = (p0 - self.topology.neighbor_mean(self.plasma, i)).abs()
            + self.parity[i] as f32 * self.parity_kick;

        let (candidate, path_b) = match self.rule {
            BlendRule::Stochastic => {
                if self.draws[i] < params.path_probability {
                    (divergence, true)
                } else {
                    (local, false)
                }
            }
            BlendRule::Weighted => {
                let p = params.path_probability;
                (local * (1.0 - p) + divergence * p, false)
            }
        };

        let candidate =
            clamp01(candidate + self.bias[i] * params.bias_coupling * self.bias_blend);

        let damping = match params.forgiveness.trigger {
            ForgivenessTrigger::LocalAgitation => {
                let agitation = (candidate - self.topology.neighbor_mean(self.liquid, i)).abs();
                params.local_damping(agitation)
            }
            _ if params.forgiveness_active => Some(params.damping),
            _ => None,
        };

        let (damped, forgiven) = match damping {
            Some(d) => (candidate * (1.0 - (1.0 - d) * candidate.min(1.0)), true),
            None => (candidate, false),
        };

        let liquid = clamp01(damped);
        let solid = clamp01(s0 * (1.0 - self.alpha) + liquid * self.alpha);
        debug_assert!(liquid.is_finite() && solid.is_finite());

        CellUpdate {
            liquid,
            solid,
            forgiven,
            path_b,
        }
    }
}

/// Three coupled fields plus parity over a toroidal grid.
#[derive(Debug, Clone)]
pub struct Lattice {
    cfg: LatticeConfig,
    topology: Topology,

    plasma: Vec<f32>,
    liquid: Vec<f32>,
    solid: Vec<f32>,
    parity: Vec<u8>,

    next_liquid: Vec<f32>,
    next_solid: Vec<f32>,
    /// Path draws for the current step.
    draws: Vec<f32>,

    forgiveness_events: u64,
}

impl Lattice {
    /// Allocate and randomly seed every field.
    pub fn new(cfg: &LatticeConfig, rng: &mut dyn RandomSource) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let topology = Topology::new(cfg.grid_size, cfg.neighborhood)?;
        let n = topology.cell_count();

        let mut plasma = Vec::with_capacity(n);
        let mut liquid = Vec::with_capacity(n);
        let mut solid = Vec::with_capacity(n);
        let mut parity = Vec::with_capacity(n);
        for _ in 0..n {
            plasma.push(rng.next_f32());
            let l = rng.next_f32();
            liquid.push(l);
            solid.push(l * 0.5);
            parity.push(u8::from(rng.next_f32() < 0.5));
        }

        Ok(Self::assemble(*cfg, topology, plasma, liquid, solid, parity))
    }

    /// Build from explicit field values. Values are clamped; parity is
    /// reduced to `{0, 1}`.
    pub fn from_fields(
        cfg: &LatticeConfig,
        plasma: Vec<f32>,
        liquid: Vec<f32>,
        solid: Vec<f32>,
        parity: Vec<u8>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let topology = Topology::new(cfg.grid_size, cfg.neighborhood)?;
        let n = topology.cell_count();
        for (field, got) in [
            ("plasma", plasma.len()),
            ("liquid", liquid.len()),
            ("solid", solid.len()),
            ("parity", parity.len()),
        ] {
            if got != n {
                return Err(ConfigError::FieldLength {
                    field,
                    expected: n,
                    got,
                });
            }
        }

        let clamp = |v: Vec<f32>| v.into_iter().map(clamp01).collect::<Vec<_>>();
        let parity = parity.into_iter().map(|p| u8::from(p != 0)).collect();
        Ok(Self::assemble(
            *cfg,
            topology,
            clamp(plasma),
            clamp(liquid),
            clamp(solid),
            parity,
        ))
    }

    /// Uniform lattice: every cell holds the same values.
    pub fn uniform(
        cfg: &LatticeConfig,
        plasma: f32,
        liquid: f32,
        solid: f32,
        parity: u8,
    ) -> Result<Self, ConfigError> {
        let n = cfg.cell_count();
        Self::from_fields(
            cfg,
            vec![plasma; n],
            vec![liquid; n],
            vec![solid; n],
            vec![parity; n],
        )
    }

    fn assemble(
        cfg: LatticeConfig,
        topology: Topology,
        plasma: Vec<f32>,
        liquid: Vec<f32>,
        solid: Vec<f32>,
        parity: Vec<u8>,
    ) -> Self {
        let n = plasma.len();
        Self {
            cfg,
            topology,
            plasma,
            liquid,
            solid,
            parity,
            next_liquid: vec![0.0; n],
            next_solid: vec![0.0; n],
            draws: vec![0.0; n],
            forgiveness_events: 0,
        }
    }

    pub fn config(&self) -> &LatticeConfig {
        &self.cfg
    }

    /// Swap in a new config while keeping field state.
    ///
    /// `grid_size` and `neighborhood` are fixed for the life of the lattice.
    pub fn set_config(&mut self, cfg: LatticeConfig) -> Result<(), ConfigError> {
        if cfg.grid_size != self.cfg.grid_size {
            return Err(ConfigError::Immutable { field: "grid_size" });
        }
        if cfg.neighborhood != self.cfg.neighborhood {
            return Err(ConfigError::Immutable {
                field: "neighborhood",
            });
        }
        cfg.validate()?;
        self.cfg = cfg;
        Ok(())
    }

    #[inline]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.plasma.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.plasma.is_empty()
    }

    #[inline]
    pub fn plasma(&self) -> &[f32] {
        &self.plasma
    }

    #[inline]
    pub fn liquid(&self) -> &[f32] {
        &self.liquid
    }

    #[inline]
    pub fn solid(&self) -> &[f32] {
        &self.solid
    }

    #[inline]
    pub fn parity(&self) -> &[u8] {
        &self.parity
    }

    /// Cumulative forgiveness firings, counted per cell.
    pub fn forgiveness_events(&self) -> u64 {
        self.forgiveness_events
    }

    /// Perturb phase: plasma mutation, parity flips and the bias nudge.
    pub fn perturb(&mut self, bias: &BiasField, rng: &mut dyn RandomSource) {
        debug_assert_eq!(bias.len(), self.len());
        let cfg = &self.cfg;
        for i in 0..self.plasma.len() {
            let r_flip = rng.next_f32();
            let r_parity = rng.next_f32();

            if r_flip < cfg.flip_probability {
                let p = self.plasma[i];
                self.plasma[i] = match cfg.plasma_mutation {
                    PlasmaMutation::Jitter { amplitude } => {
                        wrap01(p + (rng.next_f32() - 0.5) * amplitude)
                    }
                    PlasmaMutation::Reroll => rng.next_f32(),
                    PlasmaMutation::Toggle => 1.0 - p,
                };
            }
            if r_parity < cfg.parity_probability {
                self.parity[i] ^= 1;
            }

            let b = bias.get(i);
            if b != 0.0 {
                let dir = if self.parity[i] == 1 { -1.0 } else { 1.0 };
                let nudge = b * cfg.bias_nudge * dir;
                self.plasma[i] = clamp01(self.plasma[i] + nudge);
                self.liquid[i] = clamp01(self.liquid[i] + 0.5 * nudge);
            }
            debug_assert!((0.0..=1.0).contains(&self.plasma[i]));
        }
    }

    /// Step phase: candidate, blend, forgiveness, commit.
    pub fn step(
        &mut self,
        params: &LensParams,
        bias: &BiasField,
        rng: &mut dyn RandomSource,
    ) -> StepReport {
        debug_assert_eq!(bias.len(), self.len());
        // Pre-generate path draws (RNG is not thread-safe).
        if self.cfg.blend_rule == BlendRule::Stochastic {
            for d in &mut self.draws {
                *d = rng.next_f32();
            }
        }

        let ctx = StepContext {
            topology: &self.topology,
            plasma: &self.plasma,
            liquid: &self.liquid,
            solid: &self.solid,
            parity: &self.parity,
            bias: bias.values(),
            draws: &self.draws,
            params,
            rule: self.cfg.blend_rule,
            parity_kick: self.cfg.parity_kick,
            bias_blend: self.cfg.bias_blend,
            alpha: self.cfg.alpha,
        };

        let report = match self.cfg.execution_tier.effective() {
            ExecutionTier::Scalar => {
                step_scalar(&ctx, &mut self.next_liquid, &mut self.next_solid)
            }
            ExecutionTier::Parallel => {
                step_parallel(&ctx, &mut self.next_liquid, &mut self.next_solid)
            }
        };

        core::mem::swap(&mut self.liquid, &mut self.next_liquid);
        core::mem::swap(&mut self.solid, &mut self.next_solid);
        self.forgiveness_events += report.forgiven as u64;
        report
    }

    /// Let the topology rewire under the configured plasticity.
    pub fn maybe_rewire(&mut self, tick: u64, rng: &mut dyn RandomSource) -> Option<Rewire> {
        let plasticity = self.cfg.plasticity;
        self.topology.maybe_rewire(&plasticity, tick, rng)
    }
}

fn step_scalar(
    ctx: &StepContext<'_>,
    next_liquid: &mut [f32],
    next_solid: &mut [f32],
) -> StepReport {
    let mut report = StepReport::default();
    for (i, (l, s)) in next_liquid.iter_mut().zip(next_solid.iter_mut()).enumerate() {
        let u = ctx.update(i);
        *l = u.liquid;
        *s = u.solid;
        report.forgiven += u.forgiven as usize;
        report.path_b += u.path_b as usize;
    }
    report
}

#[cfg(feature = "parallel")]
fn step_parallel(
    ctx: &StepContext<'_>,
    next_liquid: &mut [f32],
    next_solid: &mut [f32],
) -> StepReport {
    let (forgiven, path_b) = next_liquid
        .par_iter_mut()
        .zip(next_solid.par_iter_mut())
        .enumerate()
        .map(|(i, (l, s))| {
            let u = ctx.update(i);
            *l = u.liquid;
            *s = u.solid;
            (u.forgiven as usize, u.path_b as usize)
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));
    StepReport { forgiven, path_b }
}

/// Fallback when the `parallel` feature is disabled.
#[cfg(not(feature = "parallel"))]
fn step_parallel(
    ctx: &StepContext<'_>,
    next_liquid: &mut [f32],
    next_solid: &mut [f32],
) -> StepReport {
    step_scalar(ctx, next_liquid, next_solid)
}
