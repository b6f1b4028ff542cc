//! Exogenous bias field.
//!
//! A secondary scalar per cell carrying injected energy from pulses or dense
//! samples. It decays geometrically each tick, optionally diffuses toward its
//! 6-neighbor average, and is always clamped to its configured bound.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{check_finite, check_non_negative, check_range, check_unit, ConfigError};
use crate::topology::{Neighborhood, Topology};

/// Clamp bound for bias values.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BiasBound {
    /// `[-limit, limit]`
    Symmetric { limit: f32 },
    /// `[0, 1]`
    Unit,
}

impl BiasBound {
    #[inline]
    pub fn clamp(self, v: f32) -> f32 {
        match self {
            BiasBound::Symmetric { limit } => v.clamp(-limit, limit),
            BiasBound::Unit => v.clamp(0.0, 1.0),
        }
    }

    /// Largest magnitude a value can reach.
    pub fn max_magnitude(self) -> f32 {
        match self {
            BiasBound::Symmetric { limit } => limit,
            BiasBound::Unit => 1.0,
        }
    }
}

/// Radial kernel applied to pulse injection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Falloff {
    /// `1 - d / radius`
    Linear,
    /// `exp(-d² / radius² * sharpness)`
    Gaussian { sharpness: f32 },
}

impl Falloff {
    #[inline]
    fn weight(self, d: f32, radius: f32) -> f32 {
        match self {
            Falloff::Linear => (1.0 - d / radius).max(0.0),
            Falloff::Gaussian { sharpness } => (-(d * d) / (radius * radius) * sharpness).exp(),
        }
    }
}

/// Distance used for pulse reach. Per-axis deltas are toroidal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BiasConfig {
    /// Per-tick multiplier, in `(0, 1)`.
    pub decay: f32,
    /// Gain applied to externally produced samples.
    pub strength: f32,
    /// Default pulse radius in cells.
    pub radius: f32,
    /// Blend toward the neighbor average per tick, in `[0, 1]`.
    pub diffusion_rate: f32,
    pub bound: BiasBound,
    pub falloff: Falloff,
    pub metric: DistanceMetric,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            decay: 0.9,
            strength: 0.28,
            radius: 3.0,
            diffusion_rate: 0.1,
            bound: BiasBound::Symmetric { limit: 0.3 },
            falloff: Falloff::Linear,
            metric: DistanceMetric::Euclidean,
        }
    }
}

impl BiasConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_finite("bias.decay", self.decay)?;
        if self.decay <= 0.0 || self.decay >= 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "bias.decay",
                value: self.decay,
                min: 0.0,
                max: 1.0,
            });
        }
        check_non_negative("bias.strength", self.strength)?;
        check_finite("bias.radius", self.radius)?;
        if self.radius <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "bias.radius",
                value: self.radius,
                min: f32::MIN_POSITIVE,
                max: f32::MAX,
            });
        }
        check_unit("bias.diffusion_rate", self.diffusion_rate)?;
        if let BiasBound::Symmetric { limit } = self.bound {
            check_range("bias.bound.limit", limit, 0.0, f32::MAX)?;
        }
        if let Falloff::Gaussian { sharpness } = self.falloff {
            check_non_negative("bias.falloff.sharpness", sharpness)?;
        }
        Ok(())
    }
}

/// A radial injection request.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pulse {
    /// Grid coordinate; wraps when out of range.
    pub center: [i64; 3],
    pub amplitude: f32,
    /// Falls back to `BiasConfig::radius` when `None`.
    pub radius: Option<f32>,
}

impl Pulse {
    pub fn new(center: [i64; 3], amplitude: f32) -> Self {
        Self {
            center,
            amplitude,
            radius: None,
        }
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self
    }
}

/// One tick of exogenous input.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BiasSample {
    /// Per-cell energy, added after scaling by `strength`.
    Dense(Vec<f32>),
    /// Sparse pulses; amplitudes are scaled by `strength`.
    Pulses(Vec<Pulse>),
}

#[derive(Debug, Clone)]
pub struct BiasField {
    cfg: BiasConfig,
    grid: Topology,
    values: Vec<f32>,
    scratch: Vec<f32>,
}

impl BiasField {
    pub fn new(size: usize, cfg: BiasConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let grid = Topology::new(size, Neighborhood::VonNeumann)?;
        let n = grid.cell_count();
        Ok(Self {
            cfg,
            grid,
            values: vec![0.0; n],
            scratch: vec![0.0; n],
        })
    }

    pub fn config(&self) -> &BiasConfig {
        &self.cfg
    }

    /// Replace the config; existing values are re-clamped to the new bound.
    pub fn set_config(&mut self, cfg: BiasConfig) -> Result<(), ConfigError> {
        cfg.validate()?;
        self.cfg = cfg;
        for v in &mut self.values {
            *v = cfg.bound.clamp(*v);
        }
        Ok(())
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        self.values[i]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.fill(0.0);
    }

    /// Geometric decay plus optional diffusion toward the 6-neighbor average.
    pub fn decay(&mut self) {
        let decay = self.cfg.decay;
        let bound = self.cfg.bound;
        let d = self.cfg.diffusion_rate;

        if d <= 0.0 {
            for v in &mut self.values {
                *v = bound.clamp(*v * decay);
            }
            return;
        }

        for i in 0..self.values.len() {
            let center = self.values[i] * decay;
            let neighbor_avg = self.grid.neighbor_mean(&self.values, i) * decay;
            self.scratch[i] = bound.clamp(center * (1.0 - d) + neighbor_avg * d);
        }
        core::mem::swap(&mut self.values, &mut self.scratch);
    }

    /// Add `amplitude * falloff(d)` to every cell within `radius` of `center`
    /// (toroidal distance). Returns the number of cells touched.
    ///
    /// A non-positive radius degenerates to a single-cell injection.
    pub fn inject_pulse(&mut self, center: [i64; 3], amplitude: f32, radius: f32) -> usize {
        if !amplitude.is_finite() {
            return 0;
        }
        let bound = self.cfg.bound;
        let [cx, cy, cz] = center;

        if !(radius.is_finite() && radius > 0.0) {
            let idx = self.grid.index(cx, cy, cz);
            self.values[idx] = bound.clamp(self.values[idx] + amplitude);
            return 1;
        }

        let size = self.grid.size();
        let s = size as i64;
        let (cx, cy, cz) = (cx.rem_euclid(s), cy.rem_euclid(s), cz.rem_euclid(s));
        let metric = self.cfg.metric;
        let falloff = self.cfg.falloff;
        let mut touched = 0;

        for x in 0..size {
            let dx = toroidal_delta(x as i64, cx, s);
            if dx > radius {
                continue;
            }
            for y in 0..size {
                let dy = toroidal_delta(y as i64, cy, s);
                if dy > radius {
                    continue;
                }
                for z in 0..size {
                    let dz = toroidal_delta(z as i64, cz, s);
                    let dist = match metric {
                        DistanceMetric::Euclidean => (dx * dx + dy * dy + dz * dz).sqrt(),
                        DistanceMetric::Manhattan => dx + dy + dz,
                    };
                    if dist > radius {
                        continue;
                    }
                    let idx = (x * size + y) * size + z;
                    let delta = amplitude * falloff.weight(dist, radius);
                    self.values[idx] = bound.clamp(self.values[idx] + delta);
                    touched += 1;
                }
            }
        }

        touched
    }

    /// Apply one sample, scaled by `strength`.
    pub fn apply(&mut self, sample: &BiasSample) {
        let gain = self.cfg.strength;
        match sample {
            BiasSample::Dense(energy) => {
                let bound = self.cfg.bound;
                for (v, e) in self.values.iter_mut().zip(energy.iter()) {
                    if e.is_finite() {
                        *v = bound.clamp(*v + e * gain);
                    }
                }
            }
            BiasSample::Pulses(pulses) => {
                for p in pulses {
                    let radius = p.radius.unwrap_or(self.cfg.radius);
                    self.inject_pulse(p.center, p.amplitude * gain, radius);
                }
            }
        }
    }

    /// Per-tick update: decay, then apply every sample in order.
    pub fn tick(&mut self, samples: &[BiasSample]) {
        self.decay();
        for sample in samples {
            self.apply(sample);
        }
    }

    /// Mean of `|v|`: the scalar bias energy consumed by the lens.
    pub fn average_magnitude(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().map(|v| v.abs()).sum::<f32>() / self.values.len() as f32
    }

    /// Largest `|v|` currently stored.
    pub fn peak_magnitude(&self) -> f32 {
        self.values.iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
    }
}

#[inline]
fn toroidal_delta(a: i64, b: i64, size: i64) -> f32 {
    let d = (a - b).abs();
    d.min(size - d) as f32
}
