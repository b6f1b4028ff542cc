//! Simulation session.
//!
//! Owns one lattice, its bias field and the random source, and drives the
//! per-tick pipeline:
//!
//! 1. bias decay plus pending samples
//! 2. metrics sample
//! 3. lens weighting
//! 4. perturb
//! 5. step
//! 6. structural plasticity
//!
//! Observers only ever see state between ticks.

use crate::bias::{BiasField, BiasSample};
use crate::config::{ConfigOverrides, LatticeConfig};
use crate::error::ConfigError;
use crate::lattice::{Lattice, StepReport};
use crate::lens::{self, LensParams};
use crate::metrics::{Metrics, MetricsCollector};
use crate::prng::{Prng, RandomSource};
use crate::sources::BiasSource;

pub struct Session {
    cfg: LatticeConfig,
    lattice: Lattice,
    bias: BiasField,
    collector: MetricsCollector,
    rng: Box<dyn RandomSource + Send>,
    source: Option<Box<dyn BiasSource + Send>>,
    pending: Vec<BiasSample>,

    tick: u64,
    rewire_count: u64,
    forgiving: bool,
    last_report: StepReport,
    last_params: Option<LensParams>,
    last_metrics: Metrics,
}

impl Session {
    /// Seeded from `cfg.seed` (or a fixed default).
    pub fn new(cfg: LatticeConfig) -> Result<Self, ConfigError> {
        let rng = Prng::new(cfg.seed.unwrap_or(1));
        Self::with_rng(cfg, Box::new(rng))
    }

    /// Use an explicit random source for the whole session.
    pub fn with_rng(
        cfg: LatticeConfig,
        mut rng: Box<dyn RandomSource + Send>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let lattice = Lattice::new(&cfg, &mut *rng)?;
        let bias = BiasField::new(cfg.grid_size, cfg.bias)?;
        let collector =
            MetricsCollector::new(cfg.metric_field, cfg.metrics_neighborhood, cfg.grid_size)?;
        let last_metrics = collector.sample(&lattice, &bias);

        tracing::info!(
            grid_size = cfg.grid_size,
            cells = lattice.len(),
            neighborhood = ?cfg.neighborhood,
            seed = ?cfg.seed,
            "phase lattice session created"
        );

        Ok(Self {
            cfg,
            lattice,
            bias,
            collector,
            rng,
            source: None,
            pending: Vec::new(),
            tick: 0,
            rewire_count: 0,
            forgiving: false,
            last_report: StepReport::default(),
            last_params: None,
            last_metrics,
        })
    }

    pub fn with_source(mut self, source: Box<dyn BiasSource + Send>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn set_source(&mut self, source: Box<dyn BiasSource + Send>) {
        self.source = Some(source);
    }

    pub fn clear_source(&mut self) {
        self.source = None;
    }

    /// Queue a sample for the next tick.
    pub fn push_sample(&mut self, sample: BiasSample) {
        self.pending.push(sample);
    }

    /// Inject directly into the bias field. `None` uses the configured radius.
    /// Returns the number of cells touched.
    pub fn inject_pulse(&mut self, center: [i64; 3], amplitude: f32, radius: Option<f32>) -> usize {
        let radius = radius.unwrap_or(self.cfg.bias.radius);
        self.bias.inject_pulse(center, amplitude, radius)
    }

    /// Advance one tick and return the post-tick metrics.
    pub fn tick(&mut self) -> Metrics {
        let tick = self.tick;

        if let Some(source) = self.source.as_mut() {
            if let Some(sample) = source.next_sample(tick, self.lattice.topology(), &mut *self.rng) {
                self.pending.push(sample);
            }
        }
        self.bias.tick(&self.pending);
        self.pending.clear();

        let pre = self.collector.sample(&self.lattice, &self.bias);
        let params = lens::compute(
            &self.cfg.lens_weights,
            &pre,
            &self.cfg.lens,
            &self.cfg.forgiveness,
        );

        self.lattice.perturb(&self.bias, &mut *self.rng);
        let report = self.lattice.step(&params, &self.bias, &mut *self.rng);

        if self.lattice.maybe_rewire(tick, &mut *self.rng).is_some() {
            self.rewire_count += 1;
        }

        let forgiving = report.forgiven > 0;
        if forgiving != self.forgiving {
            if forgiving {
                tracing::debug!(
                    tick,
                    cells = report.forgiven,
                    damping = params.damping,
                    measure = params.forgiveness_measure,
                    "forgiveness engaged"
                );
            } else {
                tracing::debug!(tick, "forgiveness released");
            }
            self.forgiving = forgiving;
        }

        self.tick += 1;
        self.last_report = report;
        self.last_params = Some(params);

        let mut m = self.collector.sample(&self.lattice, &self.bias);
        m.tick = self.tick;
        m.forgiven_last_tick = report.forgiven;
        m.path_b_last_tick = report.path_b;
        m.rewire_count = self.rewire_count;
        self.last_metrics = m;

        tracing::trace!(
            tick = m.tick,
            energy = m.energy,
            dispersion = m.dispersion,
            coherence = m.coherence,
            bias_energy = m.bias_energy,
            path_probability = params.path_probability,
            "tick"
        );
        m
    }

    /// Run `ticks` ticks; returns the last metrics.
    pub fn run(&mut self, ticks: u64) -> Metrics {
        for _ in 0..ticks {
            self.tick();
        }
        self.last_metrics
    }

    /// Merge live deltas. `grid_size` and `neighborhood` must match the
    /// running session.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        if overrides.grid_size.is_some_and(|s| s != self.cfg.grid_size) {
            return Err(ConfigError::Immutable { field: "grid_size" });
        }
        if overrides
            .neighborhood
            .is_some_and(|n| n != self.cfg.neighborhood)
        {
            return Err(ConfigError::Immutable {
                field: "neighborhood",
            });
        }
        self.update_config(|cfg| *cfg = overrides.merge(cfg))
    }

    /// Update the live configuration without touching evolved field state.
    ///
    /// Topology-bearing fields (`grid_size`, `neighborhood`) cannot change on a
    /// running session. A changed seed resets the generator.
    pub fn update_config<F>(&mut self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut LatticeConfig),
    {
        let old = self.cfg;
        let mut cfg = old;
        f(&mut cfg);

        if cfg.grid_size != old.grid_size {
            return Err(ConfigError::Immutable { field: "grid_size" });
        }
        if cfg.neighborhood != old.neighborhood {
            return Err(ConfigError::Immutable {
                field: "neighborhood",
            });
        }
        cfg.validate()?;

        let collector = if cfg.metrics_neighborhood != old.metrics_neighborhood {
            Some(MetricsCollector::new(
                cfg.metric_field,
                cfg.metrics_neighborhood,
                cfg.grid_size,
            )?)
        } else {
            None
        };

        self.lattice.set_config(cfg)?;
        self.bias.set_config(cfg.bias)?;
        if let Some(c) = collector {
            self.collector = c;
        }
        self.collector.set_field(cfg.metric_field);
        self.cfg = cfg;

        // If a seed is newly set/changed, reset the PRNG for reproducibility.
        if cfg.seed != old.seed {
            if let Some(seed) = cfg.seed {
                self.rng = Box::new(Prng::new(seed));
            }
        }

        tracing::info!(tick = self.tick, "session config updated");
        Ok(())
    }

    pub fn config(&self) -> &LatticeConfig {
        &self.cfg
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn bias(&self) -> &BiasField {
        &self.bias
    }

    pub fn plasma(&self) -> &[f32] {
        self.lattice.plasma()
    }

    pub fn liquid(&self) -> &[f32] {
        self.lattice.liquid()
    }

    pub fn solid(&self) -> &[f32] {
        self.lattice.solid()
    }

    pub fn parity(&self) -> &[u8] {
        self.lattice.parity()
    }

    /// Cell centers for renderers, `spacing` apart.
    pub fn positions(&self, spacing: f32) -> Vec<[f32; 3]> {
        self.lattice.topology().positions(spacing)
    }

    /// Most recent metrics (construction-time sample before the first tick).
    pub fn metrics(&self) -> Metrics {
        self.last_metrics
    }

    pub fn last_params(&self) -> Option<LensParams> {
        self.last_params
    }

    pub fn last_report(&self) -> StepReport {
        self.last_report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bias::{BiasBound, Pulse};
    use crate::lens::LensProfile;
    use crate::prng::ConstantSource;
    use crate::sources::RandomPulses;
    use crate::topology::Neighborhood;

    fn session(seed: u64) -> Session {
        let cfg = LatticeConfig::with_size(6).with_seed(seed);
        Session::new(cfg)
            .unwrap()
            .with_source(Box::new(RandomPulses {
                every: 3,
                ..Default::default()
            }))
    }

    #[test]
    fn seeded_sessions_are_reproducible() {
        let mut a = session(42);
        let mut b = session(42);
        for _ in 0..25 {
            assert_eq!(a.tick(), b.tick());
        }
        assert_eq!(a.liquid(), b.liquid());
        assert_eq!(a.parity(), b.parity());
        assert_eq!(a.bias().values(), b.bias().values());

        let mut c = session(43);
        c.run(25);
        assert_ne!(a.liquid(), c.liquid());
    }

    #[test]
    fn metrics_track_ticks_and_stay_bounded() {
        let mut s = session(7);
        let limit = match s.config().bias.bound {
            BiasBound::Symmetric { limit } => limit,
            BiasBound::Unit => 1.0,
        };
        let mut last_events = 0;
        for t in 1..=40 {
            let m = s.tick();
            assert_eq!(m.tick, t);
            assert!((0.0..=1.0).contains(&m.energy));
            assert!((0.0..=1.0).contains(&m.coherence));
            assert!(m.dispersion >= 0.0);
            assert!(m.bias_energy <= limit);
            assert!(m.forgiveness_event_count >= last_events);
            last_events = m.forgiveness_event_count;

            let p = s.last_params().unwrap();
            let [lo, hi] = s.config().lens.path_probability_range;
            assert!((lo..=hi).contains(&p.path_probability));
        }
        assert_eq!(s.tick_count(), 40);
        assert_eq!(s.metrics().tick, 40);
    }

    #[test]
    fn overrides_keep_field_state() {
        let mut s = session(3);
        s.run(10);
        let liquid = s.liquid().to_vec();
        let solid = s.solid().to_vec();

        let overrides = ConfigOverrides {
            alpha: Some(0.4),
            profile: Some(LensProfile::Harmonic),
            grid_size: Some(6),
            ..Default::default()
        };
        s.apply_overrides(&overrides).unwrap();
        assert_eq!(s.liquid(), &liquid[..]);
        assert_eq!(s.solid(), &solid[..]);
        assert_eq!(s.config().alpha, 0.4);
        assert_eq!(s.lattice().config().alpha, 0.4);
        assert_eq!(s.tick_count(), 10);
    }

    #[test]
    fn topology_overrides_are_rejected() {
        let mut s = session(3);
        let before = *s.config();
        let err = s
            .apply_overrides(&ConfigOverrides {
                grid_size: Some(8),
                alpha: Some(0.9),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, ConfigError::Immutable { field: "grid_size" });
        assert_eq!(*s.config(), before);

        let err = s
            .update_config(|cfg| cfg.neighborhood = Neighborhood::Moore)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Immutable { .. }));

        let err = s.update_config(|cfg| cfg.alpha = 2.0).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "alpha", .. }));
        assert_eq!(*s.config(), before);
    }

    #[test]
    fn seed_change_reseeds_generator() {
        let mut a = session(1);
        let mut b = session(1);
        let mut c = session(1);
        a.run(3);
        b.run(3);
        c.run(3);
        a.update_config(|cfg| cfg.seed = Some(7)).unwrap();
        b.update_config(|cfg| cfg.seed = Some(7)).unwrap();
        a.run(3);
        b.run(3);
        c.run(3);
        assert_eq!(a.liquid(), b.liquid());
        assert_ne!(a.liquid(), c.liquid());
    }

    #[test]
    fn pushed_samples_land_on_next_tick() {
        let cfg = LatticeConfig {
            bias: crate::bias::BiasConfig {
                diffusion_rate: 0.0,
                ..Default::default()
            },
            ..LatticeConfig::with_size(4)
        };
        let mut s = Session::new(cfg).unwrap();
        s.push_sample(BiasSample::Pulses(vec![Pulse::new([1, 1, 1], 1.0).with_radius(0.0)]));
        assert_eq!(s.bias().average_magnitude(), 0.0);
        s.tick();
        let idx = s.lattice().topology().index(1, 1, 1);
        assert!((s.bias().get(idx) - cfg.bias.strength).abs() < 1e-6);

        assert_eq!(s.inject_pulse([0, 0, 0], 0.1, Some(0.0)), 1);
        assert!(s.inject_pulse([0, 0, 0], 0.1, None) > 1);
    }

    #[test]
    fn plasticity_counts_rewires() {
        let mut cfg = LatticeConfig::with_size(3).with_seed(5);
        cfg.plasticity.rewire_probability = 1.0;
        cfg.plasticity.window = 1;
        let mut s = Session::new(cfg).unwrap();
        let m = s.run(5);
        assert_eq!(m.rewire_count, 5);
    }

    #[test]
    fn forced_random_source_fires_forgiveness() {
        let cfg = LatticeConfig {
            forgiveness: crate::lens::ForgivenessConfig {
                threshold: 0.0,
                ..Default::default()
            },
            ..LatticeConfig::with_size(3)
        };
        let mut s = Session::with_rng(cfg, Box::new(ConstantSource(0.0))).unwrap();
        let m = s.tick();
        assert_eq!(m.forgiven_last_tick, 27);
        assert_eq!(m.path_b_last_tick, 27);
        assert_eq!(m.forgiveness_event_count, 27);
    }

    #[test]
    fn metrics_stencil_can_be_swapped_live() {
        let mut s = session(11);
        s.run(5);
        let liquid = s.liquid().to_vec();
        s.update_config(|cfg| cfg.metrics_neighborhood = Some(Neighborhood::Moore))
            .unwrap();
        assert_eq!(s.liquid(), &liquid[..]);
        s.tick();
        assert_eq!(s.config().metrics_neighborhood, Some(Neighborhood::Moore));
    }
}
