#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bias::BiasField;
use crate::error::ConfigError;
use crate::lattice::Lattice;
use crate::topology::{Neighborhood, Topology};

/// Field reduced into `energy` / `dispersion` / `coherence`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MetricField {
    #[default]
    Liquid,
    Plasma,
}

/// Per-tick scalar summary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Metrics {
    pub tick: u64,
    /// Mean of the metric field.
    pub energy: f32,
    /// Population variance of the metric field.
    pub dispersion: f32,
    /// `mean(1 - |v - neighbor_mean|)`, in `[0, 1]`.
    pub coherence: f32,
    /// Mean bias magnitude.
    pub bias_energy: f32,
    /// Cumulative forgiveness firings (per cell).
    pub forgiveness_event_count: u64,
    pub solid_mean: f32,
    pub forgiven_last_tick: usize,
    pub path_b_last_tick: usize,
    pub rewire_count: u64,
}

/// Mean, population variance and neighbor agreement of one field.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldStats {
    pub mean: f32,
    pub variance: f32,
    pub coherence: f32,
}

impl FieldStats {
    pub fn reduce(values: &[f32], topology: &Topology) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let agreement = (0..values.len())
            .map(|i| 1.0 - (values[i] - topology.neighbor_mean(values, i)).abs() as f64)
            .sum::<f64>()
            / n;

        Self {
            mean: mean as f32,
            variance: variance as f32,
            coherence: (agreement as f32).clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsCollector {
    field: MetricField,
    /// Dedicated stencil for coherence; the lattice topology otherwise.
    topology: Option<Topology>,
}

impl MetricsCollector {
    pub fn new(
        field: MetricField,
        neighborhood: Option<Neighborhood>,
        size: usize,
    ) -> Result<Self, ConfigError> {
        let topology = neighborhood
            .map(|n| Topology::new(size, n))
            .transpose()?;
        Ok(Self { field, topology })
    }

    pub fn field(&self) -> MetricField {
        self.field
    }

    pub fn set_field(&mut self, field: MetricField) {
        self.field = field;
    }

    /// Reduce the lattice. Tick counters are left for the caller to fill.
    pub fn sample(&self, lattice: &Lattice, bias: &BiasField) -> Metrics {
        let values = match self.field {
            MetricField::Liquid => lattice.liquid(),
            MetricField::Plasma => lattice.plasma(),
        };
        let topology = self.topology.as_ref().unwrap_or_else(|| lattice.topology());
        let stats = FieldStats::reduce(values, topology);

        let solid = lattice.solid();
        let solid_mean = if solid.is_empty() {
            0.0
        } else {
            solid.iter().sum::<f32>() / solid.len() as f32
        };

        Metrics {
            energy: stats.mean,
            dispersion: stats.variance,
            coherence: stats.coherence,
            bias_energy: bias.average_magnitude(),
            forgiveness_event_count: lattice.forgiveness_events(),
            solid_mean,
            ..Default::default()
        }
    }
}
