//! # phase_lattice
//!
//! A toroidal 3D cellular state machine with three coupled per-cell fields
//! (`plasma`, `liquid`, `solid`), a binary parity flag, an exogenous bias field
//! and a lens weighting stage that steers each tick.
//!
//! ## Quick Start
//!
//! ```
//! use phase_lattice::prelude::*;
//!
//! let cfg = LatticeConfig::with_size(8)
//!     .with_seed(42)
//!     .with_profile(LensProfile::Curious);
//! let mut session = Session::new(cfg).unwrap();
//!
//! session.inject_pulse([4, 4, 4], 0.8, None);
//! let metrics = session.run(10);
//! assert_eq!(metrics.tick, 10);
//! assert!(session.liquid().iter().all(|v| (0.0..=1.0).contains(v)));
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Enable serialization/deserialization
//! - `parallel`: Enable multi-threaded step phase via rayon
//!
//! ## Modules
//!
//! - [`topology`]: Toroidal neighbor graph and structural plasticity
//! - [`bias`]: Exogenous bias field
//! - [`sources`]: Bias producers
//! - [`lens`]: Lens weighting and forgiveness policy
//! - [`lattice`]: Stepping engine
//! - [`metrics`]: Scalar reductions
//! - [`session`]: Tick orchestration and live config
//! - [`observer`]: Read-only observation adapters

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/topology.rs"]
pub mod topology;

#[path = "core/bias.rs"]
pub mod bias;

#[path = "core/sources.rs"]
pub mod sources;

#[path = "core/lens.rs"]
pub mod lens;

#[path = "core/metrics.rs"]
pub mod metrics;

#[path = "core/lattice.rs"]
pub mod lattice;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/session.rs"]
pub mod session;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use phase_lattice::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bias::{
        BiasBound, BiasConfig, BiasField, BiasSample, DistanceMetric, Falloff, Pulse,
    };
    pub use crate::config::{ConfigOverrides, LatticeConfig};
    pub use crate::error::ConfigError;
    pub use crate::lattice::{BlendRule, ExecutionTier, Lattice, PlasmaMutation, StepReport};
    pub use crate::lens::{
        ForgivenessConfig, ForgivenessTrigger, LensConfig, LensParams, LensProfile, LensWeights,
    };
    pub use crate::metrics::{MetricField, Metrics, MetricsCollector};
    pub use crate::observer::{LatticeSnapshot, SessionAdapter};
    pub use crate::prng::{Prng, RandomSource};
    pub use crate::session::Session;
    pub use crate::sources::{BiasSource, ProceduralWave, RandomPulses, ScheduledPulses};
    pub use crate::topology::{Neighborhood, PlasticityConfig, Topology};
}
