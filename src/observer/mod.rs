#[cfg(feature = "serde")]
use serde::Serialize;

use crate::lattice::StepReport;
use crate::lens::LensParams;
use crate::metrics::Metrics;
use crate::session::Session;

/// A read-only snapshot of a session between ticks.
///
/// Design intent:
/// - Observers cannot mutate or steer the session.
/// - Snapshotting is *on-demand* and allocates; the tick loop stays unchanged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct LatticeSnapshot {
    pub tick: u64,
    pub grid_size: usize,
    pub metrics: Metrics,
    pub params: Option<LensParams>,
    pub report: StepReport,

    pub plasma: Vec<f32>,
    pub liquid: Vec<f32>,
    pub solid: Vec<f32>,
    pub parity: Vec<u8>,
    pub bias: Vec<f32>,
}

/// Metrics-only view for loggers and overlays.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MetricsSnapshot {
    pub metrics: Metrics,
    pub path_probability: Option<f32>,
    pub damping: Option<f32>,
    pub bias_coupling: Option<f32>,
}

pub struct SessionAdapter<'a> {
    session: &'a Session,
}

impl<'a> SessionAdapter<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub fn snapshot(&self) -> LatticeSnapshot {
        let s = self.session;
        LatticeSnapshot {
            tick: s.tick_count(),
            grid_size: s.config().grid_size,
            metrics: s.metrics(),
            params: s.last_params(),
            report: s.last_report(),

            plasma: s.plasma().to_vec(),
            liquid: s.liquid().to_vec(),
            solid: s.solid().to_vec(),
            parity: s.parity().to_vec(),
            bias: s.bias().values().to_vec(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let params = self.session.last_params();
        MetricsSnapshot {
            metrics: self.session.metrics(),
            path_probability: params.map(|p| p.path_probability),
            damping: params.map(|p| p.damping),
            bias_coupling: params.map(|p| p.bias_coupling),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LatticeConfig;

    #[test]
    fn snapshot_is_detached_from_session() {
        let mut session = Session::new(LatticeConfig::with_size(3).with_seed(2)).unwrap();
        let before = SessionAdapter::new(&session).snapshot();
        assert_eq!(before.tick, 0);
        assert!(before.params.is_none());
        assert_eq!(before.liquid.len(), 27);

        session.run(4);
        let after = SessionAdapter::new(&session).snapshot();
        assert_eq!(after.tick, 4);
        assert!(after.params.is_some());
        assert_ne!(after.liquid, before.liquid);
        assert_eq!(after.metrics, session.metrics());
    }

    #[test]
    fn metrics_view_carries_lens_outputs() {
        let mut session = Session::new(LatticeConfig::with_size(2)).unwrap();
        assert!(SessionAdapter::new(&session).metrics().damping.is_none());
        session.tick();
        let view = SessionAdapter::new(&session).metrics();
        assert_eq!(view.path_probability, session.last_params().map(|p| p.path_probability));
        assert_eq!(view.metrics.tick, 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_serializes_to_json() {
        let mut session = Session::new(LatticeConfig::with_size(2)).unwrap();
        session.tick();
        let json = serde_json::to_value(SessionAdapter::new(&session).snapshot()).unwrap();
        assert_eq!(json["tick"], 1);
        assert_eq!(json["liquid"].as_array().map(|a| a.len()), Some(8));
    }
}
