//! Bias producers.
//!
//! A source yields at most one [`BiasSample`] per tick. Anything that can
//! produce per-cell energy or pulses (audio analysis, a UI, a schedule) plugs
//! in through [`BiasSource`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bias::{BiasSample, Pulse};
use crate::prng::RandomSource;
use crate::topology::Topology;

pub trait BiasSource {
    fn next_sample(
        &mut self,
        tick: u64,
        topology: &Topology,
        rng: &mut dyn RandomSource,
    ) -> Option<BiasSample>;
}

impl<F> BiasSource for F
where
    F: FnMut(u64, &Topology, &mut dyn RandomSource) -> Option<BiasSample>,
{
    fn next_sample(
        &mut self,
        tick: u64,
        topology: &Topology,
        rng: &mut dyn RandomSource,
    ) -> Option<BiasSample> {
        self(tick, topology, rng)
    }
}

/// Dense standing wave: `phase * sin(i * spatial + 2 * phase)` with
/// `phase = sin(tick * rate)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProceduralWave {
    pub rate: f32,
    pub spatial: f32,
    pub amplitude: f32,
}

impl Default for ProceduralWave {
    fn default() -> Self {
        Self {
            rate: 0.05,
            spatial: 0.15,
            amplitude: 1.0,
        }
    }
}

impl BiasSource for ProceduralWave {
    fn next_sample(
        &mut self,
        tick: u64,
        topology: &Topology,
        _rng: &mut dyn RandomSource,
    ) -> Option<BiasSample> {
        let phase = (tick as f32 * self.rate).sin();
        let values = (0..topology.cell_count())
            .map(|i| self.amplitude * phase * (i as f32 * self.spatial + 2.0 * phase).sin())
            .collect();
        Some(BiasSample::Dense(values))
    }
}

/// Fixed pulse table, optionally repeating every `period` ticks.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScheduledPulses {
    entries: Vec<(u64, Pulse)>,
    period: Option<u64>,
}

impl ScheduledPulses {
    pub fn new(mut entries: Vec<(u64, Pulse)>) -> Self {
        entries.sort_by_key(|(t, _)| *t);
        Self {
            entries,
            period: None,
        }
    }

    /// Repeat the table every `period` ticks. A period of 0 disables repeat.
    pub fn repeating(mut self, period: u64) -> Self {
        self.period = (period > 0).then_some(period);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BiasSource for ScheduledPulses {
    fn next_sample(
        &mut self,
        tick: u64,
        _topology: &Topology,
        _rng: &mut dyn RandomSource,
    ) -> Option<BiasSample> {
        let t = match self.period {
            Some(p) => tick % p,
            None => tick,
        };
        let pulses: Vec<Pulse> = self
            .entries
            .iter()
            .filter(|(at, _)| *at == t)
            .map(|(_, p)| *p)
            .collect();
        (!pulses.is_empty()).then_some(BiasSample::Pulses(pulses))
    }
}

/// One pulse at a random cell every `every` ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RandomPulses {
    pub every: u64,
    pub radius: [f32; 2],
    pub amplitude: [f32; 2],
}

impl Default for RandomPulses {
    fn default() -> Self {
        Self {
            every: 24,
            radius: [1.5, 3.5],
            amplitude: [-1.0, 1.0],
        }
    }
}

impl BiasSource for RandomPulses {
    fn next_sample(
        &mut self,
        tick: u64,
        topology: &Topology,
        rng: &mut dyn RandomSource,
    ) -> Option<BiasSample> {
        if self.every == 0 || tick % self.every != 0 {
            return None;
        }
        let [x, y, z] = topology.coords(rng.next_below(topology.cell_count()));
        let radius = rng.next_range(self.radius[0], self.radius[1]);
        let amplitude = rng.next_range(self.amplitude[0], self.amplitude[1]);
        let pulse = Pulse::new([x as i64, y as i64, z as i64], amplitude).with_radius(radius);
        Some(BiasSample::Pulses(vec![pulse]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::{ConstantSource, Prng};
    use crate::topology::Neighborhood;

    #[test]
    fn wave_is_silent_at_tick_zero() {
        let topo = Topology::new(3, Neighborhood::VonNeumann).unwrap();
        let mut wave = ProceduralWave::default();
        let Some(BiasSample::Dense(values)) = wave.next_sample(0, &topo, &mut ConstantSource(0.0))
        else {
            panic!("wave should produce a dense sample");
        };
        assert_eq!(values.len(), 27);
        assert!(values.iter().all(|v| *v == 0.0));

        let Some(BiasSample::Dense(values)) = wave.next_sample(10, &topo, &mut ConstantSource(0.0))
        else {
            panic!("wave should produce a dense sample");
        };
        assert!(values.iter().any(|v| *v != 0.0));
        assert!(values.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn schedule_fires_on_listed_ticks_and_repeats() {
        let topo = Topology::new(4, Neighborhood::VonNeumann).unwrap();
        let mut rng = ConstantSource(0.0);
        let mut sched = ScheduledPulses::new(vec![
            (3, Pulse::new([1, 1, 1], 0.5)),
            (1, Pulse::new([0, 0, 0], 1.0)),
            (3, Pulse::new([2, 2, 2], -0.5)),
        ])
        .repeating(5);

        assert_eq!(sched.next_sample(0, &topo, &mut rng), None);
        assert!(matches!(
            sched.next_sample(1, &topo, &mut rng),
            Some(BiasSample::Pulses(p)) if p.len() == 1
        ));
        assert!(matches!(
            sched.next_sample(8, &topo, &mut rng),
            Some(BiasSample::Pulses(p)) if p.len() == 2
        ));

        let mut once = ScheduledPulses::new(vec![(1, Pulse::new([0, 0, 0], 1.0))]);
        assert!(once.next_sample(1, &topo, &mut rng).is_some());
        assert!(once.next_sample(6, &topo, &mut rng).is_none());
    }

    #[test]
    fn random_pulses_respect_cadence_and_ranges() {
        let topo = Topology::new(5, Neighborhood::VonNeumann).unwrap();
        let mut src = RandomPulses {
            every: 4,
            ..Default::default()
        };
        let mut rng = Prng::new(8);
        let mut fired = 0;
        for tick in 0..40 {
            match src.next_sample(tick, &topo, &mut rng) {
                Some(BiasSample::Pulses(p)) => {
                    assert_eq!(tick % 4, 0);
                    let pulse = p[0];
                    assert!(pulse.center.iter().all(|c| (0..5).contains(c)));
                    let r = pulse.radius.unwrap();
                    assert!((1.5..3.5).contains(&r));
                    assert!((-1.0..1.0).contains(&pulse.amplitude));
                    fired += 1;
                }
                Some(other) => panic!("unexpected sample {other:?}"),
                None => assert_ne!(tick % 4, 0),
            }
        }
        assert_eq!(fired, 10);
    }

    #[test]
    fn closures_are_sources() {
        let topo = Topology::new(2, Neighborhood::VonNeumann).unwrap();
        let mut src = |tick: u64, _: &Topology, _: &mut dyn RandomSource| {
            (tick == 2).then(|| BiasSample::Dense(vec![1.0; 8]))
        };
        assert!(src.next_sample(1, &topo, &mut ConstantSource(0.0)).is_none());
        assert!(src.next_sample(2, &topo, &mut ConstantSource(0.0)).is_some());
    }
}
