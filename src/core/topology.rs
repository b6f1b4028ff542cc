//! Toroidal neighbor graph for a cubic grid.
//!
//! Flat index layout is `(x * size + y) * size + z`. Every axis wraps, so
//! each cell always has a full neighbor list (for `size == 1` every entry
//! points back at the cell itself).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{check_unit, ConfigError};
use crate::prng::RandomSource;

/// Neighbor stencil.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Neighborhood {
    /// 6 face neighbors, ordered `+x, -x, +y, -y, +z, -z`.
    #[default]
    VonNeumann,
    /// 26 neighbors of the surrounding 3x3x3 cube.
    Moore,
}

impl Neighborhood {
    pub fn degree(self) -> usize {
        match self {
            Neighborhood::VonNeumann => 6,
            Neighborhood::Moore => 26,
        }
    }
}

/// Slow random rewiring of the neighbor graph.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlasticityConfig {
    /// Chance of one rewire on an eligible tick. 0 disables plasticity.
    pub rewire_probability: f32,
    /// Only every `window`-th tick is eligible.
    pub window: u32,
}

impl Default for PlasticityConfig {
    fn default() -> Self {
        Self {
            rewire_probability: 0.0,
            window: 12,
        }
    }
}

impl PlasticityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("plasticity.rewire_probability", self.rewire_probability)?;
        if self.window == 0 {
            return Err(ConfigError::Zero {
                field: "plasticity.window",
            });
        }
        Ok(())
    }
}

/// One applied structural rewire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rewire {
    pub cell: usize,
    pub slot: usize,
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone)]
pub struct Topology {
    size: usize,
    neighborhood: Neighborhood,
    degree: usize,
    /// `edges[i * degree..(i + 1) * degree]` are the neighbors of cell `i`.
    edges: Vec<usize>,
}

impl Topology {
    /// Smallest supported grid side.
    pub const MIN_SIZE: usize = 1;
    /// Largest supported grid side (16M cells).
    pub const MAX_SIZE: usize = 256;

    pub fn new(size: usize, neighborhood: Neighborhood) -> Result<Self, ConfigError> {
        if !(Self::MIN_SIZE..=Self::MAX_SIZE).contains(&size) {
            return Err(ConfigError::GridSize {
                size,
                min: Self::MIN_SIZE,
                max: Self::MAX_SIZE,
            });
        }

        let degree = neighborhood.degree();
        let count = size * size * size;
        let mut topo = Self {
            size,
            neighborhood,
            degree,
            edges: Vec::with_capacity(count * degree),
        };

        for i in 0..count {
            let [x, y, z] = topo.coords(i);
            let (x, y, z) = (x as i64, y as i64, z as i64);
            match neighborhood {
                Neighborhood::VonNeumann => {
                    let offsets = [
                        (1, 0, 0),
                        (-1, 0, 0),
                        (0, 1, 0),
                        (0, -1, 0),
                        (0, 0, 1),
                        (0, 0, -1),
                    ];
                    for (dx, dy, dz) in offsets {
                        let n = topo.index(x + dx, y + dy, z + dz);
                        topo.edges.push(n);
                    }
                }
                Neighborhood::Moore => {
                    for dx in -1..=1 {
                        for dy in -1..=1 {
                            for dz in -1..=1 {
                                // Skip the center cell
                                if dx == 0 && dy == 0 && dz == 0 {
                                    continue;
                                }
                                let n = topo.index(x + dx, y + dy, z + dz);
                                topo.edges.push(n);
                            }
                        }
                    }
                }
            }
        }

        Ok(topo)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.size * self.size * self.size
    }

    #[inline]
    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn neighborhood(&self) -> Neighborhood {
        self.neighborhood
    }

    /// Flat index for any signed coordinate; each axis wraps.
    #[inline]
    pub fn index(&self, x: i64, y: i64, z: i64) -> usize {
        let s = self.size as i64;
        let x = x.rem_euclid(s) as usize;
        let y = y.rem_euclid(s) as usize;
        let z = z.rem_euclid(s) as usize;
        (x * self.size + y) * self.size + z
    }

    #[inline]
    pub fn coords(&self, i: usize) -> [usize; 3] {
        let s = self.size;
        [i / (s * s), (i / s) % s, i % s]
    }

    #[inline]
    pub fn neighbors(&self, i: usize) -> &[usize] {
        let start = i * self.degree;
        &self.edges[start..start + self.degree]
    }

    /// Mean of `values` over the neighbors of `i`.
    #[inline]
    pub fn neighbor_mean(&self, values: &[f32], i: usize) -> f32 {
        let nbrs = self.neighbors(i);
        let sum: f32 = nbrs.iter().map(|&n| values[n]).sum();
        sum / nbrs.len() as f32
    }

    /// Cell centers, centered on the origin, `spacing` apart.
    pub fn positions(&self, spacing: f32) -> Vec<[f32; 3]> {
        let offset = (self.size as f32 - 1.0) * 0.5;
        (0..self.cell_count())
            .map(|i| {
                let [x, y, z] = self.coords(i);
                [
                    (x as f32 - offset) * spacing,
                    (y as f32 - offset) * spacing,
                    (z as f32 - offset) * spacing,
                ]
            })
            .collect()
    }

    /// Structural plasticity: on eligible ticks, with `rewire_probability`,
    /// point one random neighbor slot of one random cell at a new cell.
    ///
    /// The new target is never the cell itself nor the entry it replaces.
    pub fn maybe_rewire(
        &mut self,
        cfg: &PlasticityConfig,
        tick: u64,
        rng: &mut dyn RandomSource,
    ) -> Option<Rewire> {
        if cfg.rewire_probability <= 0.0 || cfg.window == 0 {
            return None;
        }
        if tick % cfg.window as u64 != 0 {
            return None;
        }
        if rng.next_f32() >= cfg.rewire_probability {
            return None;
        }

        let count = self.cell_count();
        // Need a third cell besides `cell` and the current entry.
        if count < 3 {
            return None;
        }

        let cell = rng.next_below(count);
        let slot = rng.next_below(self.degree);
        let from = self.edges[cell * self.degree + slot];

        let (lo, hi) = if cell < from { (cell, from) } else { (from, cell) };
        let mut to = rng.next_below(count - 2);
        if to >= lo {
            to += 1;
        }
        if to >= hi {
            to += 1;
        }

        self.edges[cell * self.degree + slot] = to;
        tracing::debug!(cell, slot, from, to, "rewired neighbor slot");
        Some(Rewire {
            cell,
            slot,
            from,
            to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::{ConstantSource, Prng};

    #[test]
    fn wraps_on_both_boundaries() {
        let topo = Topology::new(3, Neighborhood::VonNeumann).unwrap();
        let origin = topo.index(0, 0, 0);
        let nbrs = topo.neighbors(origin);
        for (x, y, z) in [(2, 0, 0), (1, 0, 0), (0, 2, 0), (0, 1, 0), (0, 0, 2), (0, 0, 1)] {
            let n = topo.index(x, y, z);
            assert!(nbrs.contains(&n), "missing ({x},{y},{z}) in {nbrs:?}");
        }
        assert_eq!(nbrs.len(), 6);
    }

    #[test]
    fn index_wraps_signed_coordinates() {
        let topo = Topology::new(4, Neighborhood::VonNeumann).unwrap();
        assert_eq!(topo.index(-1, 0, 0), topo.index(3, 0, 0));
        assert_eq!(topo.index(4, 5, -6), topo.index(0, 1, 2));
        assert_eq!(topo.coords(topo.index(1, 2, 3)), [1, 2, 3]);
        assert_eq!(topo.index(3, 3, 3), 63);
    }

    #[test]
    fn moore_has_26_distinct_neighbors() {
        let topo = Topology::new(4, Neighborhood::Moore).unwrap();
        for i in 0..topo.cell_count() {
            let mut nbrs = topo.neighbors(i).to_vec();
            assert!(!nbrs.contains(&i));
            nbrs.sort_unstable();
            nbrs.dedup();
            assert_eq!(nbrs.len(), 26);
        }
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            Topology::new(0, Neighborhood::VonNeumann),
            Err(ConfigError::GridSize { size: 0, .. })
        ));
    }

    #[test]
    fn single_cell_grid_points_at_itself() {
        let topo = Topology::new(1, Neighborhood::VonNeumann).unwrap();
        assert_eq!(topo.neighbors(0), &[0; 6]);
        let values = [0.7];
        assert_eq!(topo.neighbor_mean(&values, 0), 0.7);
    }

    #[test]
    fn rewiring_preserves_degree_and_avoids_self_loops() {
        let mut topo = Topology::new(3, Neighborhood::VonNeumann).unwrap();
        let cfg = PlasticityConfig {
            rewire_probability: 1.0,
            window: 1,
        };
        let mut rng = Prng::new(11);
        let mut applied = 0;
        for tick in 0..500 {
            if let Some(r) = topo.maybe_rewire(&cfg, tick, &mut rng) {
                assert_ne!(r.to, r.cell);
                assert_ne!(r.to, r.from);
                assert!(r.to < topo.cell_count());
                applied += 1;
            }
        }
        assert_eq!(applied, 500);
        for i in 0..topo.cell_count() {
            assert_eq!(topo.neighbors(i).len(), 6);
            assert!(!topo.neighbors(i).contains(&i));
        }
    }

    #[test]
    fn rewiring_honours_window_and_probability() {
        let mut topo = Topology::new(3, Neighborhood::VonNeumann).unwrap();
        let cfg = PlasticityConfig {
            rewire_probability: 0.5,
            window: 4,
        };
        // Off-window tick never draws.
        assert!(topo.maybe_rewire(&cfg, 3, &mut ConstantSource(0.0)).is_none());
        // Draw above the probability skips.
        assert!(topo.maybe_rewire(&cfg, 4, &mut ConstantSource(0.9)).is_none());
        assert!(topo.maybe_rewire(&cfg, 4, &mut ConstantSource(0.0)).is_some());
    }

    #[test]
    fn positions_are_centered() {
        let topo = Topology::new(3, Neighborhood::VonNeumann).unwrap();
        let pos = topo.positions(2.0);
        assert_eq!(pos.len(), 27);
        assert_eq!(pos[topo.index(1, 1, 1)], [0.0, 0.0, 0.0]);
        assert_eq!(pos[topo.index(0, 0, 0)], [-2.0, -2.0, -2.0]);
    }
}
