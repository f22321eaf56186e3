//! Estimated reachable population per level.
//!
//! These estimates are the denominators of every infection rate, so they
//! directly decide when a level unlocks. They are configuration, not live data.

use crate::ladder::LevelLadder;
use crate::level::LevelNumber;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PopulationEstimates {
    by_level: BTreeMap<LevelNumber, u64>,
}

impl Default for PopulationEstimates {
    fn default() -> Self {
        Self::from_pairs([(1, 200), (2, 1_000), (3, 5_000), (4, 50_000)])
    }
}

impl PopulationEstimates {
    /// Build from `(level, population)` pairs. Zero populations are ignored.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (LevelNumber, u64)>) -> Self {
        Self {
            by_level: pairs.into_iter().filter(|(_, p)| *p > 0).collect(),
        }
    }

    /// Population at `level`, if configured.
    pub fn get(&self, level: LevelNumber) -> Option<u64> {
        self.by_level.get(&level).copied()
    }

    /// Builder: override a single level.
    pub fn with_level(mut self, level: LevelNumber, population: u64) -> Self {
        if population > 0 {
            self.by_level.insert(level, population);
        } else {
            self.by_level.remove(&level);
        }
        self
    }

    /// Whether every level of `ladder` has an estimate.
    pub fn covers(&self, ladder: &LevelLadder) -> bool {
        ladder.levels().iter().all(|l| self.get(l.level).is_some())
    }
}
