//! Per-seed propagation state machine.
//!
//! # Level Phases
//!
//! ```text
//! Locked ──unlock──▶ Unlocked ──infection──▶ Accumulating ──thresholds──▶ ThresholdMet
//!                                                                          │
//!                          level N+1: Locked ──────unlock─────────────────┘
//! ```
//!
//! A level's counters only ever grow and a level never relocks. Level N+1
//! unlocks only as the direct consequence of an infection at level N pushing
//! N's counters over N+1's [`UnlockCondition`](outbreak_geo::UnlockCondition),
//! so unlocks happen strictly in order and one step at a time.
//!
//! The whole seed is terminal (`Expired`) once `now > expires_at`. Recorded
//! state stays readable but no transition is accepted.

use crate::error::{Error, Result};
use crate::infection::InfectionEvent;
use crate::seed::Seed;
use outbreak_geo::{LevelLadder, LevelNumber, PopulationEstimates};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Counters for one level of one seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: LevelNumber,
    pub infected_count: u64,
    /// `min(infected_count / population, 1.0)`
    pub infection_rate: f64,
    pub is_unlocked: bool,
    /// Unix ms of the infection that unlocked this level
    pub unlocked_at: Option<u64>,
    /// Population estimate the rate was last computed against
    pub population: u64,
}

impl LevelProgress {
    fn locked(level: LevelNumber, population: u64) -> Self {
        Self {
            level,
            infected_count: 0,
            infection_rate: 0.0,
            is_unlocked: false,
            unlocked_at: None,
            population,
        }
    }

    fn recompute_rate(&mut self) {
        let population = self.population.max(1);
        self.infection_rate = (self.infected_count as f64 / population as f64).min(1.0);
    }
}

/// Derived phase of a single level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelPhase {
    Locked,
    Unlocked,
    Accumulating,
    ThresholdMet,
}

/// A broken state invariant. Impossible if every mutation went through
/// [`PropagationState::apply_infection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateViolation {
    /// A level is unlocked while the level below it is locked
    UnlockOutOfOrder { level: LevelNumber },
    /// A locked level has recorded infections
    InfectedWhileLocked { level: LevelNumber },
    /// `total_infected` differs from the per-level sum
    TotalMismatch { total: u64, sum: u64 },
    /// `current_level` is not the highest unlocked level with infections
    CurrentLevelMismatch {
        recorded: LevelNumber,
        derived: LevelNumber,
    },
}

/// Which levels a seed has reached, and how densely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationState {
    pub seed_id: String,
    /// One entry per ladder level, ordered by level
    pub levels: Vec<LevelProgress>,
    /// Highest unlocked level with at least one infection
    pub current_level: LevelNumber,
    pub total_infected: u64,
    /// `total_infected` over the summed population of unlocked levels, capped at 1.0
    pub infection_rate: f64,
    /// Infection log entries folded into this state (the author's implicit
    /// infection is not in the log)
    pub applied_events: u64,
    /// Copied from the seed
    pub expires_at: u64,
    /// Unix ms of the last transition
    pub updated_at: u64,
}

impl PropagationState {
    /// Fresh state for a new seed: level 1 unlocked with the author as its
    /// first infection, every other level locked.
    pub fn initialize(seed: &Seed, ladder: &LevelLadder, populations: &PopulationEstimates) -> Self {
        let levels = ladder
            .levels()
            .iter()
            .map(|l| {
                let population = populations.get(l.level).unwrap_or(1);
                let mut progress = LevelProgress::locked(l.level, population);
                if l.level == 1 {
                    progress.is_unlocked = true;
                    progress.unlocked_at = Some(seed.created_at);
                    progress.infected_count = 1;
                    progress.recompute_rate();
                }
                progress
            })
            .collect();

        let mut state = Self {
            seed_id: seed.id.clone(),
            levels,
            current_level: 1,
            total_infected: 1,
            infection_rate: 0.0,
            applied_events: 0,
            expires_at: seed.expires_at,
            updated_at: seed.created_at,
        };
        state.recompute_aggregates();
        state
    }

    /// Rebuild a state from an infection log.
    pub fn replay(
        seed: &Seed,
        ladder: &LevelLadder,
        populations: &PopulationEstimates,
        events: &[InfectionEvent],
    ) -> Result<Self> {
        let mut state = Self::initialize(seed, ladder, populations);
        state.catch_up(events, ladder, populations)?;
        Ok(state)
    }

    /// Apply log entries this state has not folded in yet.
    ///
    /// Returns how many were applied. Used to recover when the log append
    /// succeeded but the state write did not.
    pub fn catch_up(
        &mut self,
        log: &[InfectionEvent],
        ladder: &LevelLadder,
        populations: &PopulationEstimates,
    ) -> Result<usize> {
        let already = self.applied_events as usize;
        let pending = log.get(already..).unwrap_or_default();
        for event in pending {
            let population = populations
                .get(event.target_level)
                .ok_or_else(|| missing_population(event.target_level))?;
            self.apply_event(event, population, ladder)?;
        }
        Ok(pending.len())
    }

    /// Fold one logged infection into the state.
    pub fn apply_event(
        &mut self,
        event: &InfectionEvent,
        population: u64,
        ladder: &LevelLadder,
    ) -> Result<LevelProgress> {
        let progress = self.apply_infection(event.target_level, population, ladder, event.occurred_at)?;
        self.applied_events += 1;
        Ok(progress)
    }

    /// Record one infection at `level` and unlock the next level if this
    /// level's counters now satisfy its unlock condition.
    ///
    /// Does not deduplicate users.
    pub fn apply_infection(
        &mut self,
        level: LevelNumber,
        population: u64,
        ladder: &LevelLadder,
        now: u64,
    ) -> Result<LevelProgress> {
        if self.is_expired(now) {
            return Err(Error::SeedExpired {
                seed_id: self.seed_id.clone(),
                expired_at: self.expires_at,
            });
        }

        let idx = self.index_of(level)?;
        if !self.levels[idx].is_unlocked {
            return Err(Error::LevelLocked {
                seed_id: self.seed_id.clone(),
                level,
            });
        }

        let progress = &mut self.levels[idx];
        progress.infected_count += 1;
        progress.population = population;
        progress.recompute_rate();
        let (count, rate) = (progress.infected_count, progress.infection_rate);

        self.total_infected += 1;
        self.updated_at = self.updated_at.max(now);

        // Gate is evaluated on this level and applies to the next one only
        if let Some(next) = ladder.next(level) {
            let condition_met = next.unlock.map_or(false, |c| c.is_met(count, rate));
            if let Some(next_progress) = self.levels.get_mut(idx + 1) {
                if condition_met && !next_progress.is_unlocked {
                    next_progress.is_unlocked = true;
                    next_progress.unlocked_at = Some(now);
                    info!(
                        seed = %self.seed_id,
                        level = next.level,
                        name = %next.name,
                        infected = count,
                        rate,
                        "level unlocked"
                    );
                }
            }
        }

        self.recompute_aggregates();
        Ok(self.levels[idx].clone())
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    pub fn is_unlocked(&self, level: LevelNumber) -> bool {
        self.progress(level).map_or(false, |p| p.is_unlocked)
    }

    pub fn progress(&self, level: LevelNumber) -> Option<&LevelProgress> {
        self.index_of(level).ok().map(|i| &self.levels[i])
    }

    /// Highest unlocked level, infected or not.
    pub fn frontier(&self) -> LevelNumber {
        self.levels
            .iter()
            .filter(|p| p.is_unlocked)
            .map(|p| p.level)
            .max()
            .unwrap_or(1)
    }

    /// Derived phase of `level`.
    pub fn phase(&self, level: LevelNumber, ladder: &LevelLadder) -> Option<LevelPhase> {
        let progress = self.progress(level)?;
        let phase = if !progress.is_unlocked {
            LevelPhase::Locked
        } else if progress.infected_count == 0 {
            LevelPhase::Unlocked
        } else {
            let next_met = ladder.next(level).map_or(false, |next| {
                self.is_unlocked(next.level)
                    || next
                        .unlock
                        .map_or(false, |c| c.is_met(progress.infected_count, progress.infection_rate))
            });
            if next_met {
                LevelPhase::ThresholdMet
            } else {
                LevelPhase::Accumulating
            }
        };
        Some(phase)
    }

    /// Check structural invariants.
    pub fn verify(&self) -> std::result::Result<(), StateViolation> {
        let mut prev_unlocked = true;
        let mut sum = 0;
        for p in &self.levels {
            if p.is_unlocked && !prev_unlocked {
                return Err(StateViolation::UnlockOutOfOrder { level: p.level });
            }
            if !p.is_unlocked && p.infected_count > 0 {
                return Err(StateViolation::InfectedWhileLocked { level: p.level });
            }
            prev_unlocked = p.is_unlocked;
            sum += p.infected_count;
        }

        if sum != self.total_infected {
            return Err(StateViolation::TotalMismatch {
                total: self.total_infected,
                sum,
            });
        }

        let derived = self.derive_current_level();
        if derived != self.current_level {
            return Err(StateViolation::CurrentLevelMismatch {
                recorded: self.current_level,
                derived,
            });
        }
        Ok(())
    }

    /// Whether `self` can follow `earlier` in a valid history: no counter
    /// shrank and no level relocked.
    pub fn is_successor_of(&self, earlier: &Self) -> bool {
        self.levels.len() == earlier.levels.len()
            && self.total_infected >= earlier.total_infected
            && self.levels.iter().zip(&earlier.levels).all(|(now, then)| {
                now.infected_count >= then.infected_count && (now.is_unlocked || !then.is_unlocked)
            })
    }

    fn index_of(&self, level: LevelNumber) -> Result<usize> {
        self.levels
            .iter()
            .position(|p| p.level == level)
            .ok_or_else(|| Error::InvalidInput(format!("level {} is not on the ladder", level)))
    }

    fn derive_current_level(&self) -> LevelNumber {
        self.levels
            .iter()
            .filter(|p| p.is_unlocked && p.infected_count > 0)
            .map(|p| p.level)
            .max()
            .unwrap_or(1)
    }

    fn recompute_aggregates(&mut self) {
        self.current_level = self.derive_current_level();
        let reachable: u64 = self
            .levels
            .iter()
            .filter(|p| p.is_unlocked)
            .map(|p| p.population)
            .sum();
        self.infection_rate = (self.total_infected as f64 / reachable.max(1) as f64).min(1.0);
    }
}

pub(crate) fn missing_population(level: LevelNumber) -> Error {
    Error::InvalidInput(format!("no population estimate for level {}", level))
}
