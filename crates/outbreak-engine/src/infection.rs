//! Infection routing: from "user X saw seed S at location L" to a recorded event.
//!
//! # Pipeline
//!
//! ```text
//! load seed ─▶ expired? dormant? ─▶ resolve level ─▶ unlocked? ─▶ already infected?
//!                                                                    │
//!            persist state ◀── apply to state ◀── append to log ◀───┘
//! ```
//!
//! The log is appended before the state is written. If the state write fails
//! the next call folds the orphaned log entries back in (see
//! [`PropagationState::catch_up`]), so a retried request can never count twice.
//!
//! [`InfectionEngine::infect`] must run under the seed's lock.

use crate::error::{Error, Result};
use crate::seed::Seed;
use crate::state::{missing_population, PropagationState};
use crate::store::SeedStore;
use outbreak_geo::{GeoPoint, LevelLadder, LevelNumber, PopulationEstimates};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Human-readable place description attached to an infection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Locality {
    pub address: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
}

/// Optional reverse-geocoding collaborator. Routing never depends on it.
pub trait GeoDescriber: Send + Sync {
    fn describe(&self, point: &GeoPoint) -> Option<Locality>;
}

/// A request to infect one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfectionRequest {
    pub seed_id: String,
    pub user_id: String,
    pub user_location: GeoPoint,
    /// Who passed the seed on, if known
    #[serde(default)]
    pub source_user_id: Option<String>,
}

impl InfectionRequest {
    pub fn new(seed_id: impl Into<String>, user_id: impl Into<String>, user_location: GeoPoint) -> Self {
        Self {
            seed_id: seed_id.into(),
            user_id: user_id.into(),
            user_location,
            source_user_id: None,
        }
    }

    /// Builder: set the propagating user.
    pub fn from_user(mut self, source_user_id: impl Into<String>) -> Self {
        self.source_user_id = Some(source_user_id.into());
        self
    }
}

/// A recorded infection. Immutable, append-only per seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfectionEvent {
    pub seed_id: String,
    pub user_id: String,
    pub user_location: GeoPoint,
    pub target_level: LevelNumber,
    /// Unix ms
    pub occurred_at: u64,
    pub propagation_delay_minutes: u32,
    #[serde(default)]
    pub source_user_id: Option<String>,
    #[serde(default)]
    pub locality: Option<Locality>,
}

/// Routes infection requests into per-seed propagation state.
pub struct InfectionEngine {
    store: Arc<dyn SeedStore>,
    ladder: LevelLadder,
    populations: PopulationEstimates,
    describer: Option<Arc<dyn GeoDescriber>>,
}

impl InfectionEngine {
    pub fn new(store: Arc<dyn SeedStore>, ladder: LevelLadder, populations: PopulationEstimates) -> Self {
        Self {
            store,
            ladder,
            populations,
            describer: None,
        }
    }

    /// Builder: attach a reverse geocoder for event enrichment.
    pub fn with_describer(mut self, describer: Arc<dyn GeoDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    pub fn ladder(&self) -> &LevelLadder {
        &self.ladder
    }

    pub fn populations(&self) -> &PopulationEstimates {
        &self.populations
    }

    /// Load a seed's state, creating it if missing and folding in any
    /// logged events it has not seen.
    pub fn load_state(&self, seed: &Seed) -> Result<PropagationState> {
        let mut state = match self.store.get_propagation(&seed.id)? {
            Some(state) => state,
            None => {
                let state = PropagationState::initialize(seed, &self.ladder, &self.populations);
                self.store.put_propagation(&state)?;
                state
            }
        };

        let log = self.store.infections(&seed.id)?;
        if log.len() as u64 > state.applied_events {
            let recovered = state.catch_up(&log, &self.ladder, &self.populations)?;
            warn!(seed = %seed.id, recovered, "state lagged infection log, caught up");
            self.store.put_propagation(&state)?;
        }
        Ok(state)
    }

    /// Validate, record and apply one infection.
    pub fn infect(&self, request: &InfectionRequest, now: u64) -> Result<InfectionEvent> {
        let mut seed = self
            .store
            .get_seed(&request.seed_id)?
            .ok_or_else(|| Error::SeedNotFound(request.seed_id.clone()))?;

        if seed.is_expired(now) {
            return Err(Error::SeedExpired {
                seed_id: seed.id,
                expired_at: seed.expires_at,
            });
        }
        if seed.is_dormant_at(now) {
            return Err(Error::SeedDormant {
                seed_id: seed.id,
                until: seed.dormant_until,
            });
        }
        if seed.is_dormant {
            // dormant_until has elapsed
            seed.awaken();
            self.store.put_seed(&seed)?;
            info!(seed = %seed.id, "dormancy elapsed, seed awakened");
        }

        let mut state = self.load_state(&seed)?;

        let level = self
            .ladder
            .resolve(&seed.origin, &request.user_location)
            .ok_or_else(|| Error::UnroutableLocation {
                seed_id: seed.id.clone(),
                location: request.user_location,
            })?;

        if !state.is_unlocked(level.level) {
            return Err(Error::LevelLocked {
                seed_id: seed.id.clone(),
                level: level.level,
            });
        }

        if request.user_id == seed.author_id || self.store.has_infection(&seed.id, &request.user_id)? {
            return Err(Error::DuplicateInfection {
                seed_id: seed.id.clone(),
                user_id: request.user_id.clone(),
            });
        }

        let population = self
            .populations
            .get(level.level)
            .ok_or_else(|| missing_population(level.level))?;

        let event = InfectionEvent {
            seed_id: seed.id.clone(),
            user_id: request.user_id.clone(),
            user_location: request.user_location,
            target_level: level.level,
            occurred_at: now,
            propagation_delay_minutes: level.delay.deterministic(),
            source_user_id: request.source_user_id.clone(),
            locality: self
                .describer
                .as_ref()
                .and_then(|d| d.describe(&request.user_location)),
        };

        self.store.append_infection(&event)?;
        let progress = state.apply_event(&event, population, &self.ladder)?;
        self.store.put_propagation(&state)?;

        debug!(
            seed = %seed.id,
            user = %event.user_id,
            level = event.target_level,
            infected = progress.infected_count,
            rate = progress.infection_rate,
            "infection recorded"
        );

        Ok(event)
    }
}
