//! The propagation engine: one entry point for every seed operation.
//!
//! Mutations run as units of work: take the seed's lock, run the
//! synchronous store work on the blocking pool, and give up with
//! [`Error::Timeout`] once the work has run for `handler_timeout`. Time
//! spent queued behind the seed's lock does not count. A unit that times
//! out still finishes in the background and keeps the lock until it does,
//! so the next unit for that seed sees its result. Every mutation is safe
//! to retry after a timeout: seeds are content addressed, infections and
//! interactions are deduplicated against their logs.

use crate::cluster::{Cluster, ClusterFormationEngine, ClusterPolicy};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::infection::{GeoDescriber, InfectionEngine, InfectionEvent, InfectionRequest};
use crate::locks::SeedLocks;
use crate::seed::{NewSeed, Seed};
use crate::state::{LevelPhase, PropagationState};
use crate::store::{SeedStore, UserDirectory};
use outbreak_geo::{LevelLadder, LevelNumber, PopulationEstimates};
use outbreak_resonance::{self as resonance, InteractionEvent, Resonance, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default deadline for one unit of work.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ladder: LevelLadder,
    pub populations: PopulationEstimates,
    pub cluster: ClusterPolicy,
    pub handler_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ladder: LevelLadder::default(),
            populations: PopulationEstimates::default(),
            cluster: ClusterPolicy::default(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Builder: set the per-unit deadline.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.populations.covers(&self.ladder) {
            return Err(Error::InvalidInput(
                "population estimates do not cover every ladder level".into(),
            ));
        }
        if self.handler_timeout.is_zero() {
            return Err(Error::InvalidInput("handler_timeout must be positive".into()));
        }
        self.cluster.validate()
    }
}

/// Read model for one level of one seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub level: LevelNumber,
    pub name: String,
    pub radius_km: f64,
    pub phase: LevelPhase,
    pub infected_count: u64,
    pub infection_rate: f64,
    pub population: u64,
    pub unlocked_at: Option<u64>,
    /// Infections still needed here before the next level unlocks
    pub needed_for_next: Option<u64>,
}

/// Facade over seeds, infections, interactions and clusters.
pub struct PropagationEngine {
    store: Arc<dyn SeedStore>,
    infections: Arc<InfectionEngine>,
    clusters: Arc<ClusterFormationEngine>,
    locks: SeedLocks,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl PropagationEngine {
    pub fn new(
        store: Arc<dyn SeedStore>,
        users: Arc<dyn UserDirectory>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let infections = InfectionEngine::new(
            store.clone(),
            config.ladder.clone(),
            config.populations.clone(),
        );
        let clusters = ClusterFormationEngine::new(store.clone(), users, config.cluster.clone());
        Ok(Self {
            store,
            infections: Arc::new(infections),
            clusters: Arc::new(clusters),
            locks: SeedLocks::new(),
            clock: Arc::new(SystemClock),
            config,
        })
    }

    /// Builder: replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builder: enrich infection events with a locality description.
    pub fn with_describer(mut self, describer: Arc<dyn GeoDescriber>) -> Self {
        let infections = InfectionEngine::new(
            self.store.clone(),
            self.config.ladder.clone(),
            self.config.populations.clone(),
        )
        .with_describer(describer);
        self.infections = Arc::new(infections);
        self
    }

    pub fn ladder(&self) -> &LevelLadder {
        &self.config.ladder
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    async fn run_locked<T, F>(&self, seed_id: &str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let deadline = self.config.handler_timeout;
        // waiting behind other units is not part of the deadline
        let guard = self.locks.lock(seed_id).await;
        let unit = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            work()
        });

        match tokio::time::timeout(deadline, unit).await {
            Ok(joined) => joined.map_err(|e| Error::Worker(e.to_string()))?,
            Err(_) => {
                warn!(seed = %seed_id, ?deadline, "seed operation timed out");
                Err(Error::Timeout(deadline))
            }
        }
    }

    /// Store a new seed and initialize its propagation.
    ///
    /// Submitting the same draft at the same millisecond returns the stored seed.
    pub async fn create_seed(&self, draft: NewSeed) -> Result<Seed> {
        let seed = Seed::from_draft(draft, self.now())?;
        let store = self.store.clone();
        let infections = self.infections.clone();
        let seed_id = seed.id.clone();

        self.run_locked(&seed_id, move || {
            if let Some(existing) = store.get_seed(&seed.id)? {
                return Ok(existing);
            }
            store.put_seed(&seed)?;
            infections.load_state(&seed)?;
            info!(seed = %seed.id, kind = ?seed.kind, expires_at = seed.expires_at, "seed created");
            Ok(seed)
        })
        .await
    }

    /// Handle a "seed created" notification for a seed written elsewhere.
    ///
    /// Idempotent: an existing state is returned as is.
    pub async fn on_seed_created(&self, seed_id: &str) -> Result<PropagationState> {
        let store = self.store.clone();
        let infections = self.infections.clone();
        let id = seed_id.to_string();

        self.run_locked(seed_id, move || {
            let seed = store.get_seed(&id)?.ok_or(Error::SeedNotFound(id))?;
            infections.load_state(&seed)
        })
        .await
    }

    /// Route and record one infection.
    pub async fn infect(&self, request: InfectionRequest) -> Result<InfectionEvent> {
        let infections = self.infections.clone();
        let clock = self.clock.clone();
        let seed_id = request.seed_id.clone();

        let result = self
            .run_locked(&seed_id, move || infections.infect(&request, clock.now_millis()))
            .await;
        if let Err(e) = &result {
            if e.is_expected() {
                debug!(seed = %seed_id, error = %e, "infection dropped");
            }
        }
        result
    }

    /// Append an interaction and re-evaluate the seed's cluster.
    ///
    /// An event already in the log is not appended again.
    pub async fn record_interaction(&self, event: InteractionEvent) -> Result<Option<Cluster>> {
        if event.version > SCHEMA_VERSION {
            return Err(Error::InvalidInput(format!(
                "unsupported interaction schema version {}",
                event.version
            )));
        }
        let store = self.store.clone();
        let clusters = self.clusters.clone();
        let clock = self.clock.clone();
        let seed_id = event.seed_id.clone();

        self.run_locked(&seed_id, move || {
            let now = clock.now_millis();
            let seed = store
                .get_seed(&event.seed_id)?
                .ok_or_else(|| Error::SeedNotFound(event.seed_id.clone()))?;
            if seed.is_expired(now) {
                return Err(Error::SeedExpired {
                    seed_id: seed.id,
                    expired_at: seed.expires_at,
                });
            }
            if store.has_interaction(&event)? {
                debug!(seed = %seed.id, key = %event.key(), "interaction already recorded");
            } else {
                store.append_interaction(&event)?;
            }
            clusters.evaluate(&seed.id, now)
        })
        .await
    }

    /// Re-evaluate the cluster for an interaction log written elsewhere.
    pub async fn evaluate_cluster(&self, seed_id: &str) -> Result<Option<Cluster>> {
        let clusters = self.clusters.clone();
        let clock = self.clock.clone();
        let id = seed_id.to_string();

        self.run_locked(seed_id, move || clusters.evaluate(&id, clock.now_millis()))
            .await
    }

    /// Stop a seed from accepting infections until `until` (or indefinitely).
    pub async fn make_dormant(&self, seed_id: &str, until: Option<u64>) -> Result<Seed> {
        let store = self.store.clone();
        let clock = self.clock.clone();
        let id = seed_id.to_string();

        self.run_locked(seed_id, move || {
            let now = clock.now_millis();
            let mut seed = store.get_seed(&id)?.ok_or(Error::SeedNotFound(id))?;
            if seed.is_expired(now) {
                return Err(Error::SeedExpired {
                    seed_id: seed.id,
                    expired_at: seed.expires_at,
                });
            }
            if until.map_or(false, |t| t <= now) {
                return Err(Error::InvalidInput("dormant_until is in the past".into()));
            }
            seed.make_dormant(until);
            store.put_seed(&seed)?;
            info!(seed = %seed.id, ?until, "seed made dormant");
            Ok(seed)
        })
        .await
    }

    pub async fn awaken(&self, seed_id: &str) -> Result<Seed> {
        let store = self.store.clone();
        let id = seed_id.to_string();

        self.run_locked(seed_id, move || {
            let mut seed = store.get_seed(&id)?.ok_or(Error::SeedNotFound(id))?;
            if seed.awaken() {
                store.put_seed(&seed)?;
                info!(seed = %seed.id, "seed awakened");
            }
            Ok(seed)
        })
        .await
    }

    pub fn seed(&self, seed_id: &str) -> Result<Seed> {
        self.store
            .get_seed(seed_id)?
            .ok_or_else(|| Error::SeedNotFound(seed_id.to_string()))
    }

    /// Score the seed's full interaction log.
    pub fn luminosity(&self, seed_id: &str) -> Result<Resonance> {
        self.seed(seed_id)?;
        Ok(resonance::score(&self.store.interactions(seed_id)?))
    }

    /// Current propagation state. A seed whose state was never written
    /// reads as freshly initialized.
    pub fn propagation(&self, seed_id: &str) -> Result<PropagationState> {
        if let Some(state) = self.store.get_propagation(seed_id)? {
            return Ok(state);
        }
        let seed = self.seed(seed_id)?;
        Ok(PropagationState::initialize(
            &seed,
            &self.config.ladder,
            &self.config.populations,
        ))
    }

    pub fn cluster(&self, seed_id: &str) -> Result<Option<Cluster>> {
        self.seed(seed_id)?;
        self.store.get_cluster(seed_id)
    }

    /// Per-level read model for presentation.
    pub fn level_summary(&self, seed_id: &str) -> Result<Vec<LevelSummary>> {
        let state = self.propagation(seed_id)?;
        let ladder = &self.config.ladder;
        let summary = ladder
            .levels()
            .iter()
            .filter_map(|level| {
                let progress = state.progress(level.level)?;
                let phase = state.phase(level.level, ladder)?;
                let needed_for_next = ladder
                    .next(level.level)
                    .filter(|next| !state.is_unlocked(next.level))
                    .and_then(|next| next.unlock)
                    .filter(|_| progress.is_unlocked)
                    .map(|c| c.infections_needed(progress.infected_count, progress.population));
                Some(LevelSummary {
                    level: level.level,
                    name: level.name.clone(),
                    radius_km: level.radius_km,
                    phase,
                    infected_count: progress.infected_count,
                    infection_rate: progress.infection_rate,
                    population: progress.population,
                    unlocked_at: progress.unlocked_at,
                    needed_for_next,
                })
            })
            .collect();
        Ok(summary)
    }

    /// Ids of seeds expired at `now`. Also releases idle lock entries.
    pub fn sweep_expired(&self, now: u64) -> Result<Vec<String>> {
        let expired: Vec<String> = self
            .store
            .list_seeds()?
            .into_iter()
            .filter(|seed| seed.is_expired(now))
            .map(|seed| seed.id)
            .collect();
        let pruned = self.locks.prune();
        debug!(expired = expired.len(), pruned, "expiry sweep");
        Ok(expired)
    }
}
