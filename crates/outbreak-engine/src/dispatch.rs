//! Notification intake.
//!
//! The event source delivers notifications at least once. Each one runs as
//! its own task; the engine's lock table keeps work for one seed serialized
//! while different seeds proceed in parallel. At most `capacity` tasks are
//! in flight; beyond that the dispatcher stops reading and the bounded
//! channel pushes back on senders.

use crate::engine::PropagationEngine;
use crate::error::{Error, Result};
use crate::infection::InfectionRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Something happened in the store that the engine must react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    SeedCreated { seed_id: String },
    InteractionRecorded { seed_id: String },
    InfectionCandidate(InfectionRequest),
}

impl Notification {
    pub fn seed_id(&self) -> &str {
        match self {
            Notification::SeedCreated { seed_id } | Notification::InteractionRecorded { seed_id } => {
                seed_id
            }
            Notification::InfectionCandidate(request) => &request.seed_id,
        }
    }
}

/// Outcome counts of a dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub applied: u64,
    /// Expected outcomes such as a locked level or a duplicate
    pub dropped: u64,
    pub failed: u64,
}

impl DispatchStats {
    fn record(&mut self, outcome: &Result<()>) {
        match outcome {
            Ok(()) => self.applied += 1,
            Err(e) if e.is_expected() => self.dropped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Feeds notifications from a channel into the engine.
pub struct EventDispatcher {
    engine: Arc<PropagationEngine>,
    rx: mpsc::Receiver<Notification>,
    in_flight: Arc<Semaphore>,
}

impl EventDispatcher {
    /// Create a dispatcher and the sender half that feeds it.
    pub fn channel(engine: Arc<PropagationEngine>, capacity: usize) -> (mpsc::Sender<Notification>, Self) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let in_flight = Arc::new(Semaphore::new(capacity));
        (tx, Self { engine, rx, in_flight })
    }

    async fn handle(engine: Arc<PropagationEngine>, notification: Notification) -> Result<()> {
        let seed_id = notification.seed_id().to_string();
        let outcome = match notification {
            Notification::SeedCreated { seed_id } => engine.on_seed_created(&seed_id).await.map(drop),
            Notification::InteractionRecorded { seed_id } => {
                engine.evaluate_cluster(&seed_id).await.map(drop)
            }
            Notification::InfectionCandidate(request) => engine.infect(request).await.map(drop),
        };
        match &outcome {
            Err(e) if e.is_expected() => debug!(seed = %seed_id, error = %e, "notification dropped"),
            Err(e) => warn!(seed = %seed_id, error = %e, "notification failed"),
            Ok(()) => {}
        }
        outcome
    }

    /// Process notifications until every sender is dropped and all
    /// in-flight work has finished.
    pub async fn run(mut self) -> DispatchStats {
        let mut stats = DispatchStats::default();
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        loop {
            tokio::select! {
                next = self.rx.recv() => match next {
                    Some(notification) => {
                        // finished tasks release their permit before they are joined
                        let Ok(permit) = self.in_flight.clone().acquire_owned().await else {
                            break;
                        };
                        let engine = self.engine.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            Self::handle(engine, notification).await
                        });
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    stats.record(&flatten(joined));
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            stats.record(&flatten(joined));
        }
        debug!(?stats, "dispatcher stopped");
        stats
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| Error::Worker(e.to_string()))?
}
