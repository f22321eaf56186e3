//! Cluster formation from per-seed interaction density.
//!
//! A cluster forms once a seed has seen enough interactions from enough
//! distinct users. At most one live cluster exists per seed: evaluating
//! again before it expires folds newly seen users into the existing
//! membership and refreshes the derived metrics. Membership never shrinks.

use crate::clock::{DAY_MS, HOUR_MS};
use crate::error::{Error, Result};
use crate::seed::Seed;
use crate::store::{SeedStore, UserDirectory};
use outbreak_geo::GeoPoint;
use outbreak_resonance::InteractionEvent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Topic spread of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpectralDiversity {
    pub topics: BTreeSet<String>,
    pub count: usize,
}

impl SpectralDiversity {
    pub fn from_topics(topics: BTreeSet<String>) -> Self {
        let count = topics.len();
        Self { topics, count }
    }
}

/// A time-boxed group of users who interacted heavily with one seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub seed_id: String,
    pub member_user_ids: BTreeSet<String>,
    /// First distinct contributors, by first interaction time
    pub core_user_ids: Vec<String>,
    /// [0, 100]
    pub resonance_score: f64,
    pub geographic_center: GeoPoint,
    /// [0, 100]
    pub activity_level: f64,
    pub spectral_diversity: SpectralDiversity,
    #[serde(default)]
    pub cluster_vector: Vec<f32>,
    pub created_at: u64,
    pub expiration_time: u64,
}

impl Cluster {
    pub fn is_live(&self, now: u64) -> bool {
        now <= self.expiration_time
    }
}

/// Formation thresholds and time windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPolicy {
    pub min_interactions: usize,
    pub min_members: usize,
    pub core_size: usize,
    pub lifetime_ms: u64,
    pub activity_window_ms: u64,
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self {
            min_interactions: 10,
            min_members: 3,
            core_size: 2,
            lifetime_ms: 7 * DAY_MS,
            activity_window_ms: 24 * HOUR_MS,
        }
    }
}

impl ClusterPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.min_members == 0 {
            return Err(Error::InvalidInput("cluster min_members must be positive".into()));
        }
        if self.lifetime_ms == 0 {
            return Err(Error::InvalidInput("cluster lifetime must be positive".into()));
        }
        Ok(())
    }
}

/// Per-user view of a seed's interaction log.
struct Participant {
    first_seen: u64,
    last_seen: u64,
    interactions: usize,
}

fn participants(events: &[InteractionEvent]) -> HashMap<&str, Participant> {
    let mut by_user: HashMap<&str, Participant> = HashMap::new();
    for event in events {
        by_user
            .entry(event.user_id.as_str())
            .and_modify(|p| {
                p.first_seen = p.first_seen.min(event.occurred_at);
                p.last_seen = p.last_seen.max(event.occurred_at);
                p.interactions += 1;
            })
            .or_insert(Participant {
                first_seen: event.occurred_at,
                last_seen: event.occurred_at,
                interactions: 1,
            });
    }
    by_user
}

/// Component-wise mean of the vectors that share the first vector's
/// dimension. Empty when there is nothing to average.
pub fn centroid(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(dim) = vectors.iter().map(Vec::len).find(|len| *len > 0) else {
        return Vec::new();
    };
    let mut sum = vec![0.0f64; dim];
    let mut n = 0usize;
    for v in vectors.iter().filter(|v| v.len() == dim) {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += f64::from(*x);
        }
        n += 1;
    }
    sum.into_iter().map(|s| (s / n as f64) as f32).collect()
}

/// Decides when a seed's audience becomes a cluster.
pub struct ClusterFormationEngine {
    store: Arc<dyn SeedStore>,
    users: Arc<dyn UserDirectory>,
    policy: ClusterPolicy,
}

impl ClusterFormationEngine {
    pub fn new(store: Arc<dyn SeedStore>, users: Arc<dyn UserDirectory>, policy: ClusterPolicy) -> Self {
        Self { store, users, policy }
    }

    pub fn policy(&self) -> &ClusterPolicy {
        &self.policy
    }

    /// Form, refresh or decline a cluster for `seed_id`.
    ///
    /// Returns `None` while the interaction log is below the thresholds.
    /// Safe to call redundantly. Must run under the seed's lock.
    pub fn evaluate(&self, seed_id: &str, now: u64) -> Result<Option<Cluster>> {
        let seed = self
            .store
            .get_seed(seed_id)?
            .ok_or_else(|| Error::SeedNotFound(seed_id.to_string()))?;
        let events = self.store.interactions(seed_id)?;

        if events.len() < self.policy.min_interactions {
            debug!(seed = %seed_id, interactions = events.len(), "too few interactions for a cluster");
            return Ok(None);
        }
        let by_user = participants(&events);
        if by_user.len() < self.policy.min_members {
            debug!(seed = %seed_id, members = by_user.len(), "too few distinct users for a cluster");
            return Ok(None);
        }

        let existing = self.store.get_cluster(seed_id)?.filter(|c| c.is_live(now));
        let cluster = match existing {
            Some(mut cluster) => {
                let before = cluster.member_user_ids.len();
                cluster
                    .member_user_ids
                    .extend(by_user.keys().map(|u| u.to_string()));
                self.refresh_metrics(&mut cluster, &events, &by_user, now)?;
                if cluster.member_user_ids.len() > before {
                    debug!(
                        seed = %seed_id,
                        added = cluster.member_user_ids.len() - before,
                        "cluster membership grew"
                    );
                }
                cluster
            }
            None => {
                let cluster = self.materialize(&seed, &events, &by_user, now)?;
                info!(
                    seed = %seed_id,
                    cluster = %cluster.id,
                    members = cluster.member_user_ids.len(),
                    "cluster formed"
                );
                cluster
            }
        };

        self.store.put_cluster(&cluster)?;
        Ok(Some(cluster))
    }

    fn materialize(
        &self,
        seed: &Seed,
        events: &[InteractionEvent],
        by_user: &HashMap<&str, Participant>,
        now: u64,
    ) -> Result<Cluster> {
        let mut by_first_seen: Vec<(&str, u64)> =
            by_user.iter().map(|(u, p)| (*u, p.first_seen)).collect();
        by_first_seen.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        let core_user_ids = by_first_seen
            .iter()
            .take(self.policy.core_size)
            .map(|(u, _)| u.to_string())
            .collect();

        let mut cluster = Cluster {
            id: cluster_id(&seed.id, now),
            seed_id: seed.id.clone(),
            member_user_ids: by_user.keys().map(|u| u.to_string()).collect(),
            core_user_ids,
            resonance_score: 0.0,
            geographic_center: seed.origin,
            activity_level: 0.0,
            spectral_diversity: SpectralDiversity::from_topics(seed.tags.clone()),
            cluster_vector: Vec::new(),
            created_at: now,
            expiration_time: now.saturating_add(self.policy.lifetime_ms),
        };
        self.refresh_metrics(&mut cluster, events, by_user, now)?;
        Ok(cluster)
    }

    fn refresh_metrics(
        &self,
        cluster: &mut Cluster,
        events: &[InteractionEvent],
        by_user: &HashMap<&str, Participant>,
        now: u64,
    ) -> Result<()> {
        let members = cluster.member_user_ids.len().max(1) as f64;
        cluster.resonance_score = (events.len() as f64 / members).min(100.0);

        let since = now.saturating_sub(self.policy.activity_window_ms);
        let active = cluster
            .member_user_ids
            .iter()
            .filter(|u| by_user.get(u.as_str()).map_or(false, |p| p.last_seen >= since))
            .count();
        cluster.activity_level = 100.0 * active as f64 / members;

        let mut vectors = Vec::new();
        for user in &cluster.member_user_ids {
            if let Some(v) = self.users.interest_vector(user)? {
                vectors.push(v);
            }
        }
        cluster.cluster_vector = centroid(&vectors);
        Ok(())
    }
}

fn cluster_id(seed_id: &str, created_at: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"cluster:");
    hasher.update(seed_id.as_bytes());
    hasher.update(&created_at.to_le_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..16])
}
