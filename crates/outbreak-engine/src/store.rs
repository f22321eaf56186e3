//! Storage seams and the in-memory reference store.
//!
//! The engine only speaks to [`SeedStore`] and [`UserDirectory`]. A store
//! must be safe to call from many threads; the engine serializes writes
//! for one seed itself, so a store never sees two concurrent writers for
//! the same seed id.

use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::infection::InfectionEvent;
use crate::seed::Seed;
use crate::state::PropagationState;
use outbreak_resonance::InteractionEvent;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Durable per-seed records.
pub trait SeedStore: Send + Sync {
    fn get_seed(&self, seed_id: &str) -> Result<Option<Seed>>;
    fn put_seed(&self, seed: &Seed) -> Result<()>;
    fn list_seeds(&self) -> Result<Vec<Seed>>;

    fn get_propagation(&self, seed_id: &str) -> Result<Option<PropagationState>>;
    fn put_propagation(&self, state: &PropagationState) -> Result<()>;

    /// Append to the seed's infection log. Order of appends is preserved.
    fn append_infection(&self, event: &InfectionEvent) -> Result<()>;
    fn infections(&self, seed_id: &str) -> Result<Vec<InfectionEvent>>;

    fn has_infection(&self, seed_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .infections(seed_id)?
            .iter()
            .any(|event| event.user_id == user_id))
    }

    fn append_interaction(&self, event: &InteractionEvent) -> Result<()>;
    fn interactions(&self, seed_id: &str) -> Result<Vec<InteractionEvent>>;

    /// Whether an event with the same [`InteractionEvent::key`] is already logged.
    fn has_interaction(&self, event: &InteractionEvent) -> Result<bool> {
        let key = event.key();
        Ok(self
            .interactions(&event.seed_id)?
            .iter()
            .any(|logged| logged.key() == key))
    }

    fn get_cluster(&self, seed_id: &str) -> Result<Option<Cluster>>;
    fn put_cluster(&self, cluster: &Cluster) -> Result<()>;
}

/// Source of per-user interest embeddings.
pub trait UserDirectory: Send + Sync {
    fn interest_vector(&self, user_id: &str) -> Result<Option<Vec<f32>>>;
}

#[derive(Default)]
struct Tables {
    seeds: HashMap<String, Seed>,
    propagation: HashMap<String, PropagationState>,
    infections: HashMap<String, Vec<InfectionEvent>>,
    interactions: HashMap<String, Vec<InteractionEvent>>,
    clusters: HashMap<String, Cluster>,
    vectors: HashMap<String, Vec<f32>>,
}

/// Process-local store for tests and single-node experiments.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Persistence("memory store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_interest_vector(&self, user_id: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        self.tables
            .write()
            .map_err(poisoned)?
            .vectors
            .insert(user_id.into(), vector);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(f(&tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        Ok(f(&mut tables))
    }
}

impl SeedStore for MemoryStore {
    fn get_seed(&self, seed_id: &str) -> Result<Option<Seed>> {
        self.read(|t| t.seeds.get(seed_id).cloned())
    }

    fn put_seed(&self, seed: &Seed) -> Result<()> {
        self.write(|t| {
            t.seeds.insert(seed.id.clone(), seed.clone());
        })
    }

    fn list_seeds(&self) -> Result<Vec<Seed>> {
        self.read(|t| {
            let mut seeds: Vec<Seed> = t.seeds.values().cloned().collect();
            seeds.sort_by(|a, b| a.id.cmp(&b.id));
            seeds
        })
    }

    fn get_propagation(&self, seed_id: &str) -> Result<Option<PropagationState>> {
        self.read(|t| t.propagation.get(seed_id).cloned())
    }

    fn put_propagation(&self, state: &PropagationState) -> Result<()> {
        self.write(|t| {
            t.propagation.insert(state.seed_id.clone(), state.clone());
        })
    }

    fn append_infection(&self, event: &InfectionEvent) -> Result<()> {
        self.write(|t| {
            t.infections
                .entry(event.seed_id.clone())
                .or_default()
                .push(event.clone());
        })
    }

    fn infections(&self, seed_id: &str) -> Result<Vec<InfectionEvent>> {
        self.read(|t| t.infections.get(seed_id).cloned().unwrap_or_default())
    }

    fn has_infection(&self, seed_id: &str, user_id: &str) -> Result<bool> {
        self.read(|t| {
            t.infections
                .get(seed_id)
                .map_or(false, |log| log.iter().any(|e| e.user_id == user_id))
        })
    }

    fn append_interaction(&self, event: &InteractionEvent) -> Result<()> {
        self.write(|t| {
            t.interactions
                .entry(event.seed_id.clone())
                .or_default()
                .push(event.clone());
        })
    }

    fn interactions(&self, seed_id: &str) -> Result<Vec<InteractionEvent>> {
        self.read(|t| t.interactions.get(seed_id).cloned().unwrap_or_default())
    }

    fn has_interaction(&self, event: &InteractionEvent) -> Result<bool> {
        let key = event.key();
        self.read(|t| {
            t.interactions
                .get(&event.seed_id)
                .map_or(false, |log| log.iter().any(|e| e.key() == key))
        })
    }

    fn get_cluster(&self, seed_id: &str) -> Result<Option<Cluster>> {
        self.read(|t| t.clusters.get(seed_id).cloned())
    }

    fn put_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.write(|t| {
            t.clusters.insert(cluster.seed_id.clone(), cluster.clone());
        })
    }
}

impl UserDirectory for MemoryStore {
    fn interest_vector(&self, user_id: &str) -> Result<Option<Vec<f32>>> {
        self.read(|t| t.vectors.get(user_id).cloned())
    }
}
