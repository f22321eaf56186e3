//! Persistent storage using RocksDB.
//!
//! # Key Layout
//!
//! ```text
//! seed:{seed}                         Seed
//! prop:{seed}                         PropagationState
//! infection:{seed}:{seq:020}          InfectionEvent
//! infected:{seed}:{user}              marker for duplicate checks
//! interaction:{seed}:{seq:020}        InteractionEvent
//! interacted:{seed}:{event key}       marker for duplicate checks
//! cluster:{seed}                      Cluster
//! user:vector:{user}                  interest vector
//! seq:{log}:{seed}                    next sequence number of a log
//! ```
//!
//! Log appends write the entry, its sequence counter and any index in one
//! batch. Sequence numbers are zero-padded so prefix iteration returns a
//! log in append order.

use crate::error::{Error, Result};
use outbreak_engine::{
    Cluster, InfectionEvent, PropagationState, Seed, SeedStore, UserDirectory,
};
use outbreak_resonance::InteractionEvent;
use rocksdb::{Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

const INFECTION_LOG: &str = "infection";
const INTERACTION_LOG: &str = "interaction";

/// RocksDB-backed seed store and user directory.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.db.put(key.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let prefix = prefix.as_bytes();
        let mut out = Vec::new();
        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn next_seq(&self, log: &str, seed_id: &str) -> Result<(String, u64)> {
        let key = format!("seq:{}:{}", log, seed_id);
        let seq = match self.db.get(key.as_bytes())? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage(format!("corrupt counter {}", key)))?;
                u64::from_le_bytes(raw)
            }
            None => 0,
        };
        Ok((key, seq))
    }

    fn append<T: Serialize>(
        &self,
        log: &str,
        seed_id: &str,
        value: &T,
        index: Option<String>,
    ) -> Result<()> {
        let (seq_key, seq) = self.next_seq(log, seed_id)?;
        let mut batch = WriteBatch::default();
        batch.put(
            format!("{}:{}:{:020}", log, seed_id, seq).as_bytes(),
            serde_json::to_vec(value)?,
        );
        batch.put(seq_key.as_bytes(), (seq + 1).to_le_bytes());
        if let Some(index) = index {
            batch.put(index.as_bytes(), b"1");
        }
        self.db.write(batch)?;
        Ok(())
    }

    /// Store a user's interest embedding.
    pub fn set_interest_vector(&self, user_id: &str, vector: &[f32]) -> Result<()> {
        self.put_json(&format!("user:vector:{}", user_id), &vector)
    }
}

impl SeedStore for RocksStore {
    fn get_seed(&self, seed_id: &str) -> outbreak_engine::Result<Option<Seed>> {
        Ok(self.get_json(&format!("seed:{}", seed_id))?)
    }

    fn put_seed(&self, seed: &Seed) -> outbreak_engine::Result<()> {
        Ok(self.put_json(&format!("seed:{}", seed.id), seed)?)
    }

    fn list_seeds(&self) -> outbreak_engine::Result<Vec<Seed>> {
        Ok(self.scan("seed:")?)
    }

    fn get_propagation(&self, seed_id: &str) -> outbreak_engine::Result<Option<PropagationState>> {
        Ok(self.get_json(&format!("prop:{}", seed_id))?)
    }

    fn put_propagation(&self, state: &PropagationState) -> outbreak_engine::Result<()> {
        Ok(self.put_json(&format!("prop:{}", state.seed_id), state)?)
    }

    fn append_infection(&self, event: &InfectionEvent) -> outbreak_engine::Result<()> {
        let index = format!("infected:{}:{}", event.seed_id, event.user_id);
        Ok(self.append(INFECTION_LOG, &event.seed_id, event, Some(index))?)
    }

    fn infections(&self, seed_id: &str) -> outbreak_engine::Result<Vec<InfectionEvent>> {
        Ok(self.scan(&format!("{}:{}:", INFECTION_LOG, seed_id))?)
    }

    fn has_infection(&self, seed_id: &str, user_id: &str) -> outbreak_engine::Result<bool> {
        let key = format!("infected:{}:{}", seed_id, user_id);
        let found = self.db.get(key.as_bytes()).map_err(Error::from)?.is_some();
        Ok(found)
    }

    fn append_interaction(&self, event: &InteractionEvent) -> outbreak_engine::Result<()> {
        let index = format!("interacted:{}:{}", event.seed_id, event.key());
        Ok(self.append(INTERACTION_LOG, &event.seed_id, event, Some(index))?)
    }

    fn has_interaction(&self, event: &InteractionEvent) -> outbreak_engine::Result<bool> {
        let key = format!("interacted:{}:{}", event.seed_id, event.key());
        let found = self.db.get(key.as_bytes()).map_err(Error::from)?.is_some();
        Ok(found)
    }

    fn interactions(&self, seed_id: &str) -> outbreak_engine::Result<Vec<InteractionEvent>> {
        Ok(self.scan(&format!("{}:{}:", INTERACTION_LOG, seed_id))?)
    }

    fn get_cluster(&self, seed_id: &str) -> outbreak_engine::Result<Option<Cluster>> {
        Ok(self.get_json(&format!("cluster:{}", seed_id))?)
    }

    fn put_cluster(&self, cluster: &Cluster) -> outbreak_engine::Result<()> {
        Ok(self.put_json(&format!("cluster:{}", cluster.seed_id), cluster)?)
    }
}

impl UserDirectory for RocksStore {
    fn interest_vector(&self, user_id: &str) -> outbreak_engine::Result<Option<Vec<f32>>> {
        Ok(self.get_json(&format!("user:vector:{}", user_id))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbreak_engine::geo::{GeoPoint, LevelLadder, PopulationEstimates};
    use outbreak_engine::{NewSeed, SeedKind};
    use outbreak_resonance::InteractionKind;
    use tempfile::tempdir;

    fn seed() -> Seed {
        Seed::from_draft(
            NewSeed::new("alice", "hello", SeedKind::Opinion, GeoPoint::new(1.0, 2.0)),
            1_000,
        )
        .unwrap()
    }

    fn infection(seed: &Seed, user: &str, at: u64) -> InfectionEvent {
        InfectionEvent {
            seed_id: seed.id.clone(),
            user_id: user.to_string(),
            user_location: seed.origin,
            target_level: 1,
            occurred_at: at,
            propagation_delay_minutes: 0,
            source_user_id: None,
            locality: None,
        }
    }

    #[test]
    fn seed_and_state_persist() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let seed = seed();
        store.put_seed(&seed).unwrap();
        assert_eq!(store.get_seed(&seed.id).unwrap(), Some(seed.clone()));
        assert_eq!(store.list_seeds().unwrap().len(), 1);

        let state = PropagationState::initialize(
            &seed,
            &LevelLadder::default(),
            &PopulationEstimates::default(),
        );
        store.put_propagation(&state).unwrap();
        assert_eq!(store.get_propagation(&seed.id).unwrap(), Some(state));
        assert_eq!(store.get_propagation("other").unwrap(), None);
    }

    #[test]
    fn logs_keep_order_across_reopen() {
        let dir = tempdir().unwrap();
        let seed = seed();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            for i in 0..12 {
                store.append_infection(&infection(&seed, &format!("u{}", i), i)).unwrap();
            }
        }
        let store = RocksStore::open(dir.path()).unwrap();
        store.append_infection(&infection(&seed, "late", 99)).unwrap();

        let log = store.infections(&seed.id).unwrap();
        assert_eq!(log.len(), 13);
        assert!(log.windows(2).all(|w| w[0].occurred_at < w[1].occurred_at));
        assert!(store.has_infection(&seed.id, "u11").unwrap());
        assert!(!store.has_infection(&seed.id, "nobody").unwrap());
    }

    #[test]
    fn logs_are_scoped_per_seed() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let a = seed();
        for (seed_id, user) in [(a.id.as_str(), "x"), ("b", "y"), (a.id.as_str(), "z")] {
            store
                .append_interaction(&InteractionEvent::new(seed_id, user, InteractionKind::Comment, 1.0, 5))
                .unwrap();
        }
        let users: Vec<_> = store
            .interactions(&a.id)
            .unwrap()
            .into_iter()
            .map(|e| e.user_id)
            .collect();
        assert_eq!(users, vec!["x", "z"]);
        assert_eq!(store.interactions("b").unwrap().len(), 1);
    }

    #[test]
    fn interaction_index_survives_reopen() {
        let dir = tempdir().unwrap();
        let event = InteractionEvent::new("s1", "u1", InteractionKind::Share, 1.0, 42);
        {
            let store = RocksStore::open(dir.path()).unwrap();
            assert!(!store.has_interaction(&event).unwrap());
            store.append_interaction(&event).unwrap();
        }
        let store = RocksStore::open(dir.path()).unwrap();
        assert!(store.has_interaction(&event).unwrap());
        let later = InteractionEvent::new("s1", "u1", InteractionKind::Share, 1.0, 43);
        assert!(!store.has_interaction(&later).unwrap());
    }

    #[test]
    fn interest_vectors() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        store.set_interest_vector("u1", &[0.25, 0.75]).unwrap();
        assert_eq!(store.interest_vector("u1").unwrap(), Some(vec![0.25, 0.75]));
        assert_eq!(store.interest_vector("u2").unwrap(), None);
    }
}
