//! Shared fixtures for cross-crate scenario tests.

use outbreak_engine::geo::GeoPoint;
use outbreak_engine::{
    EngineConfig, InfectionRequest, ManualClock, MemoryStore, NewSeed, PropagationEngine, Seed,
    SeedKind, SeedStore, UserDirectory,
};
use std::sync::Arc;

/// 2023-11-14T22:13:20Z
pub const T0: u64 = 1_700_000_000_000;

/// Somewhere in Lisbon.
pub const ORIGIN: GeoPoint = GeoPoint::new(38.7223, -9.1393);

/// An engine on a manual clock over the given store.
pub fn engine_with<S>(store: Arc<S>) -> (Arc<PropagationEngine>, Arc<ManualClock>)
where
    S: SeedStore + UserDirectory + 'static,
{
    let clock = Arc::new(ManualClock::new(T0));
    let engine = PropagationEngine::new(store.clone(), store, EngineConfig::default())
        .expect("default config is valid")
        .with_clock(clock.clone());
    (Arc::new(engine), clock)
}

/// An engine over a fresh in-memory store.
pub fn memory_engine() -> (Arc<PropagationEngine>, Arc<ManualClock>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let (engine, clock) = engine_with(store.clone());
    (engine, clock, store)
}

pub fn draft(content: &str) -> NewSeed {
    NewSeed::new("author", content, SeedKind::Interest, ORIGIN)
}

/// Request from `user` standing `km` north of the origin.
pub fn request_at(seed: &Seed, user: impl Into<String>, km: f64) -> InfectionRequest {
    InfectionRequest::new(&seed.id, user, ORIGIN.offset_north_km(km))
}
