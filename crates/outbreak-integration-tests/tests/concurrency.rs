//! Concurrent writers against one seed and across seeds.

use outbreak_engine::{Error, SeedStore};
use outbreak_integration_tests::{draft, engine_with, memory_engine, request_at};
use outbreak_node::RocksStore;
use std::sync::Arc;
use tokio::task::JoinSet;

const WRITERS: usize = 150;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn one_seed_many_writers_in_memory() {
    let (engine, _, store) = memory_engine();
    let seed = engine.create_seed(draft("hot")).await.unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..WRITERS {
        let engine = engine.clone();
        let request = request_at(&seed, format!("w{}", i), 0.4);
        tasks.spawn(async move { engine.infect(request).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    let state = engine.propagation(&seed.id).unwrap();
    assert_eq!(state.progress(1).unwrap().infected_count, 1 + WRITERS as u64);
    assert_eq!(state.applied_events, WRITERS as u64);
    assert_eq!(store.infections(&seed.id).unwrap().len(), WRITERS);
    assert!(state.is_unlocked(2));
    assert_eq!(state.verify(), Ok(()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_seeds_in_parallel_on_rocksdb() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksStore::open(dir.path()).unwrap());
    let (engine, _) = engine_with(store);

    let mut seeds = Vec::new();
    for i in 0..4 {
        seeds.push(engine.create_seed(draft(&format!("seed {}", i))).await.unwrap());
    }

    let mut tasks = JoinSet::new();
    for seed in &seeds {
        for i in 0..40 {
            let engine = engine.clone();
            let request = request_at(seed, format!("w{}", i), 0.2);
            tasks.spawn(async move { engine.infect(request).await });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    for seed in &seeds {
        let state = engine.propagation(&seed.id).unwrap();
        assert_eq!(state.total_infected, 41);
        assert_eq!(state.verify(), Ok(()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn redelivery_storm_counts_each_user_once() {
    let (engine, _, _) = memory_engine();
    let seed = engine.create_seed(draft("storm")).await.unwrap();

    let mut tasks = JoinSet::new();
    for round in 0..5 {
        for i in 0..20 {
            let engine = engine.clone();
            let request = request_at(&seed, format!("r{}", i), 0.1 * (round + 1) as f64);
            tasks.spawn(async move { engine.infect(request).await });
        }
    }
    let (mut applied, mut duplicates) = (0, 0);
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => applied += 1,
            Err(Error::DuplicateInfection { .. }) => duplicates += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(applied, 20);
    assert_eq!(duplicates, 80);
    assert_eq!(engine.propagation(&seed.id).unwrap().total_infected, 21);
}
