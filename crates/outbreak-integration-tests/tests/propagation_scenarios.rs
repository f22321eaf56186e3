//! End-to-end ladder climbs through the engine facade.

use outbreak_engine::clock::MINUTE_MS;
use outbreak_engine::geo::{LevelLadder, PopulationEstimates};
use outbreak_engine::{Error, LevelPhase, PropagationState, SeedStore};
use outbreak_integration_tests::{draft, memory_engine, request_at};

#[tokio::test]
async fn neighborhood_waits_for_the_rate() {
    let (engine, clock, _) = memory_engine();
    let seed = engine.create_seed(draft("rate gate")).await.unwrap();

    for i in 0..20 {
        clock.advance(MINUTE_MS);
        engine.infect(request_at(&seed, format!("a{}", i), 0.3)).await.unwrap();
    }
    let state = engine.propagation(&seed.id).unwrap();
    let community = state.progress(1).unwrap();
    assert_eq!(community.infected_count, 21);
    assert!((community.infection_rate - 0.105).abs() < 1e-12);
    assert!(!state.is_unlocked(2));

    let blocked = engine.infect(request_at(&seed, "early", 2.0)).await.unwrap_err();
    assert!(matches!(blocked, Error::LevelLocked { level: 2, .. }));
    assert_eq!(blocked.public_message(), "not yet reachable here");

    let mut unlocked_at = None;
    for i in 20..59 {
        clock.advance(MINUTE_MS);
        engine.infect(request_at(&seed, format!("a{}", i), 0.3)).await.unwrap();
        if unlocked_at.is_none() && engine.propagation(&seed.id).unwrap().is_unlocked(2) {
            unlocked_at = Some(engine.now());
        }
    }
    let state = engine.propagation(&seed.id).unwrap();
    assert_eq!(state.progress(1).unwrap().infected_count, 60);
    assert_eq!(state.progress(2).unwrap().unlocked_at, unlocked_at);
    assert!(!state.is_unlocked(3));
}

#[tokio::test]
async fn full_climb_unlocks_in_order() {
    let (engine, clock, store) = memory_engine();
    let seed = engine.create_seed(draft("full climb")).await.unwrap();
    let mut history: Vec<PropagationState> = vec![engine.propagation(&seed.id).unwrap()];

    // (distance km, infections) enough to open each next level
    let waves = [(0.5, 59), (2.0, 200), (6.0, 500), (20.0, 10)];
    let mut user = 0;
    for (km, count) in waves {
        for _ in 0..count {
            clock.advance(1_000);
            engine.infect(request_at(&seed, format!("u{}", user), km)).await.unwrap();
            user += 1;
        }
        history.push(engine.propagation(&seed.id).unwrap());
    }

    let last = history.last().unwrap();
    assert!(last.levels.iter().all(|p| p.is_unlocked));
    assert_eq!(last.current_level, 4);
    assert_eq!(last.total_infected, 1 + 59 + 200 + 500 + 10);
    assert_eq!(last.verify(), Ok(()));

    for pair in history.windows(2) {
        assert!(pair[1].is_successor_of(&pair[0]));
    }
    let unlocks: Vec<u64> = last.levels.iter().map(|p| p.unlocked_at.unwrap()).collect();
    assert!(unlocks.windows(2).all(|w| w[0] < w[1]));

    let delays: Vec<u32> = store
        .infections(&seed.id)
        .unwrap()
        .iter()
        .map(|e| e.propagation_delay_minutes)
        .collect();
    assert_eq!(delays[0], 0);
    assert_eq!(delays[59], 5);
    assert_eq!(delays[259], 30);
    assert_eq!(delays[759], 120);

    let summary = engine.level_summary(&seed.id).unwrap();
    assert_eq!(summary[0].phase, LevelPhase::ThresholdMet);
    assert_eq!(summary[3].phase, LevelPhase::Accumulating);
}

#[tokio::test]
async fn levels_never_skip_ahead() {
    let (engine, _, _) = memory_engine();
    let seed = engine.create_seed(draft("no skipping")).await.unwrap();
    for i in 0..59 {
        engine.infect(request_at(&seed, format!("u{}", i), 0.1)).await.unwrap();
    }
    // level 2 open, level 3 still closed no matter how many level-1 infections arrive
    for i in 59..300 {
        engine.infect(request_at(&seed, format!("u{}", i), 0.1)).await.unwrap();
    }
    let state = engine.propagation(&seed.id).unwrap();
    assert!(state.is_unlocked(2));
    assert!(!state.is_unlocked(3));
    assert!(matches!(
        engine.infect(request_at(&seed, "far", 6.0)).await,
        Err(Error::LevelLocked { level: 3, .. })
    ));
}

#[tokio::test]
async fn state_equals_replay_of_log() {
    let (engine, clock, store) = memory_engine();
    let seed = engine.create_seed(draft("replay")).await.unwrap();
    for i in 0..80 {
        clock.advance(17);
        let km = if i < 59 { 0.2 } else { 1.5 };
        engine.infect(request_at(&seed, format!("u{}", i), km)).await.unwrap();
    }
    let replayed = PropagationState::replay(
        &seed,
        &LevelLadder::default(),
        &PopulationEstimates::default(),
        &store.infections(&seed.id).unwrap(),
    )
    .unwrap();
    assert_eq!(replayed, engine.propagation(&seed.id).unwrap());
}

#[tokio::test]
async fn expired_seed_keeps_its_history() {
    let (engine, clock, _) = memory_engine();
    let seed = engine.create_seed(draft("fading")).await.unwrap();
    engine.infect(request_at(&seed, "u1", 0.1)).await.unwrap();

    clock.set(seed.expires_at + 1);
    let err = engine.infect(request_at(&seed, "u2", 0.1)).await.unwrap_err();
    assert!(matches!(err, Error::SeedExpired { .. }));
    assert!(err.is_expected());

    let state = engine.propagation(&seed.id).unwrap();
    assert!(state.is_expired(engine.now()));
    assert_eq!(state.total_infected, 2);
}
