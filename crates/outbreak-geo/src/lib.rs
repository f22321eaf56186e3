//! Outbreak Geographic Ladder
//!
//! Nested reach levels a seed climbs as it spreads outward from its origin.
//!
//! # Containment
//!
//! Each level is a disc around the seed's origin. Discs nest strictly:
//!
//! ```text
//! LEVEL  NAME           RADIUS    UNLOCK (on level N-1)     DELAY
//! ───────────────────────────────────────────────────────────────────
//!   1    community        1 km    -                         0 min
//!   2    neighborhood     3 km    20 infected, rate ≥ 0.30  5-30 min
//!   3    street          10 km    50 infected, rate ≥ 0.20  30-120 min
//!   4    city            50 km    100 infected, rate ≥ 0.10 120-480 min
//! ```
//!
//! A point belongs to the smallest disc that contains it. Points outside the
//! outermost disc are unroutable.
//!
//! # Unlocking
//!
//! A level's [`UnlockCondition`] is evaluated against the counters of the
//! level directly below it. Levels never skip.

mod ladder;
mod level;
mod point;
mod population;

pub use ladder::{LadderError, LevelLadder};
pub use level::{DelayRange, GeographicLevel, LevelNumber, UnlockCondition};
pub use point::{GeoPoint, EARTH_RADIUS_KM};
pub use population::PopulationEstimates;

/// Number of levels in the default ladder.
pub const DEFAULT_LEVEL_COUNT: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_matches_populations() {
        let ladder = LevelLadder::default();
        let populations = PopulationEstimates::default();
        assert_eq!(ladder.len(), DEFAULT_LEVEL_COUNT);
        assert!(populations.covers(&ladder));
    }
}
