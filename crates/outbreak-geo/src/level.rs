//! A single rung of the geographic ladder.

/// Level numbers are 1-based and totally ordered.
pub type LevelNumber = u8;

/// Thresholds a level's predecessor must cross before the level unlocks.
///
/// Both conditions are required.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnlockCondition {
    /// Minimum infected count at the prior level
    pub min_infected: u64,
    /// Minimum infection rate at the prior level, 0.0..=1.0
    pub min_infection_rate: f64,
}

impl UnlockCondition {
    /// Create a new condition.
    pub const fn new(min_infected: u64, min_infection_rate: f64) -> Self {
        Self {
            min_infected,
            min_infection_rate,
        }
    }

    /// Evaluate against the source level's counters.
    pub fn is_met(&self, infected: u64, infection_rate: f64) -> bool {
        infected >= self.min_infected && infection_rate >= self.min_infection_rate
    }

    /// Infections still missing at `population` before both thresholds hold.
    pub fn infections_needed(&self, infected: u64, population: u64) -> u64 {
        let by_rate = (self.min_infection_rate * population as f64).ceil() as u64;
        self.min_infected.max(by_rate).saturating_sub(infected)
    }
}

/// Propagation latency once a level is unlocked, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DelayRange {
    pub min_minutes: u32,
    pub max_minutes: u32,
}

impl DelayRange {
    /// No latency (level 1).
    pub const ZERO: Self = Self {
        min_minutes: 0,
        max_minutes: 0,
    };

    /// Create a new range.
    pub const fn new(min_minutes: u32, max_minutes: u32) -> Self {
        Self {
            min_minutes,
            max_minutes,
        }
    }

    /// The delay applied to recorded infections: always the lower bound.
    pub const fn deterministic(&self) -> u32 {
        self.min_minutes
    }

    pub const fn is_zero(&self) -> bool {
        self.max_minutes == 0
    }
}

/// Static configuration for one reach level.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeographicLevel {
    /// Position in the ladder (1 = innermost)
    pub level: LevelNumber,
    /// Human-readable name
    pub name: String,
    /// Containment radius around the seed origin
    pub radius_km: f64,
    /// Gate evaluated on level `level - 1`. `None` only for level 1.
    pub unlock: Option<UnlockCondition>,
    /// Latency once unlocked
    pub delay: DelayRange,
}

impl GeographicLevel {
    /// The unconditional innermost level.
    pub fn origin(name: impl Into<String>, radius_km: f64) -> Self {
        Self {
            level: 1,
            name: name.into(),
            radius_km,
            unlock: None,
            delay: DelayRange::ZERO,
        }
    }

    /// An outer level gated on its predecessor.
    pub fn gated(
        level: LevelNumber,
        name: impl Into<String>,
        radius_km: f64,
        unlock: UnlockCondition,
        delay: DelayRange,
    ) -> Self {
        Self {
            level,
            name: name.into(),
            radius_km,
            unlock: Some(unlock),
            delay,
        }
    }

    /// Whether `distance_km` from the origin falls inside this level.
    pub fn contains_distance(&self, distance_km: f64) -> bool {
        distance_km <= self.radius_km
    }
}
