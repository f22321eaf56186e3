//! The ordered ladder of reach levels.

use crate::level::{DelayRange, GeographicLevel, LevelNumber, UnlockCondition};
use crate::point::GeoPoint;
use thiserror::Error;

/// Reasons a ladder configuration is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LadderError {
    #[error("ladder has no levels")]
    Empty,

    #[error("levels must be numbered 1..=N contiguously: expected {expected}, found {found}")]
    NonContiguous {
        expected: LevelNumber,
        found: LevelNumber,
    },

    #[error("level {level} radius must be finite, positive and larger than the level below")]
    InvalidRadius { level: LevelNumber },

    #[error("level 1 must be unconditional with zero delay")]
    OriginGated,

    #[error("level {level} has no unlock condition")]
    MissingUnlock { level: LevelNumber },

    #[error("level {level} unlock rate must be within 0.0..=1.0")]
    InvalidRate { level: LevelNumber },

    #[error("level {level} delay range has min > max")]
    InvalidDelay { level: LevelNumber },
}

/// Immutable, validated sequence of nested levels.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LevelLadder {
    levels: Vec<GeographicLevel>,
}

impl Default for LevelLadder {
    fn default() -> Self {
        Self {
            levels: vec![
                GeographicLevel::origin("community", 1.0),
                GeographicLevel::gated(
                    2,
                    "neighborhood",
                    3.0,
                    UnlockCondition::new(20, 0.30),
                    DelayRange::new(5, 30),
                ),
                GeographicLevel::gated(
                    3,
                    "street",
                    10.0,
                    UnlockCondition::new(50, 0.20),
                    DelayRange::new(30, 120),
                ),
                GeographicLevel::gated(
                    4,
                    "city",
                    50.0,
                    UnlockCondition::new(100, 0.10),
                    DelayRange::new(120, 480),
                ),
            ],
        }
    }
}

impl LevelLadder {
    /// Validate and build a ladder.
    pub fn new(levels: Vec<GeographicLevel>) -> Result<Self, LadderError> {
        if levels.is_empty() {
            return Err(LadderError::Empty);
        }

        let mut prev_radius = 0.0;
        for (i, level) in levels.iter().enumerate() {
            let expected = (i + 1) as LevelNumber;
            if level.level != expected {
                return Err(LadderError::NonContiguous {
                    expected,
                    found: level.level,
                });
            }
            if !level.radius_km.is_finite() || level.radius_km <= prev_radius {
                return Err(LadderError::InvalidRadius { level: level.level });
            }
            prev_radius = level.radius_km;

            if level.delay.min_minutes > level.delay.max_minutes {
                return Err(LadderError::InvalidDelay { level: level.level });
            }

            match (level.level, &level.unlock) {
                (1, None) if level.delay.is_zero() => {}
                (1, _) => return Err(LadderError::OriginGated),
                (n, None) => return Err(LadderError::MissingUnlock { level: n }),
                (n, Some(cond)) => {
                    if !(0.0..=1.0).contains(&cond.min_infection_rate) {
                        return Err(LadderError::InvalidRate { level: n });
                    }
                }
            }
        }

        Ok(Self { levels })
    }

    /// Resolve the smallest level containing `point`, measured from `origin`.
    ///
    /// Returns `None` for invalid coordinates or points beyond the outermost level.
    pub fn resolve(&self, origin: &GeoPoint, point: &GeoPoint) -> Option<&GeographicLevel> {
        if !origin.is_valid() || !point.is_valid() {
            return None;
        }
        let distance = origin.distance_km(point);
        self.levels.iter().find(|l| l.contains_distance(distance))
    }

    /// Look up a level by number.
    pub fn level(&self, level: LevelNumber) -> Option<&GeographicLevel> {
        if level == 0 {
            return None;
        }
        self.levels.get(level as usize - 1)
    }

    /// The level directly above `level`, if any.
    pub fn next(&self, level: LevelNumber) -> Option<&GeographicLevel> {
        self.level(level.checked_add(1)?)
    }

    /// Outermost level.
    pub fn top(&self) -> &GeographicLevel {
        // Non-empty by construction
        &self.levels[self.levels.len() - 1]
    }

    pub fn levels(&self) -> &[GeographicLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
