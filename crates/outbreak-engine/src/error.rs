//! Error types for outbreak-engine.

use outbreak_geo::{GeoPoint, LevelNumber};
use std::time::Duration;
use thiserror::Error;

/// Result type for outbreak-engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while propagating a seed.
///
/// Variants for which [`Error::is_expected`] returns true are ordinary
/// outcomes the caller drops; the engine never retries anything itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// No seed with this id exists in the store.
    #[error("seed not found: {0}")]
    SeedNotFound(String),

    /// The seed's TTL has elapsed.
    #[error("seed {seed_id} expired at {expired_at}")]
    SeedExpired { seed_id: String, expired_at: u64 },

    /// The seed is dormant and accepts no infections.
    #[error("seed {seed_id} is dormant until {until:?}")]
    SeedDormant { seed_id: String, until: Option<u64> },

    /// The infection targets a level that is not unlocked yet.
    #[error("seed {seed_id} has not unlocked level {level}")]
    LevelLocked { seed_id: String, level: LevelNumber },

    /// No geographic level contains the user's location.
    #[error("location ({}, {}) is outside every level of seed {seed_id}", .location.lat, .location.lng)]
    UnroutableLocation { seed_id: String, location: GeoPoint },

    /// This user is already infected by this seed.
    #[error("user {user_id} is already infected by seed {seed_id}")]
    DuplicateInfection { seed_id: String, user_id: String },

    /// The store is unavailable or returned corrupt data. Retry with backoff.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The unit of work missed its deadline.
    #[error("seed operation timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed request or configuration.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A background worker failed without producing a result.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl Error {
    /// Whether this is an ordinary propagation outcome rather than an engine failure.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Error::SeedExpired { .. }
                | Error::SeedDormant { .. }
                | Error::LevelLocked { .. }
                | Error::UnroutableLocation { .. }
                | Error::DuplicateInfection { .. }
        )
    }

    /// Whether the caller should retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence(_) | Error::Timeout(_))
    }

    /// Neutral message safe to show end users.
    pub fn public_message(&self) -> &'static str {
        match self {
            Error::LevelLocked { .. } | Error::UnroutableLocation { .. } => {
                "not yet reachable here"
            }
            Error::SeedExpired { .. } => "this seed has faded",
            Error::SeedDormant { .. } => "this seed is resting",
            Error::DuplicateInfection { .. } => "already reached",
            Error::SeedNotFound(_) => "not found",
            Error::InvalidInput(_) => "invalid request",
            Error::Persistence(_) | Error::Timeout(_) | Error::Worker(_) => {
                "temporarily unavailable"
            }
        }
    }
}
