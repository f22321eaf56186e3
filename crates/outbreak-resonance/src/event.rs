//! Interaction events: the append-only input to scoring and clustering.

use serde::{Deserialize, Serialize};

/// Current wire schema version for [`InteractionEvent`].
pub const SCHEMA_VERSION: u16 = 1;

/// What a user did with a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    View,
    Like,
    Comment,
    Share,
    Resonate,
    /// Any kind this schema version does not know about
    #[serde(other)]
    Unknown,
}

impl InteractionKind {
    /// Scoring weight for this kind.
    pub const fn weight(&self) -> f64 {
        match self {
            InteractionKind::View => 1.0,
            InteractionKind::Like => 3.0,
            InteractionKind::Comment => 5.0,
            InteractionKind::Share => 8.0,
            InteractionKind::Resonate => 10.0,
            InteractionKind::Unknown => 1.0,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Like => "like",
            InteractionKind::Comment => "comment",
            InteractionKind::Share => "share",
            InteractionKind::Resonate => "resonate",
            InteractionKind::Unknown => "unknown",
        }
    }
}

/// A single recorded interaction. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Schema version this event was written with
    #[serde(default = "default_schema_version")]
    pub version: u16,

    /// Seed interacted with
    pub seed_id: String,

    /// Interacting user
    pub user_id: String,

    /// Interaction kind
    #[serde(rename = "type")]
    pub kind: InteractionKind,

    /// Intensity multiplier, nominally 0.0..=1.0
    #[serde(default = "default_strength")]
    pub strength: f64,

    /// Unix timestamp in milliseconds
    pub occurred_at: u64,
}

fn default_schema_version() -> u16 {
    SCHEMA_VERSION
}

fn default_strength() -> f64 {
    1.0
}

impl InteractionEvent {
    /// Create a new event at the current schema version.
    pub fn new(
        seed_id: impl Into<String>,
        user_id: impl Into<String>,
        kind: InteractionKind,
        strength: f64,
        occurred_at: u64,
    ) -> Self {
        Self {
            version: SCHEMA_VERSION,
            seed_id: seed_id.into(),
            user_id: user_id.into(),
            kind,
            strength,
            occurred_at,
        }
    }

    /// Identity of this event within its seed's log. A redelivered or
    /// retried event carries the same key.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.user_id, self.kind.as_str(), self.occurred_at)
    }

    /// Weighted contribution of this event. Non-finite strengths contribute nothing.
    pub fn weighted(&self) -> f64 {
        if self.strength.is_finite() {
            self.kind.weight() * self.strength
        } else {
            0.0
        }
    }
}
