//! Seeds: the content units that propagate.

use crate::clock::{DAY_MS, HOUR_MS};
use crate::error::{Error, Result};
use outbreak_geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Seed category. Determines the base time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedKind {
    Life,
    Opinion,
    Interest,
    Super,
}

impl SeedKind {
    /// Base TTL before the super-spread multiplier.
    pub const fn ttl_millis(&self) -> u64 {
        match self {
            SeedKind::Life => 24 * HOUR_MS,
            SeedKind::Opinion => 48 * HOUR_MS,
            SeedKind::Interest => 72 * HOUR_MS,
            SeedKind::Super => 7 * DAY_MS,
        }
    }
}

/// A seed as submitted by its author, before an id and TTL are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSeed {
    pub author_id: String,
    pub content: String,
    pub kind: SeedKind,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub origin: GeoPoint,
    #[serde(default)]
    pub is_super_spread: bool,
}

impl NewSeed {
    pub fn new(
        author_id: impl Into<String>,
        content: impl Into<String>,
        kind: SeedKind,
        origin: GeoPoint,
    ) -> Self {
        Self {
            author_id: author_id.into(),
            content: content.into(),
            kind,
            tags: BTreeSet::new(),
            origin,
            is_super_spread: false,
        }
    }

    /// Builder: add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Builder: mark as super-spread (doubles TTL).
    pub fn super_spread(mut self) -> Self {
        self.is_super_spread = true;
        self
    }

    /// Check the draft can become a seed.
    pub fn validate(&self) -> Result<()> {
        if self.author_id.trim().is_empty() {
            return Err(Error::InvalidInput("author_id is empty".into()));
        }
        if self.content.trim().is_empty() {
            return Err(Error::InvalidInput("content is empty".into()));
        }
        if !self.origin.is_valid() {
            return Err(Error::InvalidInput(format!(
                "origin ({}, {}) is not a valid coordinate",
                self.origin.lat, self.origin.lng
            )));
        }
        Ok(())
    }
}

/// A content unit propagating through the ladder (a.k.a. strain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// Hex blake3 of author, content and creation time
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub kind: SeedKind,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub origin: GeoPoint,
    /// Unix ms
    pub created_at: u64,
    /// Unix ms, always > `created_at`
    pub expires_at: u64,
    #[serde(default)]
    pub is_super_spread: bool,
    #[serde(default)]
    pub is_dormant: bool,
    /// `None` while dormant means dormant until explicitly awakened
    #[serde(default)]
    pub dormant_until: Option<u64>,
}

impl Seed {
    /// Materialize a validated draft at `created_at`.
    pub fn from_draft(draft: NewSeed, created_at: u64) -> Result<Self> {
        draft.validate()?;
        let id = Self::generate_id(&draft.author_id, &draft.content, created_at);
        let expires_at = created_at.saturating_add(Self::ttl(draft.kind, draft.is_super_spread));
        Ok(Self {
            id,
            author_id: draft.author_id,
            content: draft.content,
            kind: draft.kind,
            tags: draft.tags,
            origin: draft.origin,
            created_at,
            expires_at,
            is_super_spread: draft.is_super_spread,
            is_dormant: false,
            dormant_until: None,
        })
    }

    /// TTL for a kind, doubled for super-spread seeds.
    pub const fn ttl(kind: SeedKind, super_spread: bool) -> u64 {
        let base = kind.ttl_millis();
        if super_spread {
            base * 2
        } else {
            base
        }
    }

    /// Deterministic id from the seed's identity.
    pub fn generate_id(author_id: &str, content: &str, created_at: u64) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(author_id.as_bytes());
        hasher.update(b":");
        hasher.update(content.as_bytes());
        hasher.update(b":");
        hasher.update(&created_at.to_le_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    /// Dormant and not yet past `dormant_until`.
    pub fn is_dormant_at(&self, now: u64) -> bool {
        self.is_dormant && self.dormant_until.map_or(true, |until| now < until)
    }

    /// Put the seed to sleep.
    pub fn make_dormant(&mut self, until: Option<u64>) {
        self.is_dormant = true;
        self.dormant_until = until;
    }

    /// Wake the seed. Returns false if it was not dormant.
    pub fn awaken(&mut self) -> bool {
        let was_dormant = self.is_dormant;
        self.is_dormant = false;
        self.dormant_until = None;
        was_dormant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> NewSeed {
        NewSeed::new("alice", "first bloom", SeedKind::Opinion, GeoPoint::new(10.0, 20.0))
            .with_tag("garden")
    }

    #[test]
    fn ttl_by_kind() {
        let seed = Seed::from_draft(draft(), 1_000).unwrap();
        assert_eq!(seed.expires_at, 1_000 + 48 * HOUR_MS);
        assert!(seed.expires_at > seed.created_at);
        assert!(seed.tags.contains("garden"));
    }

    #[test]
    fn super_spread_doubles_ttl() {
        let seed = Seed::from_draft(draft().super_spread(), 0).unwrap();
        assert_eq!(seed.expires_at, 96 * HOUR_MS);
        assert_eq!(Seed::ttl(SeedKind::Super, true), 14 * DAY_MS);
    }

    #[test]
    fn expiry_is_strictly_after() {
        let seed = Seed::from_draft(draft(), 0).unwrap();
        assert!(!seed.is_expired(seed.expires_at));
        assert!(seed.is_expired(seed.expires_at + 1));
    }

    #[test]
    fn id_is_deterministic() {
        let a = Seed::from_draft(draft(), 7).unwrap();
        let b = Seed::from_draft(draft(), 7).unwrap();
        let c = Seed::from_draft(draft(), 8).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), 64);
    }

    #[test]
    fn dormancy_window() {
        let mut seed = Seed::from_draft(draft(), 0).unwrap();
        seed.make_dormant(Some(500));
        assert!(seed.is_dormant_at(499));
        assert!(!seed.is_dormant_at(500));

        seed.make_dormant(None);
        assert!(seed.is_dormant_at(u64::MAX));
        assert!(seed.awaken());
        assert!(!seed.is_dormant_at(0));
        assert!(!seed.awaken());
    }

    #[test]
    fn rejects_invalid_drafts() {
        let mut bad = draft();
        bad.content = "   ".into();
        assert!(matches!(Seed::from_draft(bad, 0), Err(Error::InvalidInput(_))));

        let mut bad = draft();
        bad.origin = GeoPoint::new(120.0, 0.0);
        assert!(matches!(Seed::from_draft(bad, 0), Err(Error::InvalidInput(_))));
    }
}
