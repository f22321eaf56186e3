//! Outbreak Resonance
//!
//! Luminosity is a bounded `[0, 100]` score derived from how users interact
//! with a seed.
//!
//! # Formula
//!
//! ```text
//! luminosity = clamp( Σ weight(kind) × strength / n × 10, 0, 100 )
//!
//! KIND      WEIGHT
//! ────────────────
//! view        1
//! like        3
//! comment     5
//! share       8
//! resonate   10
//! unknown     1
//! ```
//!
//! Scoring is a pure function of the event set: replaying the same log
//! always yields the same luminosity.

mod event;
mod scorer;

pub use event::{InteractionEvent, InteractionKind, SCHEMA_VERSION};
pub use scorer::{score, Resonance, MAX_LUMINOSITY};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_like_at_full_strength() {
        let events = vec![InteractionEvent::new("s", "u", InteractionKind::Like, 1.0, 0)];
        let r = score(&events);
        // 3 × 1.0 / 1 × 10 = 30
        assert_eq!(r.luminosity, 30.0);
        assert_eq!(r.resonance_count, 1);
    }
}
