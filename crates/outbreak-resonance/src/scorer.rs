//! The luminosity scorer.

use crate::event::InteractionEvent;
use serde::{Deserialize, Serialize};

/// Upper bound of the luminosity scale.
pub const MAX_LUMINOSITY: f64 = 100.0;

/// Multiplier applied to the mean weighted interaction.
const SCALE: f64 = 10.0;

/// Score and companion count for one seed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Resonance {
    /// Bounded score, 0.0..=100.0
    pub luminosity: f64,
    /// Number of interactions scored
    pub resonance_count: usize,
}

/// Compute luminosity from a seed's interactions.
///
/// Pure and deterministic. An empty slice scores 0.
pub fn score(interactions: &[InteractionEvent]) -> Resonance {
    if interactions.is_empty() {
        return Resonance::default();
    }

    let total: f64 = interactions.iter().map(InteractionEvent::weighted).sum();
    let mean = total / interactions.len() as f64;
    let luminosity = (mean * SCALE).clamp(0.0, MAX_LUMINOSITY);

    Resonance {
        // clamp passes NaN through; overflowed sums land here
        luminosity: if luminosity.is_nan() { 0.0 } else { luminosity },
        resonance_count: interactions.len(),
    }
}
