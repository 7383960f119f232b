//! Probabilistic emoji reactions.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Draw `u` in `[0, 1)`; above `probability` → no reaction, otherwise a
/// uniformly chosen glyph (none when `glyphs` is empty).
pub fn select<'a, R: Rng + ?Sized>(
    rng: &mut R,
    probability: f64,
    glyphs: &'a [String],
) -> Option<&'a str> {
    let draw: f64 = rng.r#gen();
    if draw > probability {
        return None;
    }
    glyphs.choose(rng).map(String::as_str)
}

/// Owns the reaction probability and a seedable RNG.
pub struct ReactionSelector {
    probability: f64,
    rng: Mutex<StdRng>,
}

impl ReactionSelector {
    pub fn new(probability: f64) -> Self {
        Self::with_rng(probability, StdRng::from_entropy())
    }

    pub fn with_rng(probability: f64, rng: StdRng) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    pub fn select(&self, glyphs: &[String]) -> Option<String> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        select(&mut *rng, self.probability, glyphs).map(str::to_string)
    }
}
