//! Uniform scalar sampling for blinding factors and matrix entries

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::rknn::error::{Result, RknnError};

/// Blinding scalars must be strictly positive, so the range has to satisfy
/// `0 < min < max` with finite bounds.
fn check_range(min: f64, max: f64) -> Result<()> {
    if !(min.is_finite() && max.is_finite()) {
        return Err(RknnError::precondition("sampler bounds must be finite"));
    }
    if !(min > 0.0 && max > min) {
        return Err(RknnError::precondition(format!(
            "sampler range [{}, {}) must satisfy 0 < min < max",
            min, max
        )));
    }
    Ok(())
}

/// Uniform sampler over `[min, max)` backed by ChaCha20
pub struct ScalarSampler {
    min: f64,
    max: f64,
    rng: ChaCha20Rng,
}

impl ScalarSampler {
    /// Create a new sampler seeded from OS entropy
    pub fn new(min: f64, max: f64) -> Result<Self> {
        check_range(min, max)?;
        Ok(Self {
            min,
            max,
            rng: ChaCha20Rng::from_entropy(),
        })
    }

    /// Create a seeded sampler for reproducibility
    pub fn with_seed(min: f64, max: f64, seed: u64) -> Result<Self> {
        check_range(min, max)?;
        Ok(Self {
            min,
            max,
            rng: ChaCha20Rng::seed_from_u64(seed),
        })
    }

    /// Draw one strictly positive scalar from the configured range
    pub fn draw_uniform(&mut self) -> f64 {
        self.rng.gen_range(self.min..self.max)
    }

    /// Draw a value symmetric around zero, used for matrix entries
    pub fn draw_signed(&mut self) -> f64 {
        let magnitude = self.draw_uniform();
        if self.rng.gen::<bool>() {
            magnitude
        } else {
            -magnitude
        }
    }

    /// Draw a blinding triple with `r1 > r3 > 0`.
    ///
    /// `r1` and `r3` are redrawn together until the ordering holds.
    pub fn blinding_triple(&mut self) -> BlindingTriple {
        let mut r1 = self.draw_uniform();
        let r2 = self.draw_uniform();
        let mut r3 = self.draw_uniform();
        while r1 <= r3 {
            r1 = self.draw_uniform();
            r3 = self.draw_uniform();
        }
        BlindingTriple { r1, r2, r3 }
    }

}

/// Three blinding scalars `(r1, r2, r3)` with `r1 > r3 > 0`.
///
/// The object side uses one triple per dataset (r11, r12, r13); the query
/// side draws a fresh one per query (r21, r22, r23).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlindingTriple {
    /// Positive scale applied to every meaningful slot
    pub r1: f64,
    /// Scale of the self-cancelling padding slots
    pub r2: f64,
    /// Additive offset term, smaller than `r1`
    pub r3: f64,
}

impl BlindingTriple {
    /// Build a triple from explicit values, checking the ordering invariant
    pub fn new(r1: f64, r2: f64, r3: f64) -> Result<Self> {
        if !(r1.is_finite() && r2.is_finite() && r3.is_finite()) {
            return Err(RknnError::precondition("blinding scalars must be finite"));
        }
        if !(r3 > 0.0 && r1 > r3) {
            return Err(RknnError::precondition(format!(
                "blinding scalars must satisfy r1 > r3 > 0 (got r1={}, r3={})",
                r1, r3
            )));
        }
        if r2 <= 0.0 {
            return Err(RknnError::precondition("padding scalar r2 must be positive"));
        }
        Ok(Self { r1, r2, r3 })
    }
}
