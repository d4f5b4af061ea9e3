//! Seeded sampling over unnormalized weight vectors.
//!
//! All randomness in the crate flows through [`SampleRng`], so samplers are
//! deterministic given the seed.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

/// A small, seedable generator with the draw shapes the samplers need.
#[derive(Debug, Clone)]
pub struct SampleRng {
    inner: SmallRng,
}

impl SampleRng {
    /// Create a generator from a 64-bit seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
        }
    }

    /// Draw an index proportional to the non-negative weights in
    /// `weights[offset..]`.
    ///
    /// The returned index is absolute (offset included). A degenerate vector
    /// (zero or non-finite total) falls back to a uniform draw over the
    /// candidates rather than surfacing an error.
    pub fn sample_unnormalized_pdf(&mut self, weights: &[f64], offset: usize) -> usize {
        let slice = &weights[offset..];
        debug_assert!(!slice.is_empty(), "sampling from an empty weight vector");
        let total: f64 = slice.iter().sum();
        if !(total > 0.0) || !total.is_finite() {
            warn!(total, "degenerate weight vector, choosing uniformly");
            return offset + self.inner.gen_range(0..slice.len());
        }
        let mut u = self.inner.gen_range(0.0..total);
        for (i, w) in slice.iter().enumerate() {
            u -= w;
            if u < 0.0 {
                return offset + i;
            }
        }
        // floating point slack lands on the last candidate
        offset + slice.len() - 1
    }

    /// Uniform index in `[0, n)`.
    pub fn index(&mut self, n: usize) -> usize {
        self.inner.gen_range(0..n)
    }

    /// Bernoulli draw with success probability `p` (clamped to [0, 1]).
    pub fn accept(&mut self, p: f64) -> bool {
        if !(p > 0.0) {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.inner.gen_bool(p)
    }
}
