//! Weighted random choice.
//!
//! Works on any sequence of `(key, weight)` pairs; it knows nothing about
//! tracks. Pass an ordered collection (e.g. a `BTreeMap`) to get reproducible
//! draws from a seeded generator.

use crate::error::ConductorError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct WeightedSampler<R = StdRng> {
    rng: R,
}

impl WeightedSampler<StdRng> {
    /// Sampler seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Reproducible sampler.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Seeded when `seed` is given, from entropy otherwise.
    #[must_use]
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }
}

impl<R: Rng> WeightedSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Pick one key with probability proportional to its weight.
    ///
    /// Builds the cumulative sum in iteration order, draws `u` uniformly from
    /// `[0, total)` and returns the first key whose cumulative sum reaches `u`.
    /// Keys with zero weight are never returned. When the weights are finite
    /// but their sum overflows, they are scaled down by the largest one first.
    ///
    /// # Errors
    ///
    /// - [`ConductorError::EmptyDomain`] if there are no keys or the weights
    ///   sum to zero.
    /// - [`ConductorError::InvalidWeight`] on a negative, NaN or infinite weight.
    pub fn choose<K, I>(&mut self, weights: I) -> Result<K, ConductorError>
    where
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut entries = Vec::new();
        let mut largest = 0.0_f64;
        for (key, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConductorError::InvalidWeight(weight));
            }
            if weight == 0.0 {
                continue;
            }
            largest = largest.max(weight);
            entries.push((key, weight));
        }
        if entries.is_empty() {
            return Err(ConductorError::EmptyDomain);
        }

        let sum: f64 = entries.iter().map(|(_, w)| w).sum();
        let scale = if sum.is_finite() { 1.0 } else { largest.recip() };

        let mut total = 0.0_f64;
        let mut cumulative = Vec::with_capacity(entries.len());
        for (key, weight) in entries {
            total += weight * scale;
            cumulative.push((key, total));
        }
        if total <= 0.0 {
            return Err(ConductorError::EmptyDomain);
        }

        let u = self.rng.gen_range(0.0..total);
        let index = cumulative
            .iter()
            .position(|(_, sum)| *sum >= u)
            .unwrap_or(cumulative.len() - 1);
        Ok(cumulative.swap_remove(index).0)
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}
