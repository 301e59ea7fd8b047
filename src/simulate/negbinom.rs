//! Negative binomial counts driven by copula uniforms.
//!
//! Counts come from a gamma/Poisson mixture. The gamma intensity is drawn
//! independently per observation; the Poisson step is taken by inversion at
//! the supplied uniform, so any dependence among the uniforms carries
//! through to the counts.

use crate::error::{SimError, Result};
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use statrs::distribution::{ContinuousCDF, DiscreteCDF, Normal, Poisson};

/// Largest probability handed to the Poisson quantile; above it the
/// quantile is effectively unbounded in double precision.
const MAX_PROB: f64 = 1.0 - 1e-12;

/// Draw negative binomial counts with means `mu` and variance `scale × mu`.
///
/// `u` holds marginally uniform values in (0, 1), one per observation.
/// `scale` must exceed 1; the Poisson limit is approached as it tends to 1.
pub fn negbinom<R: Rng + ?Sized>(
    u: &[f64],
    mu: &[f64],
    scale: f64,
    rng: &mut R,
) -> Result<Vec<u64>> {
    if u.len() != mu.len() {
        return Err(SimError::DimensionMismatch {
            expected: u.len(),
            actual: mu.len(),
        });
    }
    if !(scale > 1.0) || !scale.is_finite() {
        return Err(SimError::InvalidParameter(format!(
            "negative binomial scale must be finite and greater than 1, got {}",
            scale
        )));
    }

    let p = (scale - 1.0) / scale;
    let gamma_scale = p / (1.0 - p);

    u.iter()
        .zip(mu.iter())
        .map(|(&ui, &mi)| {
            let shape = mi * (1.0 - p) / p;
            let gamma = Gamma::new(shape, gamma_scale).map_err(|e| {
                SimError::InvalidParameter(format!(
                    "gamma(shape={}, scale={}): {}",
                    shape, gamma_scale, e
                ))
            })?;
            let intensity = gamma.sample(rng);
            poisson_quantile(ui, intensity)
        })
        .collect()
}

/// Smallest k with P(X ≤ k) ≥ `prob` for X ~ Poisson(`lambda`).
///
/// Starts from the Cornish-Fisher approximation and walks to the exact
/// quantile with the statrs CDF. `lambda` ≤ 0 is the point mass at zero.
pub fn poisson_quantile(prob: f64, lambda: f64) -> Result<u64> {
    if prob.is_nan() || lambda.is_nan() {
        return Err(SimError::InvalidParameter(format!(
            "Poisson quantile needs numeric inputs, got p={}, lambda={}",
            prob, lambda
        )));
    }
    if lambda <= 0.0 || prob <= 0.0 {
        return Ok(0);
    }
    let prob = prob.min(MAX_PROB);

    let poisson = Poisson::new(lambda)
        .map_err(|e| SimError::InvalidParameter(format!("Poisson({}): {}", lambda, e)))?;
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| SimError::InvalidParameter(format!("standard normal: {}", e)))?;

    let z = normal.inverse_cdf(prob);
    let guess = lambda + lambda.sqrt() * z + (z * z - 1.0) / 6.0;
    let mut k = if guess.is_finite() && guess > 0.0 {
        guess.floor() as u64
    } else {
        0
    };

    if poisson.cdf(k) >= prob {
        while k > 0 && poisson.cdf(k - 1) >= prob {
            k -= 1;
        }
    } else {
        while poisson.cdf(k) < prob {
            k += 1;
        }
    }

    Ok(k)
}
