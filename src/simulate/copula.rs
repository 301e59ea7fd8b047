//! Clustered uniforms from a single-factor Gaussian copula.

use crate::error::{SimError, Result};
use rand::Rng;
use rand_distr::StandardNormal;
use statrs::distribution::{ContinuousCDF, Normal};

/// Generate `n_obs` values that are marginally uniform on (0, 1),
/// independent across clusters of `cluster_size` consecutive observations
/// and correlated within them.
///
/// Each value is Φ(√(1−r²)·zᵢ + r·u_g) where zᵢ is observation noise and u_g
/// a factor shared by the cluster, so the latent within-cluster correlation
/// is r². `icc` = 0 gives independent values and `icc` = 1 makes every value
/// in a cluster identical. `icc` outside [-1, 1] is not checked and yields NaN.
pub fn correlated_uniforms<R: Rng + ?Sized>(
    n_obs: usize,
    cluster_size: usize,
    icc: f64,
    rng: &mut R,
) -> Result<Vec<f64>> {
    if cluster_size == 0 || n_obs % cluster_size != 0 {
        return Err(SimError::InvalidParameter(format!(
            "n_obs ({}) must be a positive multiple of cluster_size ({})",
            n_obs, cluster_size
        )));
    }

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| SimError::InvalidParameter(format!("standard normal: {}", e)))?;

    let z: Vec<f64> = (0..n_obs).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
    let shared: Vec<f64> = (0..n_obs / cluster_size)
        .map(|_| rng.sample::<f64, _>(StandardNormal))
        .collect();

    let noise_weight = (1.0 - icc * icc).sqrt();
    Ok(z
        .iter()
        .enumerate()
        .map(|(i, &zi)| normal.cdf(noise_weight * zi + icc * shared[i / cluster_size]))
        .collect())
}
