//! Fixed parameters of a simulation run.

use crate::error::{SimError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the score test simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Sample size.
    pub n_obs: usize,
    /// Number of covariates in the alternative model, intercept included.
    pub n_covariates: usize,
    /// Observations per cluster.
    pub cluster_size: usize,
    /// Weight of the shared cluster factor in the latent Gaussian copula.
    /// The latent within-cluster correlation is `icc²`; the default √0.75
    /// gives a latent correlation of 0.75.
    pub icc: f64,
    /// Negative binomial variance-to-mean ratio.
    pub scale: f64,
    /// Coefficients of the null mean model (a prefix of the design).
    pub null_coefficients: Vec<f64>,
    /// Coefficients of the alternative mean model.
    pub alt_coefficients: Vec<f64>,
    /// P-value threshold used for the rejection rate.
    pub threshold: f64,
    /// Random seed for the design and all replicates.
    pub seed: u64,
    /// Replicates per hypothesis with the independence working structure.
    pub independence_reps: usize,
    /// Replicates per hypothesis with the exchangeable working structure.
    pub exchangeable_reps: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_obs: 1000,
            n_covariates: 5,
            cluster_size: 10,
            icc: 0.75f64.sqrt(),
            scale: 10.0,
            null_coefficients: vec![4.0, 0.4, -0.2],
            alt_coefficients: vec![4.0, 0.4, -0.2, 0.0, -0.04],
            threshold: 0.1,
            seed: 42,
            independence_reps: 500,
            exchangeable_reps: 100,
        }
    }
}

impl SimulationConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(SimError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(SimError::from)
    }

    /// Load from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Set sample and cluster sizes.
    pub fn with_dimensions(mut self, n_obs: usize, cluster_size: usize) -> Self {
        self.n_obs = n_obs;
        self.cluster_size = cluster_size;
        self
    }

    /// Set the intraclass correlation.
    pub fn with_icc(mut self, icc: f64) -> Self {
        self.icc = icc;
        self
    }

    /// Set the negative binomial scale.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Set both coefficient vectors; the design width follows the alternative.
    pub fn with_coefficients(mut self, null: Vec<f64>, alt: Vec<f64>) -> Self {
        self.n_covariates = alt.len();
        self.null_coefficients = null;
        self.alt_coefficients = alt;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set replicate counts for the two working structures.
    pub fn with_reps(mut self, independence: usize, exchangeable: usize) -> Self {
        self.independence_reps = independence;
        self.exchangeable_reps = exchangeable;
        self
    }

    /// Number of clusters.
    pub fn n_clusters(&self) -> usize {
        if self.cluster_size == 0 {
            0
        } else {
            self.n_obs / self.cluster_size
        }
    }

    /// Check that the parameters describe a runnable simulation.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_size == 0 || self.n_obs == 0 {
            return Err(SimError::InvalidParameter(
                "n_obs and cluster_size must be positive".to_string(),
            ));
        }
        if self.n_obs % self.cluster_size != 0 {
            return Err(SimError::InvalidParameter(format!(
                "n_obs ({}) must be divisible by cluster_size ({})",
                self.n_obs, self.cluster_size
            )));
        }
        if self.alt_coefficients.len() != self.n_covariates {
            return Err(SimError::DimensionMismatch {
                expected: self.n_covariates,
                actual: self.alt_coefficients.len(),
            });
        }
        if self.null_coefficients.is_empty()
            || self.null_coefficients.len() >= self.alt_coefficients.len()
        {
            return Err(SimError::InvalidParameter(format!(
                "null model needs between 1 and {} coefficients, got {}",
                self.alt_coefficients.len() - 1,
                self.null_coefficients.len()
            )));
        }
        if self.null_coefficients[..] != self.alt_coefficients[..self.null_coefficients.len()] {
            return Err(SimError::InvalidParameter(
                "null coefficients must be a prefix of the alternative coefficients".to_string(),
            ));
        }
        if self.n_obs <= self.n_covariates {
            return Err(SimError::InvalidParameter(format!(
                "n_obs ({}) must exceed the number of covariates ({})",
                self.n_obs, self.n_covariates
            )));
        }
        if !(self.scale > 1.0) || !self.scale.is_finite() {
            return Err(SimError::InvalidParameter(format!(
                "scale must be finite and greater than 1, got {}",
                self.scale
            )));
        }
        if !(-1.0..=1.0).contains(&self.icc) {
            return Err(SimError::InvalidParameter(format!(
                "icc must lie in [-1, 1], got {}",
                self.icc
            )));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(SimError::InvalidParameter(format!(
                "threshold must lie in (0, 1), got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}
