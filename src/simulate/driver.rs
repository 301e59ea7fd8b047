//! Monte Carlo driver for the score test.
//!
//! A [`Simulation`] holds everything fixed for a run: the designs, the
//! cluster labels and the two mean vectors. [`Simulation::dosim`] then
//! repeats generate, fit and test under one hypothesis and working
//! structure, with replicates running in parallel.

use super::config::SimulationConfig;
use super::copula::correlated_uniforms;
use super::negbinom::negbinom;
use crate::data::{DesignMatrix, Groups};
use crate::error::{SimError, Result};
use crate::model::{CovStructKind, GeeModel, ScaleMethod};
use crate::test::compare_score_test;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which mean model generates the responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hypothesis {
    /// Responses follow the null mean μ0 = exp(X0·β0).
    Null,
    /// Responses follow the alternative mean μ1 = exp(X·β1).
    Alternative,
}

impl Hypothesis {
    /// Row label used in report tables.
    pub fn label(&self) -> &'static str {
        match self {
            Hypothesis::Null => "H0",
            Hypothesis::Alternative => "H1",
        }
    }

    fn stream(&self) -> u64 {
        match self {
            Hypothesis::Null => 0,
            Hypothesis::Alternative => 1,
        }
    }
}

impl fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Outcome of one generate, fit and test cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Replicate {
    /// Pearson scale of the null model fit.
    pub scale_null: f64,
    /// Pearson scale of the alternative model fit.
    pub scale_alt: f64,
    /// Robust score test p-value.
    pub p_value: f64,
    /// Estimated working correlation of the null model fit, if any.
    pub dep_param: Option<f64>,
    /// Whether both GEE fits converged.
    pub converged: bool,
}

/// Aggregated results of a [`Simulation::dosim`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub hypothesis: Hypothesis,
    pub cov_struct: CovStructKind,
    pub n_reps: usize,
    /// Threshold used for the rejection rate.
    pub threshold: f64,
    /// `[mean p-value, fraction of p-values below the threshold]`.
    pub summary: [f64; 2],
    /// Scale estimates from the null model, one per replicate.
    pub scales_null: Vec<f64>,
    /// Scale estimates from the alternative model, one per replicate.
    pub scales_alt: Vec<f64>,
    /// Score test p-values, one per replicate.
    pub p_values: Vec<f64>,
    /// Null-fit working correlations; empty under independence.
    pub dep_params: Vec<f64>,
    /// Replicates where at least one fit hit the iteration limit.
    pub n_nonconverged: usize,
}

impl SimulationResult {
    fn from_replicates(
        hypothesis: Hypothesis,
        cov_struct: CovStructKind,
        threshold: f64,
        reps: Vec<Replicate>,
    ) -> Self {
        let n_reps = reps.len();
        let p_values: Vec<f64> = reps.iter().map(|r| r.p_value).collect();
        let mean_p = p_values.iter().sum::<f64>() / n_reps as f64;
        let frac = p_values.iter().filter(|&&p| p < threshold).count() as f64 / n_reps as f64;

        Self {
            hypothesis,
            cov_struct,
            n_reps,
            threshold,
            summary: [mean_p, frac],
            scales_null: reps.iter().map(|r| r.scale_null).collect(),
            scales_alt: reps.iter().map(|r| r.scale_alt).collect(),
            p_values,
            dep_params: reps.iter().filter_map(|r| r.dep_param).collect(),
            n_nonconverged: reps.iter().filter(|r| !r.converged).count(),
        }
    }

    pub fn mean_p_value(&self) -> f64 {
        self.summary[0]
    }

    /// Fraction of replicates with p-value strictly below the threshold.
    pub fn rejection_rate(&self) -> f64 {
        self.summary[1]
    }

    /// Mean estimated working correlation of the null fits.
    pub fn mean_dep_param(&self) -> Option<f64> {
        if self.dep_params.is_empty() {
            None
        } else {
            Some(self.dep_params.iter().sum::<f64>() / self.dep_params.len() as f64)
        }
    }
}

/// Fixed inputs shared by every replicate of a run.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimulationConfig,
    design_alt: DesignMatrix,
    design_null: DesignMatrix,
    groups: Groups,
    mean_null: Vec<f64>,
    mean_alt: Vec<f64>,
}

impl Simulation {
    /// Validate the configuration and draw the fixed design.
    ///
    /// The design is drawn from the run seed, so two simulations built from
    /// the same configuration are identical.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let design_alt = DesignMatrix::gaussian(config.n_obs, config.n_covariates, &mut rng)?;
        let design_null = design_alt.leading_columns(config.null_coefficients.len())?;
        let groups = Groups::consecutive(config.n_obs, config.cluster_size)?;

        let mean_null = design_null.mean_response(&config.null_coefficients)?;
        let mean_alt = design_alt.mean_response(&config.alt_coefficients)?;

        log::debug!(
            "simulation setup: n={}, clusters={}, p0={}, p1={}",
            config.n_obs,
            groups.n_groups(),
            design_null.n_coefficients(),
            design_alt.n_coefficients()
        );

        Ok(Self {
            config,
            design_alt,
            design_null,
            groups,
            mean_null,
            mean_alt,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn design_alt(&self) -> &DesignMatrix {
        &self.design_alt
    }

    pub fn design_null(&self) -> &DesignMatrix {
        &self.design_null
    }

    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    /// Mean vector generating the responses under `hypothesis`.
    pub fn mean_vector(&self, hypothesis: Hypothesis) -> &[f64] {
        match hypothesis {
            Hypothesis::Null => &self.mean_null,
            Hypothesis::Alternative => &self.mean_alt,
        }
    }

    /// Run one replicate with the given generator.
    pub fn replicate<R: Rng + ?Sized>(
        &self,
        hypothesis: Hypothesis,
        cov_kind: CovStructKind,
        rng: &mut R,
    ) -> Result<Replicate> {
        let config = &self.config;
        let u = correlated_uniforms(config.n_obs, config.cluster_size, config.icc, rng)?;
        let counts = negbinom(&u, self.mean_vector(hypothesis), config.scale, rng)?;
        let endog: Vec<f64> = counts.iter().map(|&c| c as f64).collect();

        let model_null = GeeModel::new(&endog, &self.design_null, &self.groups, cov_kind)?;
        let fit_null = model_null.fit(ScaleMethod::Pearson)?;

        let model_alt = GeeModel::new(&endog, &self.design_alt, &self.groups, cov_kind)?;
        let fit_alt = model_alt.fit(ScaleMethod::Pearson)?;

        let test = compare_score_test(&model_alt, &model_null, &fit_null)?;

        Ok(Replicate {
            scale_null: fit_null.scale,
            scale_alt: fit_alt.scale,
            p_value: test.p_value,
            dep_param: fit_null.dep_param(),
            converged: fit_null.converged && fit_alt.converged,
        })
    }

    /// Run `n_reps` replicates and summarize the p-values.
    ///
    /// Replicate `i` draws from its own generator seeded from the run seed,
    /// the hypothesis, the working structure and `i`, so results do not
    /// depend on thread scheduling. Any fitting failure aborts the run.
    pub fn dosim(
        &self,
        hypothesis: Hypothesis,
        cov_kind: CovStructKind,
        n_reps: usize,
    ) -> Result<SimulationResult> {
        if n_reps == 0 {
            return Err(SimError::EmptyData(
                "at least one replicate is required".to_string(),
            ));
        }

        log::info!(
            "running {} replicates under {} with {} working structure",
            n_reps,
            hypothesis,
            cov_kind
        );

        let reps: Vec<Replicate> = (0..n_reps)
            .into_par_iter()
            .map(|rep| {
                let mut rng = StdRng::seed_from_u64(self.replicate_seed(hypothesis, cov_kind, rep));
                let outcome = self.replicate(hypothesis, cov_kind, &mut rng)?;
                log::debug!(
                    "{} {} rep {}: p={:.4}, scale0={:.3}, scale1={:.3}",
                    hypothesis,
                    cov_kind,
                    rep,
                    outcome.p_value,
                    outcome.scale_null,
                    outcome.scale_alt
                );
                Ok(outcome)
            })
            .collect::<Result<Vec<_>>>()?;

        let result =
            SimulationResult::from_replicates(hypothesis, cov_kind, self.config.threshold, reps);

        if result.n_nonconverged > 0 {
            log::warn!(
                "{} of {} replicates had a GEE fit that did not converge",
                result.n_nonconverged,
                n_reps
            );
        }
        log::info!(
            "{} {}: mean p-value {:.4}, P(p<{}) = {:.3}",
            hypothesis,
            cov_kind,
            result.mean_p_value(),
            self.config.threshold,
            result.rejection_rate()
        );

        Ok(result)
    }

    fn replicate_seed(&self, hypothesis: Hypothesis, cov_kind: CovStructKind, rep: usize) -> u64 {
        let kind = match cov_kind {
            CovStructKind::Independence => 0u64,
            CovStructKind::Exchangeable => 1u64,
        };
        let stream = (hypothesis.stream() << 1 | kind) << 32;
        splitmix64(self.config.seed ^ splitmix64(stream | rep as u64))
    }
}

/// splitmix64 finalizer.
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimulationConfig {
        SimulationConfig::default()
            .with_dimensions(200, 10)
            .with_seed(11)
    }

    #[test]
    fn test_setup_shapes() {
        let sim = Simulation::new(small_config()).unwrap();
        assert_eq!(sim.design_alt().n_coefficients(), 5);
        assert_eq!(sim.design_null().n_coefficients(), 3);
        assert_eq!(sim.groups().n_groups(), 20);
        assert_eq!(sim.mean_vector(Hypothesis::Null).len(), 200);

        // Null design is the leading block of the alternative design.
        let x = sim.design_alt().matrix();
        let x0 = sim.design_null().matrix();
        assert_eq!(x.columns(0, 3).into_owned(), x0.clone());
    }

    #[test]
    fn test_means_agree_on_shared_coefficients() {
        let config = small_config()
            .with_coefficients(vec![2.0, 0.3], vec![2.0, 0.3, 0.0]);
        let sim = Simulation::new(config).unwrap();

        // β1 only adds a zero coefficient, so the two means coincide.
        let m0 = sim.mean_vector(Hypothesis::Null);
        let m1 = sim.mean_vector(Hypothesis::Alternative);
        for (a, b) in m0.iter().zip(m1) {
            assert!((a - b).abs() < 1e-12 * a.max(1.0));
        }
    }

    #[test]
    fn test_single_replicate_summary() {
        let sim = Simulation::new(small_config()).unwrap();
        let result = sim
            .dosim(Hypothesis::Null, CovStructKind::Independence, 1)
            .unwrap();

        assert_eq!(result.n_reps, 1);
        assert_eq!(result.scales_null.len(), 1);
        assert_eq!(result.scales_alt.len(), 1);
        assert!((0.0..=1.0).contains(&result.summary[0]));
        assert!(result.summary[1] == 0.0 || result.summary[1] == 1.0);
        assert!(result.scales_null[0] > 0.0);
    }

    #[test]
    fn test_dosim_is_reproducible() {
        let sim = Simulation::new(small_config()).unwrap();
        let a = sim
            .dosim(Hypothesis::Alternative, CovStructKind::Exchangeable, 4)
            .unwrap();
        let b = sim
            .dosim(Hypothesis::Alternative, CovStructKind::Exchangeable, 4)
            .unwrap();
        assert_eq!(a.p_values, b.p_values);
        assert_eq!(a.scales_null, b.scales_null);
        assert_eq!(a.dep_params, b.dep_params);
    }

    #[test]
    fn test_working_correlation_recorded() {
        let sim = Simulation::new(small_config()).unwrap();
        let ind = sim
            .dosim(Hypothesis::Null, CovStructKind::Independence, 2)
            .unwrap();
        assert!(ind.dep_params.is_empty());
        assert_eq!(ind.mean_dep_param(), None);

        let exch = sim
            .dosim(Hypothesis::Null, CovStructKind::Exchangeable, 3)
            .unwrap();
        assert_eq!(exch.dep_params.len(), 3);
        // Counts share a strong cluster factor, so the working correlation is positive.
        let a = exch.mean_dep_param().unwrap();
        assert!(a > 0.0 && a < 1.0, "mean working correlation {}", a);
    }

    #[test]
    fn test_streams_differ() {
        let sim = Simulation::new(small_config()).unwrap();
        let null = sim.replicate_seed(Hypothesis::Null, CovStructKind::Independence, 0);
        let alt = sim.replicate_seed(Hypothesis::Alternative, CovStructKind::Independence, 0);
        let exch = sim.replicate_seed(Hypothesis::Null, CovStructKind::Exchangeable, 0);
        let next = sim.replicate_seed(Hypothesis::Null, CovStructKind::Independence, 1);
        assert_ne!(null, alt);
        assert_ne!(null, exch);
        assert_ne!(null, next);
    }

    #[test]
    fn test_zero_replicates_rejected() {
        let sim = Simulation::new(small_config()).unwrap();
        assert!(sim
            .dosim(Hypothesis::Null, CovStructKind::Independence, 0)
            .is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Simulation::new(small_config().with_dimensions(205, 10)).is_err());
    }
}
