//! Generalized estimating equations for clustered count data.
//!
//! Fits a Poisson mean model with log link, E[y] = exp(Xβ), where
//! observations are grouped into clusters that may be internally correlated.
//! The working correlation is one of [`CovStruct`]; the robust (sandwich)
//! covariance stays valid when it is misspecified and when the data are
//! overdispersed relative to Poisson.

use crate::data::{DesignMatrix, Groups};
use crate::error::{SimError, Result};
use crate::model::cov_struct::{CovStruct, CovStructKind};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

/// Maximum Fisher scoring iterations on the estimating equations.
const MAX_ITER: usize = 60;

/// Convergence tolerance on the L2 norm of the estimating-equation score.
const CTOL: f64 = 1e-6;

/// Maximum IRLS iterations for the independence starting values.
const IRLS_MAX_ITER: usize = 25;

/// Relative coefficient change at which IRLS stops.
const IRLS_TOL: f64 = 1e-8;

/// Minimum value for mean to avoid log(0).
const MIN_MU: f64 = 1e-10;

/// How the scale (dispersion) parameter is obtained after fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMethod {
    /// Pearson X² divided by the residual degrees of freedom.
    Pearson,
    /// A known scale, e.g. 1.0 for a plain Poisson model.
    Fixed(f64),
}

/// Per-cluster sums over the estimating equations at one parameter value.
pub(crate) struct ClusterSums {
    /// Σ Dᵢᵀ Vᵢ⁻¹ Dᵢ
    pub bmat: DMatrix<f64>,
    /// Σ Dᵢᵀ Vᵢ⁻¹ (yᵢ - μᵢ)
    pub score: DVector<f64>,
    /// Σ uᵢ uᵢᵀ with uᵢ the cluster score contribution
    pub cmat: DMatrix<f64>,
}

/// A GEE Poisson model bound to one response vector.
#[derive(Debug, Clone)]
pub struct GeeModel {
    endog: DVector<f64>,
    design: DesignMatrix,
    /// Response split by cluster.
    endog_li: Vec<DVector<f64>>,
    /// Design rows split by cluster.
    exog_li: Vec<DMatrix<f64>>,
    cov_kind: CovStructKind,
}

impl GeeModel {
    /// Bind a response, a design and cluster labels.
    pub fn new(
        endog: &[f64],
        design: &DesignMatrix,
        groups: &Groups,
        cov_kind: CovStructKind,
    ) -> Result<Self> {
        let n_obs = endog.len();
        if design.n_samples() != n_obs {
            return Err(SimError::DimensionMismatch {
                expected: n_obs,
                actual: design.n_samples(),
            });
        }
        if groups.n_obs() != n_obs {
            return Err(SimError::DimensionMismatch {
                expected: n_obs,
                actual: groups.n_obs(),
            });
        }
        if n_obs <= design.n_coefficients() {
            return Err(SimError::Numerical(
                "Model is saturated (n_obs <= n_coefficients)".to_string(),
            ));
        }
        if let Some(bad) = endog.iter().find(|&&y| !(y >= 0.0) || !y.is_finite()) {
            return Err(SimError::InvalidParameter(format!(
                "Poisson responses must be non-negative and finite, got {}",
                bad
            )));
        }

        let x = design.matrix();
        let endog_li = groups
            .indices()
            .iter()
            .map(|rows| DVector::from_iterator(rows.len(), rows.iter().map(|&i| endog[i])))
            .collect();
        let exog_li = groups
            .indices()
            .iter()
            .map(|rows| x.select_rows(rows.iter()))
            .collect();

        Ok(Self {
            endog: DVector::from_column_slice(endog),
            design: design.clone(),
            endog_li,
            exog_li,
            cov_kind,
        })
    }

    pub fn design(&self) -> &DesignMatrix {
        &self.design
    }

    pub fn cov_kind(&self) -> CovStructKind {
        self.cov_kind
    }

    pub fn n_obs(&self) -> usize {
        self.endog.len()
    }

    pub fn n_groups(&self) -> usize {
        self.endog_li.len()
    }

    pub fn n_coefficients(&self) -> usize {
        self.design.n_coefficients()
    }

    /// Fit the mean parameters and estimate the scale.
    ///
    /// Starts from the Poisson GLM (independence) estimate, then alternates
    /// Fisher scoring steps on the GEE estimating equations with updates of
    /// the working dependence parameter. Stops once the score norm falls
    /// below tolerance after at least one dependence update.
    pub fn fit(&self, scale_method: ScaleMethod) -> Result<GeeFit> {
        let p = self.n_coefficients();
        let mut beta = self.starting_params()?;
        let mut cov_struct = CovStruct::new(self.cov_kind);

        let mut converged = false;
        let mut iterations = 0;
        let mut dep_updates = 0;

        for iter in 0..MAX_ITER {
            iterations = iter + 1;

            let sums = self.cluster_sums(&beta, &cov_struct);
            let update = solve(&sums.bmat, &sums.score).ok_or_else(|| {
                SimError::Numerical("Singular matrix in GEE mean update".to_string())
            })?;
            beta += update;

            let score_norm = sums.score.norm();
            if score_norm < CTOL && dep_updates > 0 {
                converged = true;
                break;
            }

            cov_struct.update(&self.pearson_residuals(&beta), p)?;
            dep_updates += 1;
        }

        if !converged {
            log::warn!(
                "GEE did not converge after {} iterations ({} working structure)",
                iterations,
                self.cov_kind
            );
        }

        let sums = self.cluster_sums(&beta, &cov_struct);
        let bmat_inv = sums.bmat.clone().try_inverse().ok_or_else(|| {
            SimError::Numerical("Singular matrix in GEE covariance".to_string())
        })?;

        let scale = match scale_method {
            ScaleMethod::Pearson => self.pearson_scale(&beta),
            ScaleMethod::Fixed(s) => s,
        };

        let cov_naive = &bmat_inv * scale;
        let cov_robust = &bmat_inv * &sums.cmat * &bmat_inv;
        let fitted_values = self.design.matrix() * &beta;

        log::debug!(
            "GEE fit: p={}, iterations={}, scale={:.4}, dep={:?}",
            p,
            iterations,
            scale,
            cov_struct.dep_param()
        );

        Ok(GeeFit {
            coefficients: beta.iter().copied().collect(),
            coefficient_names: self.design.coefficient_names().to_vec(),
            cov_robust,
            cov_naive,
            scale,
            scale_method,
            cov_struct,
            iterations,
            converged,
            n_obs: self.n_obs(),
            n_groups: self.n_groups(),
            fitted_values: fitted_values.iter().map(|e| e.exp()).collect(),
        })
    }

    /// Poisson GLM estimate by IRLS, used as the GEE starting point.
    fn starting_params(&self) -> Result<DVector<f64>> {
        let x = self.design.matrix();
        let y = &self.endog;
        let n_obs = self.n_obs();
        let n_coef = self.n_coefficients();

        let y_mean = y.mean();
        let mut mu = y.map(|v| ((v + y_mean) / 2.0).max(MIN_MU));
        let mut beta: Option<DVector<f64>> = None;

        for _ in 0..IRLS_MAX_ITER {
            // Working response z = eta + (y - mu) / mu, weights W = mu.
            let z = DVector::from_iterator(
                n_obs,
                (0..n_obs).map(|i| mu[i].ln() + (y[i] - mu[i]) / mu[i]),
            );

            let mut xw = x.clone();
            let mut zw = z;
            for i in 0..n_obs {
                let w_sqrt = mu[i].sqrt();
                for j in 0..n_coef {
                    xw[(i, j)] *= w_sqrt;
                }
                zw[i] *= w_sqrt;
            }

            let xtwx = xw.transpose() * &xw;
            let xtwz = xw.transpose() * &zw;
            let beta_new = solve(&xtwx, &xtwz).ok_or_else(|| {
                SimError::Numerical("Singular matrix in Poisson IRLS".to_string())
            })?;

            mu = (x * &beta_new).map(|e| e.exp().max(MIN_MU));

            let done = beta.as_ref().is_some_and(|old| {
                let delta: f64 = (&beta_new - old).iter().map(|d| d.abs()).sum();
                let scale: f64 = old.iter().map(|b| b.abs()).sum::<f64>().max(1.0);
                delta / scale < IRLS_TOL
            });
            beta = Some(beta_new);
            if done {
                break;
            }
        }

        beta.ok_or_else(|| SimError::Numerical("IRLS produced no estimate".to_string()))
    }

    /// Cluster means exp(Xᵢβ).
    fn cluster_mean(x: &DMatrix<f64>, beta: &DVector<f64>) -> DVector<f64> {
        (x * beta).map(|e| e.exp().max(MIN_MU))
    }

    /// Accumulate the estimating-equation pieces at `beta` under `cov_struct`.
    pub(crate) fn cluster_sums(&self, beta: &DVector<f64>, cov_struct: &CovStruct) -> ClusterSums {
        let p = self.n_coefficients();
        let mut bmat = DMatrix::zeros(p, p);
        let mut score = DVector::zeros(p);
        let mut cmat = DMatrix::zeros(p, p);

        for (x, y) in self.exog_li.iter().zip(&self.endog_li) {
            let mu = Self::cluster_mean(x, beta);
            let k = mu.len();
            let sdev = mu.map(f64::sqrt);

            // [D | y - mu] with D = diag(mu) X, the derivative of the mean under the log link.
            let mut rhs = DMatrix::zeros(k, p + 1);
            for i in 0..k {
                for j in 0..p {
                    rhs[(i, j)] = mu[i] * x[(i, j)];
                }
                rhs[(i, p)] = y[i] - mu[i];
            }

            let vinv = cov_struct.solve(&sdev, &rhs);
            let dt = rhs.columns(0, p).transpose();
            bmat += &dt * vinv.columns(0, p);
            let u = &dt * vinv.column(p);
            cmat += &u * u.transpose();
            score += u;
        }

        ClusterSums { bmat, score, cmat }
    }

    /// Per-cluster Pearson residuals (y - μ)/√μ.
    fn pearson_residuals(&self, beta: &DVector<f64>) -> Vec<DVector<f64>> {
        self.exog_li
            .iter()
            .zip(&self.endog_li)
            .map(|(x, y)| {
                let mu = Self::cluster_mean(x, beta);
                DVector::from_iterator(
                    mu.len(),
                    y.iter().zip(mu.iter()).map(|(&yi, &mi)| (yi - mi) / mi.sqrt()),
                )
            })
            .collect()
    }

    /// Pearson X² over the residual degrees of freedom.
    pub(crate) fn pearson_scale(&self, beta: &DVector<f64>) -> f64 {
        let chi_sq: f64 = self
            .pearson_residuals(beta)
            .iter()
            .map(|r| r.norm_squared())
            .sum();
        chi_sq / (self.n_obs() - self.n_coefficients()) as f64
    }

    pub(crate) fn scale_at(&self, beta: &DVector<f64>, method: ScaleMethod) -> f64 {
        match method {
            ScaleMethod::Pearson => self.pearson_scale(beta),
            ScaleMethod::Fixed(s) => s,
        }
    }
}

/// Solve a small symmetric system, `None` when it is singular.
pub(crate) fn solve(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    a.clone().lu().solve(b)
}

/// Results from fitting a GEE model.
#[derive(Debug, Clone)]
pub struct GeeFit {
    /// Estimated mean parameters (log scale).
    pub coefficients: Vec<f64>,
    /// Coefficient names from the design matrix.
    pub coefficient_names: Vec<String>,
    /// Robust (sandwich) covariance of the coefficients.
    pub cov_robust: DMatrix<f64>,
    /// Model-based covariance, scaled by the estimated scale.
    pub cov_naive: DMatrix<f64>,
    /// Estimated scale parameter (variance / mean for Poisson).
    pub scale: f64,
    /// How `scale` was obtained.
    pub scale_method: ScaleMethod,
    /// Working structure with its final dependence parameter.
    pub cov_struct: CovStruct,
    /// Number of scoring iterations.
    pub iterations: usize,
    /// Whether the score norm reached tolerance.
    pub converged: bool,
    pub n_obs: usize,
    pub n_groups: usize,
    /// Fitted means.
    pub fitted_values: Vec<f64>,
}

impl GeeFit {
    /// Robust standard errors.
    pub fn std_errors(&self) -> Vec<f64> {
        (0..self.coefficients.len())
            .map(|j| self.cov_robust[(j, j)].max(0.0).sqrt())
            .collect()
    }

    /// Model-based standard errors.
    pub fn naive_std_errors(&self) -> Vec<f64> {
        (0..self.coefficients.len())
            .map(|j| self.cov_naive[(j, j)].max(0.0).sqrt())
            .collect()
    }

    /// Robust z-statistic for a coefficient.
    pub fn z_statistic(&self, index: usize) -> Option<f64> {
        let coef = self.coefficients.get(index)?;
        let se = self.std_errors().get(index).copied()?;
        if se > 0.0 {
            Some(coef / se)
        } else {
            None
        }
    }

    /// Two-sided robust Wald p-values for every coefficient.
    pub fn p_values(&self) -> Vec<f64> {
        (0..self.coefficients.len())
            .map(|j| match self.z_statistic(j) {
                Some(z) => erfc(z.abs() / std::f64::consts::SQRT_2),
                None => f64::NAN,
            })
            .collect()
    }

    /// Working dependence parameter, if any.
    pub fn dep_param(&self) -> Option<f64> {
        self.cov_struct.dep_param()
    }
}
