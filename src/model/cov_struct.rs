//! Working correlation structures for GEE.
//!
//! A working structure models within-cluster correlation during estimation.
//! The GEE estimates stay consistent when it is wrong; only efficiency and the
//! naive covariance suffer, which is why the robust score test is needed.

use crate::error::{SimError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named working correlation structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovStructKind {
    /// Observations within a cluster are treated as uncorrelated.
    Independence,
    /// Every pair within a cluster shares one correlation parameter.
    Exchangeable,
}

impl fmt::Display for CovStructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CovStructKind::Independence => write!(f, "Independence"),
            CovStructKind::Exchangeable => write!(f, "Exchangeable"),
        }
    }
}

/// A working correlation structure together with its dependence parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CovStruct {
    Independence,
    Exchangeable { dep_param: f64 },
}

impl CovStruct {
    /// Fresh structure with no estimated dependence.
    pub fn new(kind: CovStructKind) -> Self {
        match kind {
            CovStructKind::Independence => CovStruct::Independence,
            CovStructKind::Exchangeable => CovStruct::Exchangeable { dep_param: 0.0 },
        }
    }

    pub fn kind(&self) -> CovStructKind {
        match self {
            CovStruct::Independence => CovStructKind::Independence,
            CovStruct::Exchangeable { .. } => CovStructKind::Exchangeable,
        }
    }

    /// Estimated dependence parameter, if the structure has one.
    pub fn dep_param(&self) -> Option<f64> {
        match self {
            CovStruct::Independence => None,
            CovStruct::Exchangeable { dep_param } => Some(*dep_param),
        }
    }

    /// Re-estimate the dependence parameter from per-cluster Pearson residuals.
    ///
    /// `ddof` is the number of mean parameters. The exchangeable estimator is
    /// the moment estimator of the common pairwise correlation, with the
    /// Pearson scale and the pair count both corrected by `ddof`.
    pub fn update(&mut self, pearson_resid: &[DVector<f64>], ddof: usize) -> Result<()> {
        let CovStruct::Exchangeable { dep_param } = self else {
            return Ok(());
        };

        let mut ssr_total = 0.0;
        let mut cross_total = 0.0;
        let mut n_obs = 0usize;
        let mut n_pairs = 0.0;

        for r in pearson_resid {
            let ssr = r.norm_squared();
            let sum = r.sum();
            ssr_total += ssr;
            cross_total += (sum * sum - ssr) / 2.0;
            n_obs += r.len();
            let k = r.len() as f64;
            n_pairs += 0.5 * k * (k - 1.0);
        }

        let ddof = ddof as f64;
        if (n_obs as f64) <= ddof || n_pairs <= ddof {
            return Err(SimError::Numerical(format!(
                "too few observations ({}) or within-cluster pairs ({}) to estimate exchangeable correlation",
                n_obs, n_pairs
            )));
        }

        let scale = ssr_total / (n_obs as f64 - ddof);
        if !(scale > 0.0) {
            return Err(SimError::Numerical(
                "Pearson scale is zero while updating exchangeable correlation".to_string(),
            ));
        }
        *dep_param = cross_total / scale / (n_pairs - ddof);
        Ok(())
    }

    /// Apply V⁻¹ to every column of `rhs`, where V = S·R·S with S = diag(`sdev`)
    /// and R the working correlation of a cluster of `sdev.len()` members.
    pub fn solve(&self, sdev: &DVector<f64>, rhs: &DMatrix<f64>) -> DMatrix<f64> {
        let k = sdev.len();
        let mut out = rhs.clone();

        match *self {
            CovStruct::Independence => {
                for mut col in out.column_iter_mut() {
                    for i in 0..k {
                        col[i] /= sdev[i] * sdev[i];
                    }
                }
            }
            CovStruct::Exchangeable { dep_param: a } => {
                // R⁻¹ = I / (1 - a) - c·J with c = a / ((1 - a)(1 + (k-1)a))
                let c = a / (1.0 - a) / (1.0 + a * (k as f64 - 1.0));
                for mut col in out.column_iter_mut() {
                    let mut total = 0.0;
                    for i in 0..k {
                        col[i] /= sdev[i];
                        total += col[i];
                    }
                    for i in 0..k {
                        col[i] = (col[i] / (1.0 - a) - c * total) / sdev[i];
                    }
                }
            }
        }

        out
    }
}
