//! Robust score test for nested GEE mean models.
//!
//! The test only needs the submodel fit. The full model's estimating
//! equations are evaluated at the submodel estimate embedded in the full
//! parameter space; the components orthogonal to the submodel design form the
//! score. Its covariance is the sandwich form, so the test stays valid when
//! the working correlation or the variance function is misspecified.

use crate::error::{SimError, Result};
use crate::model::gee::{GeeFit, GeeModel};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Singular values below this are treated as zero.
const RANK_TOL: f64 = 1e-12;

/// Largest residual allowed when projecting the submodel design onto the full one.
const NESTING_TOL: f64 = 1e-8;

/// Result of a score test comparing nested models.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreTestResult {
    /// Score statistic, asymptotically χ²(df) under the submodel.
    pub statistic: f64,
    /// Degrees of freedom (rank difference between the designs).
    pub df: usize,
    /// P-value from the chi-squared distribution.
    pub p_value: f64,
}

/// Coordinates of the submodel inside the full model.
///
/// `qm` maps submodel parameters into the full parameter space
/// (X_full · qm = X_sub) and `qc` spans the part of the full column space
/// orthogonal to the submodel (X_full · qc ⟂ X_sub).
struct NestedProjection {
    qm: DMatrix<f64>,
    qc: DMatrix<f64>,
}

fn nested_projection(x_full: &DMatrix<f64>, x_sub: &DMatrix<f64>) -> Result<NestedProjection> {
    let svd = x_full.clone().svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(SimError::Numerical(
                "SVD of the full design did not return singular vectors".to_string(),
            ))
        }
    };
    let s = svd.singular_values;

    let keep: Vec<usize> = (0..s.len()).filter(|&i| s[i].abs() > RANK_TOL).collect();

    // Orthogonal complement of col(X_sub) inside col(X_full).
    let q_sub = x_sub.clone().qr().q();
    let resid = &u - &q_sub * (q_sub.transpose() * &u);
    let svd_resid = resid.svd(true, false);
    let u_resid = svd_resid.u.ok_or_else(|| {
        SimError::Numerical("SVD of the complement did not return singular vectors".to_string())
    })?;
    let comp: Vec<usize> = (0..svd_resid.singular_values.len())
        .filter(|&i| svd_resid.singular_values[i] > RANK_TOL)
        .collect();
    let x_comp = u_resid.select_columns(comp.iter());

    // Pseudo-inverse of X_full restricted to its numerical rank.
    let u_k = u.select_columns(keep.iter());
    let v_k = v_t.select_rows(keep.iter()).transpose();
    let s_inv = DMatrix::from_diagonal(&DVector::from_iterator(
        keep.len(),
        keep.iter().map(|&i| 1.0 / s[i]),
    ));
    let pinv = v_k * s_inv * u_k.transpose();

    let qm = &pinv * x_sub;
    let residual = (x_sub - x_full * &qm).amax();
    if residual > NESTING_TOL {
        return Err(SimError::NotNested { residual });
    }
    let qc = &pinv * x_comp;

    Ok(NestedProjection { qm, qc })
}

/// Score test of `full` against the fitted submodel.
///
/// `sub_model` must use a design whose columns lie in the span of the full
/// design, over the same observations. The working structure (with its
/// fitted dependence parameter) and scale method are taken from `sub_fit`.
pub fn compare_score_test(
    full: &GeeModel,
    sub_model: &GeeModel,
    sub_fit: &GeeFit,
) -> Result<ScoreTestResult> {
    if full.n_obs() != sub_model.n_obs() {
        return Err(SimError::DimensionMismatch {
            expected: full.n_obs(),
            actual: sub_model.n_obs(),
        });
    }
    if full.n_coefficients() <= sub_model.n_coefficients() {
        return Err(SimError::InvalidParameter(format!(
            "full model has {} coefficients, submodel has {}; nothing to test",
            full.n_coefficients(),
            sub_model.n_coefficients()
        )));
    }
    if sub_fit.coefficients.len() != sub_model.n_coefficients() {
        return Err(SimError::DimensionMismatch {
            expected: sub_model.n_coefficients(),
            actual: sub_fit.coefficients.len(),
        });
    }
    if full.cov_kind() != sub_fit.cov_struct.kind() {
        log::warn!(
            "score test: full model uses {} but submodel was fit with {}",
            full.cov_kind(),
            sub_fit.cov_struct.kind()
        );
    }

    let NestedProjection { qm, qc } =
        nested_projection(full.design().matrix(), sub_model.design().matrix())?;

    let beta_ex = &qm * DVector::from_column_slice(&sub_fit.coefficients);
    let sums = full.cluster_sums(&beta_ex, &sub_fit.cov_struct);
    let scale = full.scale_at(&beta_ex, sub_fit.scale_method);

    let amat = &sums.bmat / scale;
    let cmat = &sums.cmat / (scale * scale);
    let score = qc.transpose() * &sums.score / scale;

    let b11 = qm.transpose() * &cmat * &qm;
    let b22 = qc.transpose() * &cmat * &qc;
    let b12 = qm.transpose() * &cmat * &qc;
    let a11 = qm.transpose() * &amat * &qm;
    let a12 = qm.transpose() * &amat * &qc;

    let a11_inv = a11.try_inverse().ok_or_else(|| {
        SimError::Numerical("Singular matrix encountered in GEE score test".to_string())
    })?;

    // Var(score) under the submodel with the nuisance parameters estimated.
    let score_cov = &b22 - a12.transpose() * &a11_inv * &b12 - b12.transpose() * &a11_inv * &a12
        + a12.transpose() * &a11_inv * &b11 * &a11_inv * &a12;

    let solved = score_cov.lu().solve(&score).ok_or_else(|| {
        SimError::Numerical("Singular score covariance in GEE score test".to_string())
    })?;
    let statistic = score.dot(&solved);
    let df = qc.ncols();

    let chi_sq = ChiSquared::new(df as f64)
        .map_err(|e| SimError::InvalidParameter(format!("chi-squared with df={}: {}", df, e)))?;
    let p_value = if statistic.is_finite() {
        1.0 - chi_sq.cdf(statistic.max(0.0))
    } else {
        f64::NAN
    };

    Ok(ScoreTestResult {
        statistic,
        df,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DesignMatrix, Groups};
    use crate::model::cov_struct::CovStructKind;
    use crate::model::gee::ScaleMethod;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Poisson};

    fn poisson_response(design: &DesignMatrix, beta: &[f64], rng: &mut StdRng) -> Vec<f64> {
        design
            .mean_response(beta)
            .unwrap()
            .iter()
            .map(|&m| Poisson::new(m).unwrap().sample(rng))
            .collect()
    }

    #[test]
    fn test_nested_projection_leading_columns() {
        let mut rng = StdRng::seed_from_u64(4);
        let full = DesignMatrix::gaussian(100, 5, &mut rng).unwrap();
        let sub = full.leading_columns(3).unwrap();

        let proj = nested_projection(full.matrix(), sub.matrix()).unwrap();
        assert_eq!(proj.qm.shape(), (5, 3));
        assert_eq!(proj.qc.shape(), (5, 2));

        // qm selects the first three columns.
        for i in 0..5 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(proj.qm[(i, j)], expected, epsilon = 1e-8);
            }
        }

        // X·qc is orthogonal to the submodel columns.
        let xc = full.matrix() * &proj.qc;
        let cross = sub.matrix().transpose() * xc;
        assert!(cross.amax() < 1e-8);
    }

    #[test]
    fn test_nested_projection_rejects_non_nested() {
        let mut rng = StdRng::seed_from_u64(9);
        let full = DesignMatrix::gaussian(60, 3, &mut rng).unwrap();
        let other = DesignMatrix::gaussian(60, 2, &mut rng).unwrap();

        let result = nested_projection(full.matrix(), other.matrix());
        assert!(matches!(result, Err(SimError::NotNested { .. })));
    }

    #[test]
    fn test_score_test_detects_effect() {
        let mut rng = StdRng::seed_from_u64(31);
        let full = DesignMatrix::gaussian(800, 4, &mut rng).unwrap();
        let sub = full.leading_columns(2).unwrap();
        let groups = Groups::consecutive(800, 8).unwrap();
        let y = poisson_response(&full, &[1.0, 0.2, 0.3, -0.3], &mut rng);

        let m0 = GeeModel::new(&y, &sub, &groups, CovStructKind::Independence).unwrap();
        let m1 = GeeModel::new(&y, &full, &groups, CovStructKind::Independence).unwrap();
        let r0 = m0.fit(ScaleMethod::Pearson).unwrap();

        let st = compare_score_test(&m1, &m0, &r0).unwrap();
        assert_eq!(st.df, 2);
        assert!(st.statistic > 30.0, "statistic {}", st.statistic);
        assert!(st.p_value < 1e-6);
    }

    #[test]
    fn test_score_test_null_is_unremarkable() {
        let mut rng = StdRng::seed_from_u64(77);
        let full = DesignMatrix::gaussian(800, 4, &mut rng).unwrap();
        let sub = full.leading_columns(2).unwrap();
        let groups = Groups::consecutive(800, 8).unwrap();

        // Average over a handful of null datasets to keep the check stable.
        let mut rejections = 0;
        for _ in 0..20 {
            let y = poisson_response(&sub, &[1.0, 0.2], &mut rng);
            let m0 = GeeModel::new(&y, &sub, &groups, CovStructKind::Exchangeable).unwrap();
            let m1 = GeeModel::new(&y, &full, &groups, CovStructKind::Exchangeable).unwrap();
            let r0 = m0.fit(ScaleMethod::Pearson).unwrap();
            let st = compare_score_test(&m1, &m0, &r0).unwrap();
            assert!((0.0..=1.0).contains(&st.p_value));
            if st.p_value < 0.01 {
                rejections += 1;
            }
        }
        assert!(rejections <= 3, "{} of 20 null datasets rejected at 1%", rejections);
    }

    #[test]
    fn test_score_test_is_scale_invariant() {
        let mut rng = StdRng::seed_from_u64(12);
        let full = DesignMatrix::gaussian(300, 3, &mut rng).unwrap();
        let sub = full.leading_columns(2).unwrap();
        let groups = Groups::consecutive(300, 5).unwrap();
        let y = poisson_response(&full, &[1.2, 0.1, 0.15], &mut rng);

        let m0 = GeeModel::new(&y, &sub, &groups, CovStructKind::Independence).unwrap();
        let m1 = GeeModel::new(&y, &full, &groups, CovStructKind::Independence).unwrap();
        let r_pearson = m0.fit(ScaleMethod::Pearson).unwrap();
        let r_fixed = m0.fit(ScaleMethod::Fixed(1.0)).unwrap();

        let a = compare_score_test(&m1, &m0, &r_pearson).unwrap();
        let b = compare_score_test(&m1, &m0, &r_fixed).unwrap();
        assert_relative_eq!(a.statistic, b.statistic, max_relative = 1e-8);
    }

    #[test]
    fn test_score_test_requires_larger_full_model() {
        let mut rng = StdRng::seed_from_u64(2);
        let full = DesignMatrix::gaussian(100, 3, &mut rng).unwrap();
        let groups = Groups::consecutive(100, 5).unwrap();
        let y = poisson_response(&full, &[1.0, 0.0, 0.0], &mut rng);

        let m = GeeModel::new(&y, &full, &groups, CovStructKind::Independence).unwrap();
        let r = m.fit(ScaleMethod::Pearson).unwrap();
        assert!(compare_score_test(&m, &m, &r).is_err());
    }
}
