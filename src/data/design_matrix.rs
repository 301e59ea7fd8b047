//! Design matrices for the nested mean models.

use crate::error::{SimError, Result};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

/// A design matrix for GEE mean models.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// The design matrix (observations × coefficients).
    matrix: DMatrix<f64>,
    /// Names of the coefficients (columns).
    coefficient_names: Vec<String>,
}

impl DesignMatrix {
    /// Create a design matrix directly from components.
    pub fn from_matrix(matrix: DMatrix<f64>, coefficient_names: Vec<String>) -> Result<Self> {
        if coefficient_names.len() != matrix.ncols() {
            return Err(SimError::DimensionMismatch {
                expected: matrix.ncols(),
                actual: coefficient_names.len(),
            });
        }
        Ok(Self {
            matrix,
            coefficient_names,
        })
    }

    /// Draw an `n_obs × n_coef` design whose first column is the intercept
    /// and whose remaining columns are i.i.d. standard normal.
    pub fn gaussian<R: Rng + ?Sized>(n_obs: usize, n_coef: usize, rng: &mut R) -> Result<Self> {
        if n_obs == 0 || n_coef == 0 {
            return Err(SimError::EmptyData(format!(
                "design must have at least one row and column, got {}x{}",
                n_obs, n_coef
            )));
        }

        // Column-major fill keeps the draw order column by column.
        let mut matrix = DMatrix::zeros(n_obs, n_coef);
        for j in 0..n_coef {
            for i in 0..n_obs {
                matrix[(i, j)] = if j == 0 {
                    1.0
                } else {
                    rng.sample::<f64, _>(StandardNormal)
                };
            }
        }

        let coefficient_names = (0..n_coef)
            .map(|j| {
                if j == 0 {
                    "(Intercept)".to_string()
                } else {
                    format!("x{}", j)
                }
            })
            .collect();

        Ok(Self {
            matrix,
            coefficient_names,
        })
    }

    /// The submodel spanned by the first `k` columns.
    pub fn leading_columns(&self, k: usize) -> Result<Self> {
        if k == 0 || k > self.n_coefficients() {
            return Err(SimError::InvalidParameter(format!(
                "cannot take {} leading columns of a {}-column design",
                k,
                self.n_coefficients()
            )));
        }
        Ok(Self {
            matrix: self.matrix.columns(0, k).into_owned(),
            coefficient_names: self.coefficient_names[..k].to_vec(),
        })
    }

    /// Linear predictor X·β.
    pub fn linear_predictor(&self, beta: &[f64]) -> Result<DVector<f64>> {
        if beta.len() != self.n_coefficients() {
            return Err(SimError::DimensionMismatch {
                expected: self.n_coefficients(),
                actual: beta.len(),
            });
        }
        Ok(&self.matrix * DVector::from_column_slice(beta))
    }

    /// Mean vector exp(X·β) under the log link.
    pub fn mean_response(&self, beta: &[f64]) -> Result<Vec<f64>> {
        Ok(self.linear_predictor(beta)?.iter().map(|e| e.exp()).collect())
    }

    /// Get the design matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Get coefficient names.
    pub fn coefficient_names(&self) -> &[String] {
        &self.coefficient_names
    }

    /// Number of observations (rows).
    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of coefficients (columns).
    pub fn n_coefficients(&self) -> usize {
        self.matrix.ncols()
    }
}
