//! Problem definition trait and objective reduction.
//!
//! This module defines the `Problem` trait, which represents a model evaluated
//! against observed data over a full physical parameter vector. Both the
//! lattice lineshape model and the 1-D curve equations implement it, so they
//! share the same optimizers and bootstrap machinery.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How residuals are reduced to the scalar objective the optimizers minimize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostMode {
    /// `Σ|r| / (N - n_free)`. Robust against intensity outliers near strong
    /// or overlapping peaks.
    #[default]
    AbsoluteDeviation,

    /// `Σr² / (N - n_free)`.
    MeanSquared,
}

impl CostMode {
    /// Reduce a residual vector to a scalar normalized by degrees of freedom.
    ///
    /// # Arguments
    ///
    /// * `residuals` - Predicted minus observed values (optionally weighted)
    /// * `n_free` - Number of floating parameters
    ///
    /// # Returns
    ///
    /// * The objective value
    pub fn reduce(&self, residuals: &Array1<f64>, n_free: usize) -> f64 {
        let dof = residuals.len().saturating_sub(n_free).max(1) as f64;
        let sum: f64 = match self {
            CostMode::AbsoluteDeviation => residuals.iter().map(|r| r.abs()).sum(),
            CostMode::MeanSquared => residuals.iter().map(|r| r * r).sum(),
        };
        sum / dof
    }
}

/// A trait representing a model evaluated against observed data.
pub trait Problem {
    /// Evaluate the residuals (predicted minus observed) at the given
    /// physical parameter values.
    ///
    /// # Arguments
    ///
    /// * `params` - The full parameter vector, including fixed entries
    ///
    /// # Returns
    ///
    /// * A vector of residuals, or an error if the evaluation fails
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the full parameter vector.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the scalar objective at the given parameters.
    fn eval_cost(&self, params: &Array1<f64>, mode: CostMode, n_free: usize) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(mode.reduce(&residuals, n_free))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_reduce_absolute_deviation() {
        let residuals = array![1.0, -2.0, 3.0, -4.0];
        let value = CostMode::AbsoluteDeviation.reduce(&residuals, 2);
        assert_relative_eq!(value, 10.0 / 2.0);
    }

    #[test]
    fn test_reduce_mean_squared() {
        let residuals = array![1.0, -2.0, 3.0];
        let value = CostMode::MeanSquared.reduce(&residuals, 0);
        assert_relative_eq!(value, 14.0 / 3.0);
    }

    #[test]
    fn test_reduce_never_divides_by_zero() {
        let residuals = array![1.0, 1.0];
        let value = CostMode::AbsoluteDeviation.reduce(&residuals, 5);
        assert_relative_eq!(value, 2.0);
    }
}
