//! # Curve Fitting
//!
//! One-dimensional kinetic models fit through the same optimization and
//! bootstrap machinery as lattice fits. Each equation defines its parameter
//! names, the number of dependent channels, a guess heuristic from simple data
//! statistics, and a closed-form prediction. Residuals are taken over all
//! channels at once.
//!
//! ## Example Usage
//!
//! ```rust
//! use peakfit_rs::curve::{CurveData, CurveFitter, ExpDecay};
//! use ndarray::Array2;
//!
//! let x = Array2::from_shape_fn((12, 1), |(i, _)| i as f64 * 0.25);
//! let y = x.mapv(|t| 40.0 * (-1.2 * t).exp());
//! let data = CurveData::new(x, y, None).unwrap();
//!
//! let fit = CurveFitter::new(ExpDecay::default()).fit(&data).unwrap().unwrap();
//! assert!((fit.value("r").unwrap() - 1.2).abs() < 1e-3);
//! ```

pub mod equations;

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::error::{PeakFitError, Result};
use crate::optimizer::{OptimizationEngine, OptimizerConfig};
use crate::parameters::{ParameterGuess, ParameterSpace};
use crate::problem::{CostMode, Problem};
use crate::uncertainty::{BootstrapConfig, BootstrapEstimator, BootstrapResult, Resample};

pub use equations::{ExchangeRatio, ExpDecay, TwoStateReaction, ZzExchange};

/// A closed-form model of one or more dependent channels.
pub trait CurveEquation: Send + Sync {
    /// Short identifier of the equation.
    fn name(&self) -> &'static str;

    /// Names of the parameters, in vector order.
    fn parameter_names(&self) -> Vec<&'static str>;

    /// Number of independent variables per point.
    fn n_x(&self) -> usize {
        1
    }

    /// Number of dependent channels per point.
    fn n_y(&self) -> usize;

    /// Starting values and bounds derived from the data.
    fn guess(&self, data: &CurveData) -> Result<Vec<ParameterGuess>>;

    /// Predicted value of every channel at `x`.
    fn predict(&self, x: ArrayView1<f64>, params: &Array1<f64>) -> Vec<f64>;
}

/// Points of a curve: independent values, dependent channels, optional errors.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveData {
    x: Array2<f64>,
    y: Array2<f64>,
    err: Option<Array2<f64>>,
}

impl CurveData {
    /// Create curve data with one row per point.
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` when row counts or error shape disagree
    /// * `InvalidInput` for empty data or non-positive errors
    pub fn new(x: Array2<f64>, y: Array2<f64>, err: Option<Array2<f64>>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "{} x rows but {} y rows",
                x.nrows(),
                y.nrows()
            )));
        }
        if x.nrows() == 0 {
            return Err(PeakFitError::InvalidInput("Empty curve data".to_string()));
        }
        if let Some(err) = &err {
            if err.shape() != y.shape() {
                return Err(PeakFitError::DimensionMismatch(format!(
                    "Error shape {:?} differs from y shape {:?}",
                    err.shape(),
                    y.shape()
                )));
            }
            if err.iter().any(|e| !(*e > 0.0)) {
                return Err(PeakFitError::InvalidInput(
                    "Curve errors must be positive".to_string(),
                ));
            }
        }
        Ok(Self { x, y, err })
    }

    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array2<f64> {
        &self.y
    }

    pub fn err(&self) -> Option<&Array2<f64>> {
        self.err.as_ref()
    }

    /// First independent variable and channel `channel`, sorted by x.
    pub fn sorted_channel(&self, channel: usize) -> Result<(Array1<f64>, Array1<f64>)> {
        if channel >= self.y.ncols() || self.x.ncols() == 0 {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Channel {} requested from data with {} channels",
                channel,
                self.y.ncols()
            )));
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.x[[a, 0]].total_cmp(&self.x[[b, 0]]));
        let x = order.iter().map(|&i| self.x[[i, 0]]).collect();
        let y = order.iter().map(|&i| self.y[[i, channel]]).collect();
        Ok((x, y))
    }
}

impl Resample for CurveData {
    fn sample_count(&self) -> usize {
        self.len()
    }

    fn resample(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
            err: self.err.as_ref().map(|e| e.select(Axis(0), indices)),
        }
    }
}

/// Residuals of an equation against curve data, over all channels.
pub struct CurveProblem<'a, E: CurveEquation + ?Sized> {
    equation: &'a E,
    data: CurveData,
}

impl<'a, E: CurveEquation + ?Sized> CurveProblem<'a, E> {
    /// # Errors
    ///
    /// * `DimensionMismatch` when the data shape does not match the equation
    pub fn new(equation: &'a E, data: CurveData) -> Result<Self> {
        if data.x.ncols() != equation.n_x() || data.y.ncols() != equation.n_y() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "{} expects {} x and {} y columns, data have {} and {}",
                equation.name(),
                equation.n_x(),
                equation.n_y(),
                data.x.ncols(),
                data.y.ncols()
            )));
        }
        Ok(Self { equation, data })
    }
}

impl<'a, E: CurveEquation + ?Sized> Problem for CurveProblem<'a, E> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let n_y = self.equation.n_y();
        let mut residuals = Array1::zeros(self.data.len() * n_y);
        for (row, x) in self.data.x.axis_iter(Axis(0)).enumerate() {
            let predicted = self.equation.predict(x, params);
            for (channel, p) in predicted.into_iter().enumerate().take(n_y) {
                let mut r = p - self.data.y[[row, channel]];
                if let Some(err) = &self.data.err {
                    r /= err[[row, channel]];
                }
                residuals[row * n_y + channel] = r;
            }
        }
        Ok(residuals)
    }

    fn parameter_count(&self) -> usize {
        self.equation.parameter_names().len()
    }

    fn residual_count(&self) -> usize {
        self.data.len() * self.equation.n_y()
    }
}

/// Best-fit parameters of a curve equation.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveFit {
    pub names: Vec<&'static str>,
    pub values: Array1<f64>,

    /// Objective value at `values`
    pub objective: f64,
}

impl CurveFit {
    /// Value of the parameter called `name`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }
}

/// Fits a [`CurveEquation`] with multi-start optimization and bootstraps it.
#[derive(Debug, Clone)]
pub struct CurveFitter<E: CurveEquation> {
    equation: E,
    optimizer: OptimizerConfig,
    n_tries: usize,
    bootstrap: BootstrapConfig,
}

impl<E: CurveEquation> CurveFitter<E> {
    /// Create a fitter with four restarts and squared residuals.
    pub fn new(equation: E) -> Self {
        Self {
            equation,
            optimizer: OptimizerConfig::default().with_cost_mode(CostMode::MeanSquared),
            n_tries: 4,
            bootstrap: BootstrapConfig::default(),
        }
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_cost_mode(mut self, mode: CostMode) -> Self {
        self.optimizer.cost_mode = mode;
        self
    }

    pub fn with_tries(mut self, n_tries: usize) -> Self {
        self.n_tries = n_tries.max(1);
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn equation(&self) -> &E {
        &self.equation
    }

    fn space(&self, data: &CurveData) -> Result<ParameterSpace> {
        let guesses = self.equation.guess(data)?;
        equations::check_guesses(&self.equation, &guesses)?;
        ParameterSpace::new(guesses, Vec::new())
    }

    /// Fit the equation to `data`, keeping the best of the configured tries.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` when every try failed numerically
    pub fn fit(&self, data: &CurveData) -> Result<Option<CurveFit>> {
        let problem = CurveProblem::new(&self.equation, data.clone())?;
        let space = self.space(data)?;
        let engine = OptimizationEngine::new(self.optimizer.clone());
        let fitted = engine.fit_with_restarts(&problem, &space, self.n_tries)?;
        Ok(fitted.map(|f| {
            debug!(
                "{}: objective {:.6e} after {} evaluations",
                self.equation.name(),
                f.value,
                f.evaluations
            );
            CurveFit {
                names: self.equation.parameter_names(),
                values: f.point,
                objective: f.value,
            }
        }))
    }

    /// Bootstrap a fit of `data` starting from `fit`.
    pub fn bootstrap(&self, data: &CurveData, fit: &CurveFit) -> Result<Option<BootstrapResult>> {
        let space = self.space(data)?;
        let engine = OptimizationEngine::new(self.optimizer.clone());
        BootstrapEstimator::new(self.bootstrap.clone()).estimate(
            data,
            |sample| CurveProblem::new(&self.equation, sample),
            &space,
            &fit.values,
            &engine,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_residuals_cover_all_channels() {
        let eq = TwoStateReaction;
        let data = CurveData::new(array![[0.0], [1.0]], array![[1.0, 0.0], [0.5, 0.5]], None).unwrap();
        let problem = CurveProblem::new(&eq, data).unwrap();
        assert_eq!(problem.residual_count(), 4);
        let r = problem.eval(&array![1.0, 1.0, 0.0]).unwrap();
        assert_eq!(r, array![0.0, 0.0, 0.5, -0.5]);
    }

    #[test]
    fn test_shape_mismatch() {
        let data = CurveData::new(array![[0.0], [1.0]], array![[1.0], [0.5]], None).unwrap();
        assert!(CurveProblem::new(&TwoStateReaction, data).is_err());
        assert!(CurveData::new(array![[0.0]], array![[1.0], [0.5]], None).is_err());
    }

    #[test]
    fn test_sorted_channel() {
        let data = CurveData::new(array![[2.0], [0.0], [1.0]], array![[3.0], [1.0], [2.0]], None).unwrap();
        let (x, y) = data.sorted_channel(0).unwrap();
        assert_eq!(x, array![0.0, 1.0, 2.0]);
        assert_eq!(y, array![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_fit_exp_decay_with_floor() {
        let x = Array2::from_shape_fn((15, 1), |(i, _)| i as f64 * 0.2);
        let y = x.mapv(|t| (30.0 - 4.0) * (-2.0 * t).exp() + 4.0);
        let data = CurveData::new(x, y, None).unwrap();
        let fit = CurveFitter::new(ExpDecay { with_floor: true })
            .fit(&data)
            .unwrap()
            .unwrap();
        assert_relative_eq!(fit.value("a").unwrap(), 30.0, epsilon = 1e-3);
        assert_relative_eq!(fit.value("r").unwrap(), 2.0, epsilon = 1e-3);
        assert_relative_eq!(fit.value("c").unwrap(), 4.0, epsilon = 1e-3);
    }
}
