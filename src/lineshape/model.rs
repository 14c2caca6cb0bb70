//! The multi-signal lattice model evaluated by the optimizers.

use ndarray::{Array1, Array2, Axis};

use crate::error::{PeakFitError, Result};
use crate::parameters::{KineticsKind, ParameterLayout};
use crate::problem::Problem;
use crate::uncertainty::Resample;

use super::kinetics::{exp_decay, zz_amplitude, zz_amplitude2, ExchangeRole};
use super::shape::LineShape;

/// Observed intensities at lattice points of one fit window.
///
/// Each row holds the point's coordinates relative to the window origin, the
/// delay of the plane it was read from, the observed value and optionally its
/// measurement error.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeData {
    coords: Array2<f64>,
    delays: Array1<f64>,
    values: Array1<f64>,
    errors: Option<Array1<f64>>,
}

impl LatticeData {
    /// Create lattice data.
    ///
    /// # Arguments
    ///
    /// * `coords` - One row per point, one column per dimension
    /// * `delays` - Delay of each point's plane (zero for single-plane fits)
    /// * `values` - Observed intensities
    /// * `errors` - Optional positive measurement errors
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` when the row counts disagree
    /// * `InvalidInput` for non-positive errors
    pub fn new(
        coords: Array2<f64>,
        delays: Array1<f64>,
        values: Array1<f64>,
        errors: Option<Array1<f64>>,
    ) -> Result<Self> {
        let n = coords.nrows();
        if delays.len() != n || values.len() != n {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Lattice data has {} coordinate rows, {} delays and {} values",
                n,
                delays.len(),
                values.len()
            )));
        }
        if let Some(errors) = &errors {
            if errors.len() != n {
                return Err(PeakFitError::DimensionMismatch(format!(
                    "Lattice data has {} rows but {} errors",
                    n,
                    errors.len()
                )));
            }
            if errors.iter().any(|e| !(*e > 0.0)) {
                return Err(PeakFitError::InvalidInput(
                    "Measurement errors must be positive".to_string(),
                ));
            }
        }
        Ok(Self {
            coords,
            delays,
            values,
            errors,
        })
    }

    /// Single-plane data without errors.
    pub fn single_plane(coords: Array2<f64>, values: Array1<f64>) -> Result<Self> {
        let delays = Array1::zeros(coords.nrows());
        Self::new(coords, delays, values, None)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn n_dims(&self) -> usize {
        self.coords.ncols()
    }

    pub fn coords(&self) -> &Array2<f64> {
        &self.coords
    }

    pub fn delays(&self) -> &Array1<f64> {
        &self.delays
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn errors(&self) -> Option<&Array1<f64>> {
        self.errors.as_ref()
    }

    /// Largest absolute observed value.
    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }
}

impl Resample for LatticeData {
    fn sample_count(&self) -> usize {
        self.len()
    }

    fn resample(&self, indices: &[usize]) -> Self {
        Self {
            coords: self.coords.select(Axis(0), indices),
            delays: self.delays.select(Axis(0), indices),
            values: self.values.select(Axis(0), indices),
            errors: self.errors.as_ref().map(|e| e.select(Axis(0), indices)),
        }
    }
}

/// Baseline plus a sum of separable signals, evaluated at every data row.
#[derive(Debug, Clone)]
pub struct LatticeModel {
    layout: ParameterLayout,
    shapes: Vec<LineShape>,
    data: LatticeData,
    weighted: bool,
}

impl LatticeModel {
    /// Create a model over `data`.
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` when the layout, shapes and data disagree on the
    ///   number of dimensions
    pub fn new(layout: ParameterLayout, shapes: Vec<LineShape>, data: LatticeData) -> Result<Self> {
        if shapes.len() != layout.n_dims() || data.n_dims() != layout.n_dims() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Layout has {} dimensions, {} shapes given, data has {} dimensions",
                layout.n_dims(),
                shapes.len(),
                data.n_dims()
            )));
        }
        Ok(Self {
            layout,
            shapes,
            data,
            weighted: false,
        })
    }

    /// Divide residuals by the measurement errors when the data carry them.
    pub fn with_weighting(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    pub fn data(&self) -> &LatticeData {
        &self.data
    }

    /// Same model over different data (used for bootstrap resamples).
    pub fn with_data(&self, data: LatticeData) -> Self {
        Self {
            layout: self.layout.clone(),
            shapes: self.shapes.clone(),
            data,
            weighted: self.weighted,
        }
    }

    /// Amplitude of `signal` at `delay` under the layout's kinetics.
    pub fn signal_amplitude(&self, params: &Array1<f64>, signal: usize, delay: f64) -> f64 {
        let amplitude = params[self.layout.amplitude(signal)];
        match self.layout.kinetics() {
            KineticsKind::None => amplitude,
            KineticsKind::Decay => match (self.layout.decay_rate(signal), self.layout.decay_floor(signal)) {
                (Some(rate), Some(floor)) => exp_decay(amplitude, params[rate], params[floor], delay),
                _ => amplitude,
            },
            KineticsKind::Exchange => {
                let p = |i: usize| self.layout.exchange(i).map_or(0.0, |idx| params[idx]);
                amplitude * zz_amplitude(p(0), p(1), p(2), delay, ExchangeRole::from_index(signal))
            }
            KineticsKind::GeneralExchange => {
                let p = |i: usize| self.layout.exchange(i).map_or(0.0, |idx| params[idx]);
                amplitude
                    * zz_amplitude2(
                        p(0),
                        p(1),
                        p(2),
                        p(3),
                        p(4),
                        delay,
                        ExchangeRole::from_index(signal),
                    )
            }
        }
    }

    /// Contribution of one signal at data row `row`.
    pub fn signal_intensity(&self, params: &Array1<f64>, signal: usize, row: usize) -> f64 {
        let mut value = self.signal_amplitude(params, signal, self.data.delays[row]);
        for (dim, shape) in self.shapes.iter().enumerate() {
            let width = params[self.layout.width(signal, dim)];
            let position = params[self.layout.position(signal, dim)];
            value *= shape.eval(self.data.coords[[row, dim]] - position, width);
        }
        value
    }

    /// Predicted intensity at every data row.
    pub fn predict(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != self.layout.len() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.layout.len(),
                params.len()
            )));
        }
        let baseline = params[self.layout.baseline()];
        Ok(Array1::from_iter((0..self.data.len()).map(|row| {
            baseline
                + (0..self.layout.n_signals())
                    .map(|signal| self.signal_intensity(params, signal, row))
                    .sum::<f64>()
        })))
    }
}

impl Problem for LatticeModel {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let mut residuals = self.predict(params)? - &self.data.values;
        if self.weighted {
            if let Some(errors) = &self.data.errors {
                residuals /= errors;
            }
        }
        Ok(residuals)
    }

    fn parameter_count(&self) -> usize {
        self.layout.len()
    }

    fn residual_count(&self) -> usize {
        self.data.len()
    }
}
