//! Precomputed lineshape tables.
//!
//! A [`TabulatedShape`] samples a unit-height shape on a uniform grid of
//! offsets expressed in linewidths, `u = (x - position) / width`, and
//! interpolates linearly between samples. A [`LineshapeCatalog`] holds one
//! table per spectral dimension; lattice fits that use one run the
//! trust-region optimizer instead of the population search.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PeakFitError, Result};

use super::shape::LineShape;

/// A unit-height shape sampled on a uniform grid of width-scaled offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabulatedShape {
    start: f64,
    step: f64,
    values: Vec<f64>,
}

impl TabulatedShape {
    /// Build a table from samples at `start + i * step`.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` with fewer than two samples, a non-positive step, or
    ///   non-finite values
    pub fn new(start: f64, step: f64, values: Vec<f64>) -> Result<Self> {
        if values.len() < 2 {
            return Err(PeakFitError::InvalidInput(
                "A lineshape table needs at least two samples".to_string(),
            ));
        }
        if !(step > 0.0) || !start.is_finite() {
            return Err(PeakFitError::InvalidInput(format!(
                "Invalid lineshape table grid: start {}, step {}",
                start, step
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PeakFitError::InvalidInput(
                "Lineshape table contains non-finite values".to_string(),
            ));
        }
        Ok(Self {
            start,
            step,
            values,
        })
    }

    /// Sample `shape(u)` on `samples` points spanning `[-half_range, half_range]`.
    pub fn from_fn<F: Fn(f64) -> f64>(shape: F, half_range: f64, samples: usize) -> Result<Self> {
        if samples < 2 || !(half_range > 0.0) {
            return Err(PeakFitError::InvalidInput(format!(
                "Cannot tabulate {} samples over half range {}",
                samples, half_range
            )));
        }
        let step = 2.0 * half_range / (samples - 1) as f64;
        let values = (0..samples)
            .map(|i| shape(-half_range + i as f64 * step))
            .collect();
        Self::new(-half_range, step, values)
    }

    /// Interpolated value at width-scaled offset `u`; zero outside the table.
    pub fn eval(&self, u: f64) -> f64 {
        let pos = (u - self.start) / self.step;
        let last = self.values.len() - 1;
        // Range-checked before the cast
        if !(pos >= 0.0) || pos > last as f64 {
            return 0.0;
        }
        if pos == last as f64 {
            return self.values[last];
        }
        let i = pos.floor() as usize;
        let frac = pos - i as f64;
        self.values[i] * (1.0 - frac) + self.values[i + 1] * frac
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One tabulated shape per spectral dimension.
#[derive(Debug, Clone, Default)]
pub struct LineshapeCatalog {
    shapes: Vec<Arc<TabulatedShape>>,
}

impl LineshapeCatalog {
    pub fn new(shapes: Vec<TabulatedShape>) -> Self {
        Self {
            shapes: shapes.into_iter().map(Arc::new).collect(),
        }
    }

    /// Number of dimensions covered.
    pub fn dimension_count(&self) -> usize {
        self.shapes.len()
    }

    /// Line shapes for a model over `n_dims` dimensions.
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` when the catalog covers a different number of dimensions
    pub fn shapes(&self, n_dims: usize) -> Result<Vec<LineShape>> {
        if self.shapes.len() != n_dims {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Lineshape catalog covers {} dimensions, data has {}",
                self.shapes.len(),
                n_dims
            )));
        }
        Ok(self
            .shapes
            .iter()
            .map(|s| LineShape::Tabulated(Arc::clone(s)))
            .collect())
    }
}
