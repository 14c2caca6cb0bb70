//! Bounded parameter guesses and the linear normalization used by the optimizers.
//!
//! Every floating parameter is mapped linearly from `[lower, upper]` onto
//! `[0, 100]`. The optimizers only ever see this normalized space, which keeps
//! step sizes comparable between amplitudes in the millions and linewidths of
//! a few lattice points.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{PeakFitError, Result};

/// Width of the normalized parameter space.
pub const NORMALIZED_SPAN: f64 = 100.0;

/// Lowest normalized starting value handed to an optimizer.
pub const GUESS_FLOOR: f64 = 2.0;

/// Highest normalized starting value handed to an optimizer.
pub const GUESS_CEILING: f64 = 98.0;

/// Initial value, bounds and floating flag of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterGuess {
    /// Starting value (and the fixed value when not floating)
    pub value: f64,

    /// Lower bound
    pub lower: f64,

    /// Upper bound
    pub upper: f64,

    /// Whether the optimizer may vary this parameter
    pub floating: bool,
}

impl ParameterGuess {
    /// Create a floating guess.
    ///
    /// # Examples
    ///
    /// ```
    /// use peakfit_rs::parameters::ParameterGuess;
    ///
    /// let guess = ParameterGuess::new(5.0, 0.0, 10.0);
    /// assert!(guess.floating);
    /// assert_eq!(guess.normalize(5.0), 50.0);
    /// ```
    pub fn new(value: f64, lower: f64, upper: f64) -> Self {
        Self {
            value,
            lower,
            upper,
            floating: true,
        }
    }

    /// Create a parameter held at `value`.
    pub fn fixed(value: f64) -> Self {
        Self {
            value,
            lower: value,
            upper: value,
            floating: false,
        }
    }

    /// Same bounds and value with the floating flag set to `floating`.
    pub fn with_floating(mut self, floating: bool) -> Self {
        self.floating = floating;
        self
    }

    /// Check the invariants of a floating parameter.
    ///
    /// Fixed parameters are always valid.
    pub fn validate(&self, index: usize) -> Result<()> {
        if !self.floating {
            return Ok(());
        }
        if !(self.lower.is_finite() && self.upper.is_finite()) || self.upper <= self.lower {
            return Err(PeakFitError::InvalidBounds {
                index,
                lower: self.lower,
                upper: self.upper,
            });
        }
        if !self.contains(self.value) {
            return Err(PeakFitError::ValueOutsideBounds {
                index,
                value: self.value,
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }

    /// Whether `value` lies inside `[lower, upper]`.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Map a physical value onto `[0, 100]`.
    ///
    /// Returns NaN when `upper == lower`; callers must only normalize
    /// parameters with a non-empty range.
    pub fn normalize(&self, value: f64) -> f64 {
        NORMALIZED_SPAN * (value - self.lower) / (self.upper - self.lower)
    }

    /// Map a normalized value back to physical units.
    pub fn denormalize(&self, normalized: f64) -> f64 {
        normalized * (self.upper - self.lower) / NORMALIZED_SPAN + self.lower
    }

    /// Clamp a physical value into the bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }
}

/// Normalize every parameter with its own bounds.
///
/// # Arguments
///
/// * `pars` - Physical parameter values
/// * `lower` - Lower bounds
/// * `upper` - Upper bounds
///
/// # Returns
///
/// * The normalized values, NaN wherever `upper == lower`
pub fn normalize(pars: &Array1<f64>, lower: &Array1<f64>, upper: &Array1<f64>) -> Array1<f64> {
    Array1::from_iter(
        pars.iter()
            .zip(lower.iter().zip(upper.iter()))
            .map(|(&p, (&lo, &hi))| NORMALIZED_SPAN * (p - lo) / (hi - lo)),
    )
}

/// Inverse of [`normalize`].
pub fn denormalize(
    normalized: &Array1<f64>,
    lower: &Array1<f64>,
    upper: &Array1<f64>,
) -> Array1<f64> {
    Array1::from_iter(
        normalized
            .iter()
            .zip(lower.iter().zip(upper.iter()))
            .map(|(&n, (&lo, &hi))| n * (hi - lo) / NORMALIZED_SPAN + lo),
    )
}

/// Clip normalized starting values to `[2, 98]`.
///
/// Starting exactly on the edge of the normalized box puts the first
/// population or interpolation set half outside the bounds.
pub fn clamp_guess(normalized: &mut Array1<f64>) {
    normalized.mapv_inplace(|v| v.max(GUESS_FLOOR).min(GUESS_CEILING));
}
