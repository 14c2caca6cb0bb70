//! The floating sub-space seen by the optimizers.

use std::cell::{Cell, RefCell};

use log::trace;
use ndarray::Array1;
use rand::Rng;

use crate::error::{PeakFitError, Result};
use crate::optimizer::Objective;
use crate::parameters::bounds::{clamp_guess, ParameterGuess};
use crate::parameters::sync::{apply_sync, SyncConstraint};
use crate::problem::{CostMode, Problem};

/// Guesses plus sync constraints for one fit invocation.
///
/// The optimizers work on the normalized values of the floating parameters
/// only. [`ParameterSpace::expand`] turns such a point back into the full
/// physical vector: fixed entries keep their value, floating entries are
/// denormalized, and then every sync constraint is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    guesses: Vec<ParameterGuess>,
    syncs: Vec<SyncConstraint>,
    free: Vec<usize>,
}

impl ParameterSpace {
    /// Validate the guesses and constraints and build the space.
    ///
    /// # Errors
    ///
    /// * `InvalidBounds` / `ValueOutsideBounds` for a bad floating guess
    /// * `DimensionMismatch` for a constraint index out of range
    /// * `InvalidConfig` when a constraint targets a floating parameter
    pub fn new(guesses: Vec<ParameterGuess>, syncs: Vec<SyncConstraint>) -> Result<Self> {
        for (i, guess) in guesses.iter().enumerate() {
            guess.validate(i)?;
        }
        for sync in &syncs {
            if sync.from >= guesses.len() || sync.to >= guesses.len() {
                return Err(PeakFitError::DimensionMismatch(format!(
                    "Sync constraint {} -> {} out of range for {} parameters",
                    sync.from,
                    sync.to,
                    guesses.len()
                )));
            }
            if guesses[sync.to].floating {
                return Err(PeakFitError::InvalidConfig(format!(
                    "Sync target {} must not be floating",
                    sync.to
                )));
            }
        }
        let free = guesses
            .iter()
            .enumerate()
            .filter(|(_, g)| g.floating)
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            guesses,
            syncs,
            free,
        })
    }

    /// Length of the full parameter vector.
    pub fn len(&self) -> usize {
        self.guesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guesses.is_empty()
    }

    /// Number of floating parameters.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn free_indices(&self) -> &[usize] {
        &self.free
    }

    pub fn guesses(&self) -> &[ParameterGuess] {
        &self.guesses
    }

    pub fn syncs(&self) -> &[SyncConstraint] {
        &self.syncs
    }

    /// Full physical vector of the current guess values, sync applied.
    pub fn values(&self) -> Array1<f64> {
        let mut values = Array1::from_iter(self.guesses.iter().map(|g| g.value));
        apply_sync(&mut values, &self.syncs);
        values
    }

    /// Normalized starting point of the floating parameters, clipped to [2, 98].
    pub fn start_point(&self) -> Array1<f64> {
        let mut start = Array1::from_iter(
            self.free
                .iter()
                .map(|&i| self.guesses[i].normalize(self.guesses[i].value)),
        );
        clamp_guess(&mut start);
        start
    }

    /// Expand a normalized floating point into the full physical vector.
    pub fn expand(&self, normalized: &Array1<f64>) -> Array1<f64> {
        let mut full = Array1::from_iter(self.guesses.iter().map(|g| g.value));
        for (k, &i) in self.free.iter().enumerate() {
            full[i] = self.guesses[i].denormalize(normalized[k]);
        }
        apply_sync(&mut full, &self.syncs);
        full
    }

    /// Same bounds and constraints, starting from `values` (clamped into bounds).
    pub fn with_values(&self, values: &Array1<f64>) -> Result<Self> {
        if values.len() != self.len() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Expected {} parameter values, got {}",
                self.len(),
                values.len()
            )));
        }
        let mut space = self.clone();
        for &i in &self.free {
            space.guesses[i].value = self.guesses[i].clamp(values[i]);
        }
        Ok(space)
    }

    /// Same bounds and constraints with floating values drawn uniformly within bounds.
    pub fn perturbed<R: Rng>(&self, rng: &mut R) -> Self {
        let mut space = self.clone();
        for &i in &self.free {
            let guess = &mut space.guesses[i];
            guess.value = rng.gen_range(guess.lower..guess.upper);
        }
        space
    }

    /// Attach a problem to this space, producing the objective an optimizer minimizes.
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` when the problem expects a different vector length
    /// * `ParameterCount` when the data leave no degrees of freedom
    pub fn bind<'a, P: Problem>(
        &'a self,
        problem: &'a P,
        mode: CostMode,
    ) -> Result<BoundedProblem<'a, P>> {
        if problem.parameter_count() != self.len() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Problem expects {} parameters, space has {}",
                problem.parameter_count(),
                self.len()
            )));
        }
        if problem.residual_count() <= self.free_count() {
            return Err(PeakFitError::ParameterCount {
                data: problem.residual_count(),
                free: self.free_count(),
            });
        }
        Ok(BoundedProblem {
            space: self,
            problem,
            mode,
            best: RefCell::new(None),
            evaluations: Cell::new(0),
        })
    }
}

/// A problem evaluated through a [`ParameterSpace`].
///
/// Keeps the best normalized point seen so far so a caller can fall back to
/// it when an optimizer stops on its evaluation budget.
pub struct BoundedProblem<'a, P: Problem> {
    space: &'a ParameterSpace,
    problem: &'a P,
    mode: CostMode,
    best: RefCell<Option<(Array1<f64>, f64)>>,
    evaluations: Cell<usize>,
}

impl<'a, P: Problem> BoundedProblem<'a, P> {
    pub fn space(&self) -> &ParameterSpace {
        self.space
    }

    /// Best normalized point and its objective value seen so far.
    pub fn best(&self) -> Option<(Array1<f64>, f64)> {
        self.best.borrow().clone()
    }

    /// Number of objective evaluations so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations.get()
    }
}

impl<'a, P: Problem> Objective for BoundedProblem<'a, P> {
    fn dimension(&self) -> usize {
        self.space.free_count()
    }

    fn cost(&self, point: &Array1<f64>) -> Result<f64> {
        let params = self.space.expand(point);
        let value = self
            .problem
            .eval_cost(&params, self.mode, self.space.free_count())?;
        self.evaluations.set(self.evaluations.get() + 1);

        if value.is_finite() {
            let mut best = self.best.borrow_mut();
            let improved = best.as_ref().map_or(true, |(_, v)| value < *v);
            if improved {
                trace!("new best objective {:.6e}", value);
                *best = Some((point.clone(), value));
            }
        }
        Ok(value)
    }
}
