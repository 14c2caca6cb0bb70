//! # Optimization Engine
//!
//! Derivative-free minimization of a [`Problem`] over a [`ParameterSpace`].
//! Two optimizers work in the normalized `[0, 100]` box of the floating
//! parameters:
//!
//! - [`Cmaes`]: population-based global search (the default)
//! - [`TrustRegionOptimizer`]: interpolation-based local refinement
//!
//! Numerical failures of an optimizer (degenerate covariance, exhausted
//! budget, non-finite objective) are reported as "no result" by the engine
//! and logged; configuration errors propagate as `Err`.

pub mod cmaes;
pub mod config;
pub mod convergence;
pub mod trust_region;

use log::{debug, info};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{OptimizerFailure, PeakFitError, Result};
use crate::parameters::ParameterSpace;
use crate::problem::Problem;

pub use cmaes::Cmaes;
pub use config::{OptimizerConfig, Strategy};
pub use convergence::{ConvergenceStatus, ValueChecker};
pub use trust_region::{TrustRegion, TrustRegionOptimizer};

/// A scalar function of a point in the normalized box.
pub trait Objective {
    /// Number of coordinates of a point.
    fn dimension(&self) -> usize;

    /// Objective value at `point`.
    fn cost(&self, point: &Array1<f64>) -> Result<f64>;
}

/// Raw outcome of one optimizer run, in normalized coordinates.
#[derive(Debug, Clone)]
pub struct OptimizerRun {
    /// Best normalized point
    pub point: Array1<f64>,

    /// Objective value at `point`
    pub value: f64,

    /// Generations (CMA-ES) or model iterations (trust region)
    pub iterations: usize,

    /// Objective evaluations
    pub evaluations: usize,

    /// Why the run stopped
    pub status: ConvergenceStatus,
}

/// A successful fit in physical coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Full physical parameter vector, sync constraints applied
    pub point: Array1<f64>,

    /// Objective value at `point`
    pub value: f64,

    /// Objective evaluations spent
    pub evaluations: usize,
}

/// Runs the optimizers against bounded problems.
#[derive(Debug, Clone, Default)]
pub struct OptimizationEngine {
    config: OptimizerConfig,
}

impl OptimizationEngine {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Copy of this engine with a different random seed.
    pub fn with_seed(&self, seed: u64) -> Self {
        Self {
            config: self.config.clone().with_seed(seed),
        }
    }

    /// Global CMA-ES fit of `problem` over `space`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(result))` on success
    /// * `Ok(None)` when the optimizer failed numerically
    /// * `Err` for inconsistent inputs
    pub fn fit<P: Problem>(&self, problem: &P, space: &ParameterSpace) -> Result<Option<FitResult>> {
        let bounded = space.bind(problem, self.config.cost_mode)?;
        if space.free_count() == 0 {
            return self.evaluate_fixed(problem, space);
        }

        let run = Cmaes::new(&self.config).minimize(&bounded, &space.start_point());
        match run {
            Ok(run) => {
                debug!(
                    "CMA-ES: {} after {} generations, objective {:.6e}",
                    run.status.description(),
                    run.iterations,
                    run.value
                );
                Ok(Some(FitResult {
                    point: space.expand(&run.point),
                    value: run.value,
                    evaluations: run.evaluations,
                }))
            }
            Err(PeakFitError::Optimization(failure)) => {
                debug!("CMA-ES failed: {}", failure);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Trust-region refinement of `problem` starting from the guesses in `space`.
    ///
    /// When the evaluation budget runs out, the best point evaluated so far is
    /// returned instead of failing.
    pub fn refine<P: Problem>(&self, problem: &P, space: &ParameterSpace) -> Result<Option<FitResult>> {
        let bounded = space.bind(problem, self.config.cost_mode)?;
        if space.free_count() == 0 {
            return self.evaluate_fixed(problem, space);
        }

        let run = TrustRegionOptimizer::new(&self.config).minimize(&bounded, &space.start_point());
        match run {
            Ok(run) => Ok(Some(FitResult {
                point: space.expand(&run.point),
                value: run.value,
                evaluations: run.evaluations,
            })),
            Err(PeakFitError::Optimization(OptimizerFailure::TooManyEvaluations(limit))) => {
                debug!("Trust-region search hit its budget of {} evaluations", limit);
                Ok(bounded.best().map(|(point, value)| FitResult {
                    point: space.expand(&point),
                    value,
                    evaluations: bounded.evaluations(),
                }))
            }
            Err(PeakFitError::Optimization(failure)) => {
                debug!("Trust-region search failed: {}", failure);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Run the optimizer selected by the configured [`Strategy`].
    pub fn run<P: Problem>(&self, problem: &P, space: &ParameterSpace) -> Result<Option<FitResult>> {
        match self.config.strategy {
            Strategy::Global => self.fit(problem, space),
            Strategy::Local => self.refine(problem, space),
        }
    }

    /// Repeat [`run`](Self::run) `n_tries` times and keep the lowest objective.
    ///
    /// The first try starts from the given guesses; later tries start from
    /// values drawn uniformly within the bounds and use a fresh seed.
    pub fn fit_with_restarts<P: Problem>(
        &self,
        problem: &P,
        space: &ParameterSpace,
        n_tries: usize,
    ) -> Result<Option<FitResult>> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut best: Option<FitResult> = None;

        for attempt in 0..n_tries.max(1) {
            let engine = self.with_seed(self.config.seed.wrapping_add(attempt as u64));
            let start = if attempt == 0 {
                space.clone()
            } else {
                space.perturbed(&mut rng)
            };
            if let Some(result) = engine.run(problem, &start)? {
                let better = best.as_ref().map_or(true, |b| result.value < b.value);
                if better {
                    best = Some(result);
                }
            }
        }

        if let Some(result) = &best {
            info!(
                "Best of {} tries: objective {:.6e}",
                n_tries.max(1),
                result.value
            );
        }
        Ok(best)
    }

    fn evaluate_fixed<P: Problem>(&self, problem: &P, space: &ParameterSpace) -> Result<Option<FitResult>> {
        let point = space.values();
        let value = problem.eval_cost(&point, self.config.cost_mode, 0)?;
        Ok(Some(FitResult {
            point,
            value,
            evaluations: 1,
        }))
    }
}
