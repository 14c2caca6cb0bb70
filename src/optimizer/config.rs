//! Configuration options for the derivative-free optimizers.
//!
//! All distances are in the normalized `[0, 100]` parameter space.

use serde::{Deserialize, Serialize};

use crate::problem::CostMode;

/// Which optimizer the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// Population-based CMA-ES global search.
    #[default]
    Global,

    /// Interpolation-based trust-region local search.
    Local,
}

/// Configuration options for the optimization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Optimizer used by [`OptimizationEngine::run`](super::OptimizationEngine::run). Default: Global
    pub strategy: Strategy,

    /// Objective reduction. Default: AbsoluteDeviation
    pub cost_mode: CostMode,

    /// Initial CMA-ES step size. Default: 10.0
    pub sigma: f64,

    /// Maximum number of CMA-ES generations. Default: 2000
    pub max_iterations: usize,

    /// Hard cap on objective evaluations. Default: 2_000_000
    pub max_evaluations: usize,

    /// Relative tolerance of the value checker. Default: 100 * f64::EPSILON
    pub rel_tolerance: f64,

    /// Absolute tolerance of the value checker. Default: 100 * f64::MIN_POSITIVE
    pub abs_tolerance: f64,

    /// Stop as soon as the objective drops below this value. Default: None
    pub stop_fitness: Option<f64>,

    /// Stop when every coordinate's search scale falls below this. Default: 1e-11
    pub tol_x: f64,

    /// Stop when the recent history of generation bests is flatter than this. Default: 1e-13
    pub tol_hist_fun: f64,

    /// Starting trust-region radius. Default: 10.0
    pub initial_radius: f64,

    /// Trust-region radius at which the local search stops. Default: 1e-8
    pub final_radius: f64,

    /// Evaluation cap for the trust-region search. Default: 50_000
    pub trust_region_max_evaluations: usize,

    /// Seed for the random generator created at the start of each fit. Default: 1
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            cost_mode: CostMode::default(),
            sigma: 10.0,
            max_iterations: 2000,
            max_evaluations: 2_000_000,
            rel_tolerance: 100.0 * f64::EPSILON,
            abs_tolerance: 100.0 * f64::MIN_POSITIVE,
            stop_fitness: None,
            tol_x: 1e-11,
            tol_hist_fun: 1e-13,
            initial_radius: 10.0,
            final_radius: 1e-8,
            trust_region_max_evaluations: 50_000,
            seed: 1,
        }
    }
}

impl OptimizerConfig {
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cost_mode(mut self, mode: CostMode) -> Self {
        self.cost_mode = mode;
        self
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn with_max_evaluations(mut self, evaluations: usize) -> Self {
        self.max_evaluations = evaluations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
