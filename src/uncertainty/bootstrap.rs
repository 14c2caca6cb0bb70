//! Bootstrap resampling of fit data.
//!
//! Every iteration draws `N` rows with replacement from the original `N`,
//! refits from the best-fit point and records the resulting parameter vector.
//! Iterations run in parallel on the rayon pool. Each one owns its random
//! generator, seeded from the session seed and the iteration index, and its
//! own optimizer, so results do not depend on scheduling.

use log::{info, warn};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PeakFitError, Result};
use crate::optimizer::OptimizationEngine;
use crate::parameters::ParameterSpace;
use crate::problem::Problem;

/// Data that can be resampled row-wise.
pub trait Resample: Sized {
    /// Number of rows available for resampling.
    fn sample_count(&self) -> usize;

    /// New data made of the rows at `indices` (repeats allowed).
    fn resample(&self, indices: &[usize]) -> Self;
}

/// Configuration options for bootstrap resampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of resampling iterations. Default: 100
    pub n_sim: usize,

    /// Session seed from which every iteration's seed is derived. Default: 1
    pub seed: u64,

    /// Successful iterations required to publish an estimate. Default: None (all of them)
    pub min_successes: Option<usize>,

    /// Central interval levels to report, e.g. 0.95. Default: [0.68, 0.95]
    pub percentiles: Vec<f64>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_sim: 100,
            seed: 1,
            min_successes: None,
            percentiles: vec![0.68, 0.95],
        }
    }
}

impl BootstrapConfig {
    pub fn with_n_sim(mut self, n_sim: usize) -> Self {
        self.n_sim = n_sim;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_min_successes(mut self, min_successes: usize) -> Self {
        self.min_successes = Some(min_successes);
        self
    }

    /// Number of successful iterations needed before an estimate is published.
    pub fn required_successes(&self) -> usize {
        self.min_successes.unwrap_or(self.n_sim).min(self.n_sim).max(1)
    }
}

/// Seed of iteration `index` within a session (splitmix64 of the pair).
pub fn task_seed(session: u64, index: usize) -> u64 {
    let mut z = session
        .wrapping_add((index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A central interval of the bootstrap distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileInterval {
    /// Coverage, e.g. 0.95
    pub level: f64,
    pub lower: Array1<f64>,
    pub upper: Array1<f64>,
}

/// Result of a bootstrap uncertainty analysis.
#[derive(Debug, Clone)]
pub struct BootstrapResult {
    /// Parameter vectors of the successful iterations, one per row
    pub samples: Array2<f64>,

    /// Mean of each parameter
    pub means: Array1<f64>,

    /// Sample standard deviation of each parameter
    pub std_devs: Array1<f64>,

    /// Median of each parameter
    pub medians: Array1<f64>,

    /// Central intervals at the configured levels
    pub percentiles: Vec<PercentileInterval>,

    /// Iterations started
    pub attempted: usize,

    /// Iterations that produced a fit
    pub succeeded: usize,
}

impl BootstrapResult {
    /// Summarize a set of parameter vectors.
    ///
    /// # Arguments
    ///
    /// * `samples` - One row per successful iteration
    /// * `levels` - Central interval levels to compute
    /// * `attempted` - Number of iterations started
    pub fn from_samples(samples: Array2<f64>, levels: &[f64], attempted: usize) -> Result<Self> {
        let n = samples.nrows();
        if n == 0 {
            return Err(PeakFitError::InvalidInput(
                "No bootstrap samples to summarize".to_string(),
            ));
        }
        let n_params = samples.ncols();

        let means = samples
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_params));
        let std_devs = if n > 1 {
            samples.std_axis(Axis(0), 1.0)
        } else {
            Array1::zeros(n_params)
        };

        let mut medians = Array1::zeros(n_params);
        let mut percentiles: Vec<PercentileInterval> = levels
            .iter()
            .map(|&level| PercentileInterval {
                level,
                lower: Array1::zeros(n_params),
                upper: Array1::zeros(n_params),
            })
            .collect();

        for (j, column) in samples.axis_iter(Axis(1)).enumerate() {
            let mut sorted = column.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));

            medians[j] = if n % 2 == 0 {
                (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
            } else {
                sorted[n / 2]
            };

            for interval in percentiles.iter_mut() {
                let tail = (1.0 - interval.level) / 2.0;
                let lower_idx = ((n as f64) * tail).round() as usize;
                let upper_idx = ((n as f64) * (1.0 - tail)).round() as usize;
                interval.lower[j] = sorted[lower_idx.min(n - 1)];
                interval.upper[j] = sorted[upper_idx.min(n - 1)];
            }
        }

        Ok(Self {
            samples,
            means,
            std_devs,
            medians,
            percentiles,
            attempted,
            succeeded: n,
        })
    }
}

/// Repeats a fit on resampled data to estimate parameter uncertainty.
#[derive(Debug, Clone, Default)]
pub struct BootstrapEstimator {
    config: BootstrapConfig,
}

impl BootstrapEstimator {
    pub fn new(config: BootstrapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Run the bootstrap.
    ///
    /// # Arguments
    ///
    /// * `data` - The original fit data
    /// * `build` - Builds the problem for one resampled data set
    /// * `space` - Guesses, bounds and constraints of the original fit
    /// * `best` - Best-fit full parameter vector; every refit starts here
    /// * `engine` - Optimizer settings; each iteration uses its own copy
    ///
    /// # Returns
    ///
    /// * `Ok(Some(result))` when enough iterations succeeded
    /// * `Ok(None)` when fewer than the required number succeeded
    /// * `Err` for inconsistent inputs
    pub fn estimate<D, P, F>(
        &self,
        data: &D,
        build: F,
        space: &ParameterSpace,
        best: &Array1<f64>,
        engine: &OptimizationEngine,
    ) -> Result<Option<BootstrapResult>>
    where
        D: Resample + Sync,
        P: Problem,
        F: Fn(D) -> Result<P> + Sync,
    {
        let n_rows = data.sample_count();
        if n_rows == 0 {
            return Err(PeakFitError::InvalidInput(
                "Cannot bootstrap an empty data set".to_string(),
            ));
        }
        let start = space.with_values(best)?;
        let n_sim = self.config.n_sim;
        let session = self.config.seed;

        let outcomes: Vec<Option<Array1<f64>>> = (0..n_sim)
            .into_par_iter()
            .map(|index| -> Result<Option<Array1<f64>>> {
                let mut rng = StdRng::seed_from_u64(task_seed(session, index));
                let indices: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
                let problem = build(data.resample(&indices))?;
                let local = engine.with_seed(rng.gen());
                let fitted = local.run(&problem, &start)?;
                if fitted.is_none() {
                    warn!("Bootstrap iteration {} failed to converge; dropped", index);
                }
                Ok(fitted.map(|f| f.point))
            })
            .collect::<Result<Vec<_>>>()?;

        let successes: Vec<Array1<f64>> = outcomes.into_iter().flatten().collect();
        let required = self.config.required_successes();
        if successes.len() < required {
            warn!(
                "Bootstrap: {} of {} iterations succeeded, {} required; no estimate",
                successes.len(),
                n_sim,
                required
            );
            return Ok(None);
        }

        let mut samples = Array2::zeros((successes.len(), best.len()));
        for (mut row, point) in samples.axis_iter_mut(Axis(0)).zip(successes.iter()) {
            row.assign(point);
        }
        let result = BootstrapResult::from_samples(samples, &self.config.percentiles, n_sim)?;
        info!(
            "Bootstrap: {} of {} iterations succeeded",
            result.succeeded, result.attempted
        );
        Ok(Some(result))
    }
}
