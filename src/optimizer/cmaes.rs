//! Covariance Matrix Adaptation Evolution Strategy.
//!
//! A population-based stochastic minimizer that adapts a full covariance
//! matrix of its sampling distribution. Candidates outside the normalized box
//! are repaired onto the boundary and penalized by their distance to it, so
//! the objective is only ever evaluated at feasible points.

use std::collections::VecDeque;

use log::debug;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::{OptimizerFailure, PeakFitError, Result};
use crate::parameters::NORMALIZED_SPAN;

use super::convergence::{ConvergenceStatus, ValueChecker};
use super::{Objective, OptimizerConfig, OptimizerRun};

/// Largest eigenvalue ratio tolerated before the covariance counts as degenerate.
const MAX_CONDITION: f64 = 1e14;

/// CMA-ES optimizer working in the normalized `[0, 100]` box.
#[derive(Debug, Clone)]
pub struct Cmaes {
    sigma: f64,
    max_iterations: usize,
    max_evaluations: usize,
    checker: ValueChecker,
    stop_fitness: Option<f64>,
    tol_x: f64,
    tol_hist_fun: f64,
    seed: u64,
}

impl Cmaes {
    /// Create an optimizer from the engine configuration.
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            sigma: config.sigma,
            max_iterations: config.max_iterations,
            max_evaluations: config.max_evaluations,
            checker: ValueChecker::new(config.rel_tolerance, config.abs_tolerance),
            stop_fitness: config.stop_fitness,
            tol_x: config.tol_x,
            tol_hist_fun: config.tol_hist_fun,
            seed: config.seed,
        }
    }

    /// Default population size, `4 + ⌊3 ln n⌋`.
    pub fn population_size(dimension: usize) -> usize {
        4 + (3.0 * (dimension.max(1) as f64).ln()).floor() as usize
    }

    /// Minimize `objective` starting from the normalized point `start`.
    ///
    /// # Arguments
    ///
    /// * `objective` - The bounded objective
    /// * `start` - Normalized starting point
    ///
    /// # Returns
    ///
    /// * The best feasible point found, or `PeakFitError::Optimization` on a
    ///   numerical failure
    pub fn minimize<O: Objective>(&self, objective: &O, start: &Array1<f64>) -> Result<OptimizerRun> {
        let n = objective.dimension();
        if n == 0 || start.len() != n {
            return Err(PeakFitError::DimensionMismatch(format!(
                "CMA-ES needs a start point of dimension {}, got {}",
                n,
                start.len()
            )));
        }

        // Strategy parameters
        let nf = n as f64;
        let lambda = Self::population_size(n);
        let mu = lambda / 2;
        let raw: Vec<f64> = (0..mu)
            .map(|i| (mu as f64 + 0.5).ln() - ((i + 1) as f64).ln())
            .collect();
        let raw_sum: f64 = raw.iter().sum();
        let weights: Vec<f64> = raw.iter().map(|w| w / raw_sum).collect();
        let mueff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let cc = (4.0 + mueff / nf) / (nf + 4.0 + 2.0 * mueff / nf);
        let cs = (mueff + 2.0) / (nf + mueff + 5.0);
        let c1 = 2.0 / ((nf + 1.3).powi(2) + mueff);
        let cmu = (1.0 - c1).min(2.0 * (mueff - 2.0 + 1.0 / mueff) / ((nf + 2.0).powi(2) + mueff));
        let damps = 1.0 + 2.0 * (((mueff - 1.0) / (nf + 1.0)).sqrt() - 1.0).max(0.0) + cs;
        let chi_n = nf.sqrt() * (1.0 - 1.0 / (4.0 * nf) + 1.0 / (21.0 * nf * nf));
        let history_len = 10 + (30.0 * nf / lambda as f64).ceil() as usize;

        // Dynamic state
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut xmean = DVector::from_iterator(n, start.iter().cloned());
        let mut sigma = self.sigma;
        let mut pc: DVector<f64> = DVector::zeros(n);
        let mut ps: DVector<f64> = DVector::zeros(n);
        let mut b: DMatrix<f64> = DMatrix::identity(n, n);
        let mut d: DVector<f64> = DVector::from_element(n, 1.0);
        let mut c: DMatrix<f64> = DMatrix::identity(n, n);
        let mut history: VecDeque<f64> = VecDeque::with_capacity(history_len);

        let mut best_point = repair(&xmean);
        let mut best_value = objective.cost(&to_array(&best_point))?;
        let mut evaluations = 1;
        if !best_value.is_finite() {
            return Err(OptimizerFailure::NonFiniteObjective(evaluations).into());
        }
        let mut previous: Option<f64> = None;
        let mut status = ConvergenceStatus::MaxIterationsReached;
        let mut iterations = 0;

        for iteration in 1..=self.max_iterations {
            iterations = iteration;

            // Sample and evaluate the offspring
            let mut arz = Vec::with_capacity(lambda);
            let mut arx = Vec::with_capacity(lambda);
            let mut values = Vec::with_capacity(lambda);
            let mut penalties = Vec::with_capacity(lambda);
            let mut repaired_points = Vec::with_capacity(lambda);
            for _ in 0..lambda {
                let z = DVector::from_iterator(n, (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)));
                let x = &xmean + (&b * d.component_mul(&z)) * sigma;
                let repaired = repair(&x);
                let penalty: f64 = x.iter().zip(repaired.iter()).map(|(a, r)| (a - r).abs()).sum();

                if evaluations >= self.max_evaluations {
                    return Err(OptimizerFailure::TooManyEvaluations(self.max_evaluations).into());
                }
                let value = objective.cost(&to_array(&repaired))?;
                evaluations += 1;
                if !value.is_finite() {
                    return Err(OptimizerFailure::NonFiniteObjective(evaluations).into());
                }

                arz.push(z);
                arx.push(x);
                values.push(value);
                penalties.push(penalty);
                repaired_points.push(repaired);
            }

            let (min_value, max_value) = values
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            let value_range = max_value - min_value;
            let fitness: Vec<f64> = values
                .iter()
                .zip(penalties.iter())
                .map(|(v, p)| v + value_range * p)
                .collect();
            let mut order: Vec<usize> = (0..lambda).collect();
            order.sort_by(|&i, &j| fitness[i].total_cmp(&fitness[j]));

            // Best feasible point of this generation
            let generation_best = (0..lambda)
                .min_by(|&i, &j| values[i].total_cmp(&values[j]))
                .unwrap_or(order[0]);
            let generation_value = values[generation_best];
            if generation_value < best_value {
                best_value = generation_value;
                best_point = repaired_points[generation_best].clone();
            }

            // Recombination
            let xold = xmean.clone();
            let mut zmean: DVector<f64> = DVector::zeros(n);
            xmean = DVector::zeros(n);
            for (i, &k) in order.iter().take(mu).enumerate() {
                xmean += &arx[k] * weights[i];
                zmean += &arz[k] * weights[i];
            }

            // Evolution paths
            ps = ps * (1.0 - cs) + (&b * &zmean) * (cs * (2.0 - cs) * mueff).sqrt();
            let ps_norm = ps.norm();
            let hsig = ps_norm / (1.0 - (1.0 - cs).powi(2 * iteration as i32)).sqrt() / chi_n
                < 1.4 + 2.0 / (nf + 1.0);
            let ymean = (&xmean - &xold) / sigma;
            pc = pc * (1.0 - cc);
            if hsig {
                pc += ymean * (cc * (2.0 - cc) * mueff).sqrt();
            }

            // Covariance update
            let mut rank_mu: DMatrix<f64> = DMatrix::zeros(n, n);
            for (i, &k) in order.iter().take(mu).enumerate() {
                let y = (&arx[k] - &xold) / sigma;
                rank_mu += (&y * y.transpose()) * weights[i];
            }
            let delta_h = if hsig { 0.0 } else { cc * (2.0 - cc) };
            let rank_one = &pc * pc.transpose() + c.clone() * delta_h;
            c = c * (1.0 - c1 - cmu) + rank_one * c1 + rank_mu * cmu;
            c = (&c + c.transpose()) * 0.5;

            sigma *= ((cs / damps) * (ps_norm / chi_n - 1.0)).exp();

            // Decomposition
            let eigen = SymmetricEigen::new(c.clone());
            let mut min_eigen = f64::INFINITY;
            let mut max_eigen = f64::NEG_INFINITY;
            for &e in eigen.eigenvalues.iter() {
                if !e.is_finite() || e <= 0.0 {
                    debug!("CMA-ES covariance lost definiteness at generation {}", iteration);
                    return Err(OptimizerFailure::NotPositiveDefinite.into());
                }
                min_eigen = min_eigen.min(e);
                max_eigen = max_eigen.max(e);
            }
            let condition = max_eigen / min_eigen;
            if condition > MAX_CONDITION {
                return Err(OptimizerFailure::DegenerateCovariance(condition).into());
            }
            b = eigen.eigenvectors;
            d = eigen.eigenvalues.map(|e| e.sqrt());

            // Termination tests
            if self.stop_fitness.map_or(false, |stop| best_value < stop) {
                status = ConvergenceStatus::StopFitness;
                break;
            }
            if let Some(prev) = previous {
                if self.checker.converged(prev, generation_value) {
                    status = ConvergenceStatus::ValueConvergence;
                    break;
                }
            }
            previous = Some(generation_value);

            if (0..n).all(|i| sigma * pc[i].abs().max(c[(i, i)].sqrt()) < self.tol_x) {
                status = ConvergenceStatus::ParameterConvergence;
                break;
            }

            history.push_front(generation_value);
            if history.len() > history_len {
                history.pop_back();
            }
            if history.len() == history_len {
                let (lo, hi) = history
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                if hi - lo < self.tol_hist_fun {
                    status = ConvergenceStatus::HistoryConvergence;
                    break;
                }
            }

            // Flat fitness: widen the search
            let flat_index = (0.1 + lambda as f64 / 4.0) as usize;
            if fitness[order[0]] == fitness[order[flat_index.min(lambda - 1)]] {
                sigma *= (0.2 + cs / damps).exp();
            }
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(OptimizerFailure::DegenerateCovariance(sigma).into());
            }
        }

        debug!(
            "CMA-ES finished after {} generations, {} evaluations: {}",
            iterations,
            evaluations,
            status.description()
        );

        Ok(OptimizerRun {
            point: to_array(&best_point),
            value: best_value,
            iterations,
            evaluations,
            status,
        })
    }
}

fn repair(x: &DVector<f64>) -> DVector<f64> {
    x.map(|v| v.max(0.0).min(NORMALIZED_SPAN))
}

fn to_array(x: &DVector<f64>) -> Array1<f64> {
    Array1::from_iter(x.iter().cloned())
}
