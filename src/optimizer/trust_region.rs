//! Interpolation-based trust-region local search.
//!
//! Each iteration interpolates a separable quadratic model through `2n + 1`
//! points around the current center (the same point count BOBYQA uses for
//! its initial model), minimizes the model inside the intersection of the
//! trust box and the normalized bounds, and adapts the radius from the ratio
//! of actual to predicted reduction. No derivatives of the objective are used.

use log::debug;
use ndarray::Array1;

use crate::error::{OptimizerFailure, PeakFitError, Result};
use crate::parameters::NORMALIZED_SPAN;

use super::convergence::ConvergenceStatus;
use super::{Objective, OptimizerConfig, OptimizerRun};

/// Radius bookkeeping for the trust-region search.
#[derive(Debug, Clone)]
pub struct TrustRegion {
    /// Current radius
    pub radius: f64,

    /// Largest allowed radius
    pub max_radius: f64,

    /// Factor applied to the radius after a very successful step at the edge
    pub expand_factor: f64,

    /// Factor applied to the radius after a poor step
    pub shrink_factor: f64,

    /// Gain ratio below which the radius shrinks
    pub min_gain_ratio: f64,

    /// Gain ratio above which the radius may grow
    pub good_gain_ratio: f64,
}

impl Default for TrustRegion {
    fn default() -> Self {
        Self {
            radius: 10.0,
            max_radius: NORMALIZED_SPAN / 2.0,
            expand_factor: 2.0,
            shrink_factor: 0.5,
            min_gain_ratio: 0.25,
            good_gain_ratio: 0.75,
        }
    }
}

impl TrustRegion {
    /// Creates a new TrustRegion with the given starting radius.
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            ..Default::default()
        }
    }

    /// Adapt the radius after a trial step.
    ///
    /// `actual` and `predicted` are the objective reductions of the step; the
    /// model reduction must be positive.
    pub fn update(&mut self, actual: f64, predicted: f64, at_edge: bool) {
        let ratio = actual / predicted;
        if !(ratio >= self.min_gain_ratio) {
            self.radius *= self.shrink_factor;
        } else if ratio > self.good_gain_ratio && at_edge {
            self.radius = (self.radius * self.expand_factor).min(self.max_radius);
        }
    }

    /// Shrinks the radius unconditionally.
    pub fn shrink(&mut self) {
        self.radius *= self.shrink_factor;
    }
}

/// Trust-region optimizer over the normalized box.
#[derive(Debug, Clone)]
pub struct TrustRegionOptimizer {
    initial_radius: f64,
    final_radius: f64,
    max_evaluations: usize,
}

impl TrustRegionOptimizer {
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            initial_radius: config.initial_radius,
            final_radius: config.final_radius,
            max_evaluations: config.trust_region_max_evaluations,
        }
    }

    /// Minimize `objective` starting from the normalized point `start`.
    ///
    /// Stops with `TooManyEvaluations` when the budget runs out; the caller can
    /// recover the best interior point from the objective.
    pub fn minimize<O: Objective>(&self, objective: &O, start: &Array1<f64>) -> Result<OptimizerRun> {
        let n = objective.dimension();
        if n == 0 || start.len() != n {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Trust-region search needs a start point of dimension {}, got {}",
                n,
                start.len()
            )));
        }

        let mut evaluations = 0;
        let mut evaluate = |point: &Array1<f64>| -> Result<f64> {
            if evaluations >= self.max_evaluations {
                return Err(OptimizerFailure::TooManyEvaluations(self.max_evaluations).into());
            }
            let value = objective.cost(point)?;
            evaluations += 1;
            if !value.is_finite() {
                return Err(OptimizerFailure::NonFiniteObjective(evaluations).into());
            }
            Ok(value)
        };

        let mut x = start.mapv(|v| v.max(0.0).min(NORMALIZED_SPAN));
        let mut fx = evaluate(&x)?;
        let mut region = TrustRegion::new(self.initial_radius);
        let mut iterations = 0;

        while region.radius >= self.final_radius {
            iterations += 1;

            // Interpolate a separable quadratic through 2n + 1 points
            let mut gradient = Array1::zeros(n);
            let mut curvature = Array1::zeros(n);
            let mut improved: Option<(Array1<f64>, f64)> = None;
            for i in 0..n {
                let (s1, s2) = sample_offsets(x[i], region.radius);
                let mut p1 = x.clone();
                p1[i] += s1;
                let f1 = evaluate(&p1)?;
                let mut p2 = x.clone();
                p2[i] += s2;
                let f2 = evaluate(&p2)?;

                for (p, f) in [(p1, f1), (p2, f2)] {
                    let best_so_far = improved.as_ref().map_or(fx, |(_, v)| *v);
                    if f < best_so_far {
                        improved = Some((p, f));
                    }
                }

                let slope1 = (f1 - fx) / s1;
                let slope2 = (f2 - fx) / s2;
                curvature[i] = 2.0 * (slope1 - slope2) / (s1 - s2);
                gradient[i] = slope1 - 0.5 * curvature[i] * s1;
            }

            if let Some((point, value)) = improved {
                x = point;
                fx = value;
                continue;
            }

            // Minimize the model inside the trust box and the bounds
            let mut step = Array1::zeros(n);
            let mut predicted = 0.0;
            for i in 0..n {
                let lo = (-region.radius).max(-x[i]);
                let hi = region.radius.min(NORMALIZED_SPAN - x[i]);
                let model = |t: f64| gradient[i] * t + 0.5 * curvature[i] * t * t;
                let mut t_best = 0.0;
                let mut m_best = 0.0;
                let mut candidates = vec![lo, hi];
                if curvature[i] > 0.0 {
                    candidates.push((-gradient[i] / curvature[i]).max(lo).min(hi));
                }
                for t in candidates {
                    let m = model(t);
                    if m < m_best {
                        m_best = m;
                        t_best = t;
                    }
                }
                step[i] = t_best;
                predicted -= m_best;
            }

            if predicted <= f64::EPSILON * fx.abs() {
                region.shrink();
                continue;
            }

            let trial = &x + &step;
            let f_trial = evaluate(&trial)?;
            let at_edge = step
                .iter()
                .any(|t| (t.abs() - region.radius).abs() <= 1e-12 * region.radius);
            region.update(fx - f_trial, predicted, at_edge);
            if f_trial < fx {
                x = trial;
                fx = f_trial;
            }
        }

        debug!(
            "Trust-region search finished after {} iterations, {} evaluations",
            iterations, evaluations
        );

        Ok(OptimizerRun {
            point: x,
            value: fx,
            iterations,
            evaluations,
            status: ConvergenceStatus::ParameterConvergence,
        })
    }
}

/// Two distinct non-zero offsets along one coordinate that stay inside the box.
fn sample_offsets(x: f64, step: f64) -> (f64, f64) {
    let up = NORMALIZED_SPAN - x;
    let down = x;
    if up >= step && down >= step {
        (step, -step)
    } else if up >= down {
        let s = step.min(up);
        (s, 0.5 * s)
    } else {
        let s = step.min(down);
        (-s, -0.5 * s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bowl;

    impl Objective for Bowl {
        fn dimension(&self) -> usize {
            2
        }

        fn cost(&self, point: &Array1<f64>) -> Result<f64> {
            Ok((point[0] - 42.0).powi(2) + 3.0 * (point[1] - 61.0).powi(2) + 0.5 * (point[0] - 42.0) * (point[1] - 61.0))
        }
    }

    #[test]
    fn test_radius_update() {
        let mut region = TrustRegion::new(4.0);
        region.update(0.1, 1.0, false);
        assert_eq!(region.radius, 2.0);
        region.update(0.9, 1.0, true);
        assert_eq!(region.radius, 4.0);
        region.update(0.9, 1.0, false);
        assert_eq!(region.radius, 4.0);
        // A step that made things worse always shrinks
        region.update(-3.0, 1.0, true);
        assert_eq!(region.radius, 2.0);
    }

    #[test]
    fn test_sample_offsets_stay_inside() {
        assert_eq!(sample_offsets(50.0, 10.0), (10.0, -10.0));
        assert_eq!(sample_offsets(99.0, 10.0), (-10.0, -5.0));
        assert_eq!(sample_offsets(1.0, 10.0), (10.0, 5.0));
    }

    #[test]
    fn test_minimize_coupled_bowl() {
        let optimizer = TrustRegionOptimizer::new(&OptimizerConfig::default());
        let run = optimizer.minimize(&Bowl, &Array1::from_vec(vec![20.0, 20.0])).unwrap();
        assert!((run.point[0] - 42.0).abs() < 1e-4, "{:?}", run.point);
        assert!((run.point[1] - 61.0).abs() < 1e-4, "{:?}", run.point);
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut config = OptimizerConfig::default();
        config.trust_region_max_evaluations = 7;
        let optimizer = TrustRegionOptimizer::new(&config);
        let result = optimizer.minimize(&Bowl, &Array1::from_vec(vec![20.0, 20.0]));
        assert!(matches!(
            result,
            Err(PeakFitError::Optimization(OptimizerFailure::TooManyEvaluations(7)))
        ));
    }
}
