//! Closed-form kinetic equations fit by [`CurveFitter`](super::CurveFitter).

use ndarray::{Array1, ArrayView1};

use crate::error::{PeakFitError, Result};
use crate::lineshape::{zz_amplitude, zz_amplitude2, ExchangeRole};
use crate::parameters::ParameterGuess;

use super::{CurveData, CurveEquation};

const ROLES: [ExchangeRole; 4] = [
    ExchangeRole::AA,
    ExchangeRole::BB,
    ExchangeRole::AB,
    ExchangeRole::BA,
];

/// Guess spanning `value / factor ..= value * factor` for a positive `value`.
fn rate_guess(value: f64, factor: f64) -> ParameterGuess {
    let value = if value.is_finite() && value > 0.0 { value } else { 1.0 };
    ParameterGuess::new(value, value / factor, value * factor)
}

/// Guess with symmetric bounds around zero that contain `value`.
fn signed_guess(value: f64, scale: f64) -> ParameterGuess {
    let span = (scale * value.abs()).max(f64::EPSILON);
    ParameterGuess::new(value, -span, span)
}

/// First x at which `y` has fallen (or risen) halfway from its first to its last value.
fn half_change_x(x: &Array1<f64>, y: &Array1<f64>) -> Option<f64> {
    let first = *y.first()?;
    let last = *y.last()?;
    let half = 0.5 * (first + last);
    let falling = last < first;
    x.iter()
        .zip(y.iter())
        .find(|(_, &v)| if falling { v <= half } else { v >= half })
        .map(|(&xi, _)| xi)
        .filter(|&xi| xi > 0.0)
}

/// Rate guess from the half-change point, falling back to the x range.
fn rate_from_half_change(x: &Array1<f64>, y: &Array1<f64>) -> f64 {
    half_change_x(x, y)
        .map(|xh| std::f64::consts::LN_2 / xh)
        .unwrap_or_else(|| {
            let span = x.iter().fold(0.0f64, |m, &v| m.max(v.abs()));
            if span > 0.0 {
                1.0 / span
            } else {
                1.0
            }
        })
}

/// Single exponential decay, optionally toward a floor.
///
/// y = (a - c) · e^{-r·x} + c
///
/// Parameters: `[a, r]`, or `[a, r, c]` with a floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpDecay {
    pub with_floor: bool,
}

impl CurveEquation for ExpDecay {
    fn name(&self) -> &'static str {
        "exp_decay"
    }

    fn parameter_names(&self) -> Vec<&'static str> {
        if self.with_floor {
            vec!["a", "r", "c"]
        } else {
            vec!["a", "r"]
        }
    }

    fn n_y(&self) -> usize {
        1
    }

    fn guess(&self, data: &CurveData) -> Result<Vec<ParameterGuess>> {
        let (x, y) = data.sorted_channel(0)?;
        let first = y[0];
        let last = y[y.len() - 1];
        let a = signed_guess(first, 3.0);
        let r = rate_guess(rate_from_half_change(&x, &y), 50.0);
        let mut guesses = vec![a, r];
        if self.with_floor {
            let scale = first.abs().max(last.abs());
            guesses.push(ParameterGuess::new(last, -scale.max(f64::EPSILON), scale.max(f64::EPSILON)));
        }
        Ok(guesses)
    }

    fn predict(&self, x: ArrayView1<f64>, params: &Array1<f64>) -> Vec<f64> {
        let floor = if self.with_floor { params[2] } else { 0.0 };
        vec![(params[0] - floor) * (-params[1] * x[0]).exp() + floor]
    }
}

/// Irreversible A → B conversion observed in both channels.
///
/// A(x) = a0 · e^{-k·x},  B(x) = b_max · (1 - e^{-k·x})
///
/// Parameters: `[a0, b_max, k]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TwoStateReaction;

impl CurveEquation for TwoStateReaction {
    fn name(&self) -> &'static str {
        "two_state_reaction"
    }

    fn parameter_names(&self) -> Vec<&'static str> {
        vec!["a0", "b_max", "k"]
    }

    fn n_y(&self) -> usize {
        2
    }

    fn guess(&self, data: &CurveData) -> Result<Vec<ParameterGuess>> {
        let (x, a) = data.sorted_channel(0)?;
        let (_, b) = data.sorted_channel(1)?;
        Ok(vec![
            signed_guess(a[0], 3.0),
            signed_guess(b[b.len() - 1], 3.0),
            rate_guess(rate_from_half_change(&x, &a), 50.0),
        ])
    }

    fn predict(&self, x: ArrayView1<f64>, params: &Array1<f64>) -> Vec<f64> {
        let remaining = (-params[2] * x[0]).exp();
        vec![params[0] * remaining, params[1] * (1.0 - remaining)]
    }
}

/// Two-state exchange observed in the AA, BB, AB and BA channels.
///
/// With a shared relaxation rate the parameters are `[i0, r1, pop_a, k_ex]`;
/// with independent rates they are `[i0, pop_a, r1a, r1b, kab, kba]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZzExchange {
    pub independent_r1: bool,
}

impl CurveEquation for ZzExchange {
    fn name(&self) -> &'static str {
        if self.independent_r1 {
            "zz_exchange2"
        } else {
            "zz_exchange"
        }
    }

    fn parameter_names(&self) -> Vec<&'static str> {
        if self.independent_r1 {
            vec!["i0", "pop_a", "r1a", "r1b", "kab", "kba"]
        } else {
            vec!["i0", "r1", "pop_a", "k_ex"]
        }
    }

    fn n_y(&self) -> usize {
        4
    }

    fn guess(&self, data: &CurveData) -> Result<Vec<ParameterGuess>> {
        let (x, aa) = data.sorted_channel(0)?;
        let (_, bb) = data.sorted_channel(1)?;
        let (_, ab) = data.sorted_channel(2)?;
        let (_, ba) = data.sorted_channel(3)?;
        let n = x.len();

        let auto0 = aa[0] + bb[0];
        let pop_a = if auto0.abs() > 0.0 {
            (aa[0] / auto0).clamp(0.05, 0.95)
        } else {
            0.5
        };
        let total = &aa + &bb + &ab + &ba;
        let r1 = if n > 1 && total[0] > 0.0 && total[n - 1] > 0.0 && x[n - 1] > x[0] {
            (total[0] / total[n - 1]).ln() / (x[n - 1] - x[0])
        } else {
            1.0
        };
        let cross = &ab + &ba;
        let k_ex = rate_from_half_change(&x, &cross);

        let i0 = signed_guess(auto0, 3.0);
        let pop = ParameterGuess::new(pop_a, 0.01, 0.99);
        if self.independent_r1 {
            Ok(vec![
                i0,
                pop,
                rate_guess(r1, 50.0),
                rate_guess(r1, 50.0),
                rate_guess(k_ex * (1.0 - pop_a), 100.0),
                rate_guess(k_ex * pop_a, 100.0),
            ])
        } else {
            Ok(vec![i0, rate_guess(r1, 50.0), pop, rate_guess(k_ex, 100.0)])
        }
    }

    fn predict(&self, x: ArrayView1<f64>, params: &Array1<f64>) -> Vec<f64> {
        let t = x[0];
        ROLES
            .iter()
            .map(|&role| {
                if self.independent_r1 {
                    params[0]
                        * zz_amplitude2(params[2], params[3], params[4], params[5], params[1], t, role)
                } else {
                    params[0] * zz_amplitude(params[1], params[2], params[3], t, role)
                }
            })
            .collect()
    }
}

/// Ratio of cross-peak to auto-peak intensity in a two-state exchange.
///
/// y = 2·pA·pB·(1 - e^{-k·x}) / (pA² + pB² + 2·pA·pB·e^{-k·x})
///
/// Relaxation cancels in the ratio. Parameters: `[k_ex, pop_a]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExchangeRatio;

impl ExchangeRatio {
    /// Population of A that gives the plateau ratio `ratio` (the larger root).
    pub fn population_from_plateau(ratio: f64) -> f64 {
        if !(ratio > 0.0) {
            return 0.95;
        }
        let product = (ratio / (2.0 * (1.0 + ratio))).min(0.25);
        0.5 * (1.0 + (1.0 - 4.0 * product).sqrt())
    }
}

impl CurveEquation for ExchangeRatio {
    fn name(&self) -> &'static str {
        "exchange_ratio"
    }

    fn parameter_names(&self) -> Vec<&'static str> {
        vec!["k_ex", "pop_a"]
    }

    fn n_y(&self) -> usize {
        1
    }

    fn guess(&self, data: &CurveData) -> Result<Vec<ParameterGuess>> {
        let (x, y) = data.sorted_channel(0)?;
        let plateau = y[y.len() - 1];
        let pop_a = Self::population_from_plateau(plateau).clamp(0.5, 0.99);
        Ok(vec![
            rate_guess(rate_from_half_change(&x, &y), 100.0),
            ParameterGuess::new(pop_a, 0.5, 0.999),
        ])
    }

    fn predict(&self, x: ArrayView1<f64>, params: &Array1<f64>) -> Vec<f64> {
        let pop_a = params[1];
        let pop_b = 1.0 - pop_a;
        let mix = (-params[0] * x[0]).exp();
        let cross = 2.0 * pop_a * pop_b;
        vec![cross * (1.0 - mix) / (pop_a * pop_a + pop_b * pop_b + cross * mix)]
    }
}

/// Check that every guess from an equation is usable.
pub(crate) fn check_guesses(equation: &dyn CurveEquation, guesses: &[ParameterGuess]) -> Result<()> {
    if guesses.len() != equation.parameter_names().len() {
        return Err(PeakFitError::DimensionMismatch(format!(
            "{} produced {} guesses for {} parameters",
            equation.name(),
            guesses.len(),
            equation.parameter_names().len()
        )));
    }
    for (i, guess) in guesses.iter().enumerate() {
        guess.validate(i)?;
    }
    Ok(())
}
