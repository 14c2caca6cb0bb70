//! Initial guesses, bounds and sync constraints for a group fit.

use serde::{Deserialize, Serialize};

use crate::error::{PeakFitError, Result};
use crate::lineshape::KineticGuesses;
use crate::parameters::{KineticsKind, ParameterGuess, ParameterLayout, ParameterSpace, SyncConstraint};

use super::{FitGroup, Peak, Region};

/// Amplitude bound factors for a positive measured intensity.
const POSITIVE_AMPLITUDE: (f64, f64) = (0.1, 3.5);

/// Amplitude bound factors for a negative measured intensity.
const NEGATIVE_AMPLITUDE: (f64, f64) = (1.5, 0.5);

/// Width bound factors relative to the measured linewidth.
const WIDTH_RANGE: (f64, f64) = (0.2, 2.0);

/// Baseline bound as a fraction of the largest absolute intensity in the data.
const BASELINE_FRACTION: f64 = 0.1;

/// How a group's parameter vector is assembled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuessOptions {
    /// Kinetic submodel of the amplitudes
    pub kinetics: KineticsKind,

    /// Starting values and bounds of kinetic parameters
    pub kinetic_guesses: KineticGuesses,

    /// Dimension in which every peak shares the first peak's width and position
    pub constrained_dim: Option<usize>,

    /// Whether the baseline floats
    pub fit_baseline: bool,
}

/// Layout and parameter space of one group fit.
#[derive(Debug, Clone)]
pub struct GroupGuesses {
    pub layout: ParameterLayout,
    pub space: ParameterSpace,
}

fn amplitude_guess(intensity: f64, data_max: f64) -> ParameterGuess {
    if intensity > 0.0 {
        ParameterGuess::new(
            intensity,
            POSITIVE_AMPLITUDE.0 * intensity,
            POSITIVE_AMPLITUDE.1 * intensity,
        )
    } else if intensity < 0.0 {
        ParameterGuess::new(
            intensity,
            NEGATIVE_AMPLITUDE.0 * intensity,
            NEGATIVE_AMPLITUDE.1 * intensity,
        )
    } else {
        let span = data_max.max(f64::EPSILON);
        ParameterGuess::new(0.0, -span, span)
    }
}

/// Build the guesses of a group fit.
///
/// # Arguments
///
/// * `peaks` - All peaks; the group refers to them by index
/// * `group` - The peaks fit together
/// * `window` - Fit window; positions are relative to its lower corner
/// * `options` - Kinetics, constrained dimension and baseline handling
/// * `data_max` - Largest absolute intensity in the window's data
///
/// # Errors
///
/// * `InvalidInput` for non-positive widths or bounds
/// * `InvalidConfig` for an exchange fit on a group without exactly four peaks,
///   or a constrained dimension out of range
pub fn build_guesses(
    peaks: &[Peak],
    group: &FitGroup,
    window: &Region,
    options: &GuessOptions,
    data_max: f64,
) -> Result<GroupGuesses> {
    let n_dims = window.n_dims();
    let n_signals = group.len();
    if n_signals == 0 {
        return Err(PeakFitError::InvalidInput("Empty fit group".to_string()));
    }
    if options.kinetics.is_exchange() && n_signals != 4 {
        return Err(PeakFitError::InvalidConfig(format!(
            "Exchange fits need four peaks (AA, BB, AB, BA), group has {}",
            n_signals
        )));
    }
    if let Some(dim) = options.constrained_dim {
        if dim >= n_dims {
            return Err(PeakFitError::InvalidConfig(format!(
                "Constrained dimension {} out of range for {} dimensions",
                dim, n_dims
            )));
        }
    }

    let layout = ParameterLayout::new(n_signals, n_dims, options.kinetics);
    let mut guesses = vec![ParameterGuess::fixed(0.0); layout.len()];
    let mut syncs = Vec::new();

    let baseline_span = (BASELINE_FRACTION * data_max).max(f64::EPSILON);
    guesses[layout.baseline()] =
        ParameterGuess::new(0.0, -baseline_span, baseline_span).with_floating(options.fit_baseline);

    let exchange = options.kinetic_guesses.exchange_block(options.kinetics);
    for (i, guess) in exchange.into_iter().enumerate() {
        if let Some(index) = layout.exchange(i) {
            guesses[index] = guess;
        }
    }

    for (signal, &peak_index) in group.peaks.iter().enumerate() {
        let peak = peaks.get(peak_index).ok_or_else(|| {
            PeakFitError::InvalidInput(format!("Group refers to missing peak {}", peak_index))
        })?;
        if peak.n_dims() != n_dims {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Peak {} has {} dimensions, window has {}",
                peak.id,
                peak.n_dims(),
                n_dims
            )));
        }

        let amplitude = layout.amplitude(signal);
        if options.kinetics.is_exchange() {
            // One shared scale; the exchange model splits it between the signals
            if signal == 0 {
                let pop_a = options.kinetic_guesses.pop_a.value.max(f64::EPSILON);
                guesses[amplitude] = amplitude_guess(peak.intensity / pop_a, data_max);
            } else {
                guesses[amplitude] = ParameterGuess::fixed(guesses[layout.amplitude(0)].value);
                syncs.push(SyncConstraint::new(layout.amplitude(0), amplitude));
            }
        } else {
            guesses[amplitude] = amplitude_guess(peak.intensity, data_max);
        }

        if let (Some(rate), Some(floor)) = (layout.decay_rate(signal), layout.decay_floor(signal)) {
            let [rate_guess, floor_guess] = options.kinetic_guesses.decay_block(peak.intensity);
            guesses[rate] = rate_guess;
            guesses[floor] = floor_guess;
        }

        for (dim, peak_dim) in peak.dims.iter().enumerate() {
            if !(peak_dim.width > 0.0) || !(peak_dim.bounds > 0.0) {
                return Err(PeakFitError::InvalidInput(format!(
                    "Peak {} dimension {} needs positive width and bounds, got {} and {}",
                    peak.id, dim, peak_dim.width, peak_dim.bounds
                )));
            }
            let width = layout.width(signal, dim);
            let position = layout.position(signal, dim);

            if signal > 0 && options.constrained_dim == Some(dim) {
                let anchor_width = layout.width(0, dim);
                let anchor_position = layout.position(0, dim);
                guesses[width] = ParameterGuess::fixed(guesses[anchor_width].value);
                guesses[position] = ParameterGuess::fixed(guesses[anchor_position].value);
                syncs.push(SyncConstraint::new(anchor_width, width));
                syncs.push(SyncConstraint::new(anchor_position, position));
                continue;
            }

            guesses[width] = ParameterGuess::new(
                peak_dim.width,
                WIDTH_RANGE.0 * peak_dim.width,
                WIDTH_RANGE.1 * peak_dim.width,
            );
            let center = peak_dim.shift - window.lower[dim] as f64;
            let half = 0.5 * peak_dim.bounds;
            guesses[position] = ParameterGuess::new(center, center - half, center + half);
        }
    }

    let space = ParameterSpace::new(guesses, syncs)?;
    Ok(GroupGuesses { layout, space })
}
