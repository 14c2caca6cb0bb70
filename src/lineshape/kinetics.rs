//! Closed-form amplitude models across delay planes.
//!
//! - [`exp_decay`]: single exponential toward a floor
//! - [`zz_amplitude`]: two-state exchange with one relaxation rate
//! - [`zz_amplitude2`]: two-state exchange with independent rates per state
//!
//! The exchange models return the fraction of the equilibrium magnetization
//! observed in one of four signals: the two auto peaks (AA, BB) and the two
//! exchange cross peaks (AB, BA).

use serde::{Deserialize, Serialize};

use crate::parameters::{KineticsKind, ParameterGuess};

/// Which of the four exchange signals an amplitude belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeRole {
    AA,
    BB,
    AB,
    BA,
}

impl ExchangeRole {
    /// Role of the signal at `index` in an exchange group (AA, BB, AB, BA order).
    pub fn from_index(index: usize) -> Self {
        match index % 4 {
            0 => ExchangeRole::AA,
            1 => ExchangeRole::BB,
            2 => ExchangeRole::AB,
            _ => ExchangeRole::BA,
        }
    }
}

/// `(a - floor) · e^{-rate·t} + floor`
pub fn exp_decay(amplitude: f64, rate: f64, floor: f64, delay: f64) -> f64 {
    (amplitude - floor) * (-rate * delay).exp() + floor
}

/// Two-state exchange amplitude with a shared relaxation rate.
///
/// Forward and backward rates follow from detailed balance:
/// `kAB = kEx · pB`, `kBA = kEx · pA`.
///
/// # Arguments
///
/// * `r1` - Longitudinal relaxation rate of both states
/// * `pop_a` - Equilibrium population of state A
/// * `k_ex` - Exchange rate `kAB + kBA`
/// * `delay` - Mixing time
/// * `role` - Which signal to evaluate
pub fn zz_amplitude(r1: f64, pop_a: f64, k_ex: f64, delay: f64, role: ExchangeRole) -> f64 {
    let pop_b = 1.0 - pop_a;
    let relax = (-r1 * delay).exp();
    let mix = (-k_ex * delay).exp();
    match role {
        ExchangeRole::AA => pop_a * (pop_a + pop_b * mix) * relax,
        ExchangeRole::BB => pop_b * (pop_b + pop_a * mix) * relax,
        ExchangeRole::AB | ExchangeRole::BA => pop_a * pop_b * (1.0 - mix) * relax,
    }
}

/// Two-state exchange amplitude with independent relaxation and exchange rates.
///
/// Solved through the eigenvalues λ1 ≥ λ2 of the rate matrix
/// `[[R1A + kAB, -kBA], [-kAB, R1B + kBA]]`.
pub fn zz_amplitude2(
    r1a: f64,
    r1b: f64,
    kab: f64,
    kba: f64,
    pop_a: f64,
    delay: f64,
    role: ExchangeRole,
) -> f64 {
    let pop_b = 1.0 - pop_a;
    let a11 = r1a + kab;
    let a22 = r1b + kba;
    let root = ((a11 - a22).powi(2) + 4.0 * kab * kba).sqrt();
    let lambda1 = 0.5 * (a11 + a22 + root);
    let lambda2 = 0.5 * (a11 + a22 - root);
    let e1 = (-lambda1 * delay).exp();
    let e2 = (-lambda2 * delay).exp();

    if root <= 1e-12 * (a11.abs() + a22.abs()).max(f64::MIN_POSITIVE) {
        // Coincident eigenvalues: limit of the expressions below
        let lambda = 0.5 * (a11 + a22);
        let e = (-lambda * delay).exp();
        return match role {
            ExchangeRole::AA => pop_a * e * (1.0 + delay * (lambda - a11)),
            ExchangeRole::BB => pop_b * e * (1.0 + delay * (lambda - a22)),
            ExchangeRole::AB => pop_a * kab * delay * e,
            ExchangeRole::BA => pop_b * kba * delay * e,
        };
    }

    match role {
        ExchangeRole::AA => pop_a * (-(lambda2 - a11) * e1 + (lambda1 - a11) * e2) / root,
        ExchangeRole::BB => pop_b * (-(lambda2 - a22) * e1 + (lambda1 - a22) * e2) / root,
        ExchangeRole::AB => pop_a * kab * (e2 - e1) / root,
        ExchangeRole::BA => pop_b * kba * (e2 - e1) / root,
    }
}

/// Starting values and bounds for the kinetic parameters of a lattice fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KineticGuesses {
    /// Decay rate of each signal. Default: 1.0 in [0, 50]
    pub decay_rate: ParameterGuess,

    /// Floor bounds as a fraction of the measured amplitude. Default: 0.5
    pub floor_fraction: f64,

    /// Shared relaxation rate. Default: 1.0 in [0.01, 50]
    pub r1: ParameterGuess,

    /// Population of state A. Default: 0.5 in [0.01, 0.99]
    pub pop_a: ParameterGuess,

    /// Exchange rate. Default: 5.0 in [0.01, 500]
    pub k_ex: ParameterGuess,

    /// Forward/backward rates of the general model. Default: 2.5 in [0.005, 250]
    pub k_directional: ParameterGuess,
}

impl Default for KineticGuesses {
    fn default() -> Self {
        Self {
            decay_rate: ParameterGuess::new(1.0, 0.0, 50.0),
            floor_fraction: 0.5,
            r1: ParameterGuess::new(1.0, 0.01, 50.0),
            pop_a: ParameterGuess::new(0.5, 0.01, 0.99),
            k_ex: ParameterGuess::new(5.0, 0.01, 500.0),
            k_directional: ParameterGuess::new(2.5, 0.005, 250.0),
        }
    }
}

impl KineticGuesses {
    /// Guesses for the shared exchange block, in layout order.
    pub fn exchange_block(&self, kind: KineticsKind) -> Vec<ParameterGuess> {
        match kind {
            KineticsKind::Exchange => vec![self.r1, self.pop_a, self.k_ex],
            KineticsKind::GeneralExchange => vec![
                self.r1,
                self.r1,
                self.k_directional,
                self.k_directional,
                self.pop_a,
            ],
            KineticsKind::None | KineticsKind::Decay => Vec::new(),
        }
    }

    /// Decay rate and floor guesses for a signal of measured amplitude `amplitude`.
    pub fn decay_block(&self, amplitude: f64) -> [ParameterGuess; 2] {
        let span = (self.floor_fraction * amplitude.abs()).max(f64::EPSILON);
        [self.decay_rate, ParameterGuess::new(0.0, -span, span)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ROLES: [ExchangeRole; 4] = [
        ExchangeRole::AA,
        ExchangeRole::BB,
        ExchangeRole::AB,
        ExchangeRole::BA,
    ];

    #[test]
    fn test_exp_decay() {
        assert_relative_eq!(exp_decay(10.0, 2.0, 1.0, 0.0), 10.0);
        assert_relative_eq!(exp_decay(10.0, 2.0, 1.0, 1e6), 1.0);
        assert_relative_eq!(exp_decay(10.0, 1.0, 0.0, 1.0), 10.0 / std::f64::consts::E);
    }

    #[test]
    fn test_zero_delay_gives_populations() {
        let pop_a = 0.7;
        let single: Vec<f64> = ROLES
            .iter()
            .map(|&r| zz_amplitude(1.3, pop_a, 8.0, 0.0, r))
            .collect();
        let general: Vec<f64> = ROLES
            .iter()
            .map(|&r| zz_amplitude2(1.3, 2.1, 3.0, 5.0, pop_a, 0.0, r))
            .collect();
        for amps in [single, general] {
            assert_relative_eq!(amps[0], pop_a, epsilon = 1e-12);
            assert_relative_eq!(amps[1], 1.0 - pop_a, epsilon = 1e-12);
            assert_relative_eq!(amps[2], 0.0, epsilon = 1e-12);
            assert_relative_eq!(amps[3], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_general_model_reduces_to_single_rate() {
        let (r1, pop_a, k_ex) = (1.5, 0.35, 6.0);
        let pop_b = 1.0 - pop_a;
        for t in [0.01, 0.1, 0.4, 1.2] {
            for &role in &ROLES {
                let single = zz_amplitude(r1, pop_a, k_ex, t, role);
                let general = zz_amplitude2(r1, r1, k_ex * pop_b, k_ex * pop_a, pop_a, t, role);
                assert_relative_eq!(single, general, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_coincident_eigenvalues() {
        // No exchange and equal relaxation: both signals just relax
        let t = 0.5;
        let aa = zz_amplitude2(2.0, 2.0, 0.0, 0.0, 0.4, t, ExchangeRole::AA);
        assert_relative_eq!(aa, 0.4 * (-1.0f64).exp(), epsilon = 1e-12);
        let ab = zz_amplitude2(2.0, 2.0, 0.0, 0.0, 0.4, t, ExchangeRole::AB);
        assert_relative_eq!(ab, 0.0);
    }

    #[test]
    fn test_cross_peaks_build_up_then_decay() {
        let early = zz_amplitude(1.0, 0.5, 10.0, 0.05, ExchangeRole::AB);
        let middle = zz_amplitude(1.0, 0.5, 10.0, 0.4, ExchangeRole::AB);
        let late = zz_amplitude(1.0, 0.5, 10.0, 6.0, ExchangeRole::AB);
        assert!(early < middle);
        assert!(late < middle);
    }

    #[test]
    fn test_exchange_block_lengths() {
        let guesses = KineticGuesses::default();
        for kind in [
            KineticsKind::None,
            KineticsKind::Decay,
            KineticsKind::Exchange,
            KineticsKind::GeneralExchange,
        ] {
            assert_eq!(guesses.exchange_block(kind).len(), kind.exchange_len());
        }
    }
}
