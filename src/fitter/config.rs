//! Configuration of a peak fitting batch.

use serde::{Deserialize, Serialize};

use crate::error::{PeakFitError, Result};
use crate::grouping::{FitGroup, GuessOptions};
use crate::lineshape::KineticGuesses;
use crate::optimizer::OptimizerConfig;
use crate::parameters::KineticsKind;
use crate::uncertainty::BootstrapConfig;

/// What happens to the peaks after a group is fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitMode {
    /// Write fitted values back to the peaks.
    #[default]
    Update,

    /// Leave the peaks untouched and only return the reports.
    Report,
}

/// How peaks are partitioned into jointly fit groups.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Grouping {
    /// Two-layer transitive footprint overlap.
    #[default]
    Overlap,

    /// Shared resonance assignment in the given dimension.
    Column(usize),

    /// Caller-supplied groups.
    Explicit(Vec<FitGroup>),
}

/// Configuration options for [`PeakFitter`](super::PeakFitter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Update or report. Default: Update
    pub mode: FitMode,

    /// Grouping strategy. Default: Overlap
    pub grouping: Grouping,

    /// Dimension in which all peaks of a group share width and position. Default: None
    pub constrained_dim: Option<usize>,

    /// Kinetic submodel across delay planes. Default: None
    pub kinetics: KineticsKind,

    /// Starting values and bounds of kinetic parameters
    pub kinetic_guesses: KineticGuesses,

    /// Whether the baseline floats. Default: false
    pub fit_baseline: bool,

    /// Scale applied to peak widths when selecting lattice points. Default: 2.0
    pub width_multiplier: f64,

    /// Gaussian fraction of the analytic lineshape. Default: 0.0 (Lorentzian)
    pub shape_factor: f64,

    /// Number of optimizer runs per group, keeping the best. Default: 1
    pub n_tries: usize,

    /// Bootstrap settings; None skips uncertainty estimation. Default: None
    pub bootstrap: Option<BootstrapConfig>,

    /// Optimizer settings
    pub optimizer: OptimizerConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            mode: FitMode::default(),
            grouping: Grouping::default(),
            constrained_dim: None,
            kinetics: KineticsKind::default(),
            kinetic_guesses: KineticGuesses::default(),
            fit_baseline: false,
            width_multiplier: 2.0,
            shape_factor: 0.0,
            n_tries: 1,
            bootstrap: None,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl FitConfig {
    /// Load a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: FitConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.width_multiplier > 0.0) {
            return Err(PeakFitError::InvalidConfig(format!(
                "Width multiplier must be positive, got {}",
                self.width_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.shape_factor) {
            return Err(PeakFitError::InvalidConfig(format!(
                "Shape factor must lie in [0, 1], got {}",
                self.shape_factor
            )));
        }
        if let Some(bootstrap) = &self.bootstrap {
            if bootstrap.n_sim == 0 {
                return Err(PeakFitError::InvalidConfig(
                    "Bootstrap needs at least one iteration".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn with_mode(mut self, mode: FitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_constrained_dim(mut self, dim: usize) -> Self {
        self.constrained_dim = Some(dim);
        self
    }

    pub fn with_kinetics(mut self, kinetics: KineticsKind) -> Self {
        self.kinetics = kinetics;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Guess-building options derived from this configuration.
    pub fn guess_options(&self) -> GuessOptions {
        GuessOptions {
            kinetics: self.kinetics,
            kinetic_guesses: self.kinetic_guesses.clone(),
            constrained_dim: self.constrained_dim,
            fit_baseline: self.fit_baseline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::Strategy;

    #[test]
    fn test_from_json_with_defaults() {
        let json = r#"{
            "mode": "Report",
            "grouping": {"Column": 1},
            "kinetics": "Decay",
            "optimizer": {"strategy": "Local", "seed": 42}
        }"#;
        let config = FitConfig::from_json_str(json).unwrap();
        assert_eq!(config.mode, FitMode::Report);
        assert_eq!(config.grouping, Grouping::Column(1));
        assert_eq!(config.kinetics, KineticsKind::Decay);
        assert_eq!(config.optimizer.strategy, Strategy::Local);
        assert_eq!(config.optimizer.seed, 42);
        assert_eq!(config.optimizer.max_iterations, 2000);
        assert_eq!(config.width_multiplier, 2.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            FitConfig::from_json_str(r#"{"shape_factor": 1.5}"#),
            Err(PeakFitError::InvalidConfig(_))
        ));
        assert!(matches!(
            FitConfig::from_json_str(r#"{"width_multiplier": "wide"}"#),
            Err(PeakFitError::JsonError(_))
        ));
    }
}
