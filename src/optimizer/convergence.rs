//! Convergence criteria for the optimizers.
//!
//! This module defines the termination states shared by both optimizers and
//! the value checker that compares consecutive best objective values.

/// Possible convergence states for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The run is still going.
    Running,

    /// Consecutive best values agree within the relative/absolute tolerance.
    ValueConvergence,

    /// The search scale collapsed below the parameter tolerance.
    ParameterConvergence,

    /// The recent history of generation bests is flat.
    HistoryConvergence,

    /// The objective dropped below the configured stop value.
    StopFitness,

    /// The iteration cap was reached.
    MaxIterationsReached,
}

impl ConvergenceStatus {
    /// Returns true if the run has terminated.
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// Returns true if the run stopped on a convergence test.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ValueConvergence
                | ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::HistoryConvergence
                | ConvergenceStatus::StopFitness
        )
    }

    /// Returns a description of the convergence status.
    pub fn description(&self) -> &'static str {
        match self {
            ConvergenceStatus::Running => "Optimization is still running",
            ConvergenceStatus::ValueConvergence => "Converged: small objective change",
            ConvergenceStatus::ParameterConvergence => "Converged: small search scale",
            ConvergenceStatus::HistoryConvergence => "Converged: flat objective history",
            ConvergenceStatus::StopFitness => "Converged: objective below stop value",
            ConvergenceStatus::MaxIterationsReached => "Terminated: maximum iterations reached",
        }
    }
}

/// Relative plus absolute stability test on consecutive objective values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueChecker {
    /// Relative tolerance
    pub rel: f64,

    /// Absolute tolerance
    pub abs: f64,
}

impl ValueChecker {
    pub fn new(rel: f64, abs: f64) -> Self {
        Self { rel, abs }
    }

    /// True when `|previous - current| <= max(rel * max(|previous|, |current|), abs)`.
    pub fn converged(&self, previous: f64, current: f64) -> bool {
        let difference = (previous - current).abs();
        let size = previous.abs().max(current.abs());
        difference <= size * self.rel || difference <= self.abs
    }
}
