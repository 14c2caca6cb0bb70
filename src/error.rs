use thiserror::Error;

/// Numerical failures an optimizer may hit during a run.
///
/// These are expected outcomes of fitting noisy or ill-posed data, not bugs.
/// The optimization engine turns them into an empty result instead of
/// propagating them to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerFailure {
    /// The covariance matrix collapsed (condition number out of range).
    #[error("Degenerate covariance: condition number {0:.3e}")]
    DegenerateCovariance(f64),

    /// The covariance matrix lost positive definiteness.
    #[error("Covariance matrix is not positive definite")]
    NotPositiveDefinite,

    /// The evaluation budget was exhausted before the run finished.
    #[error("Too many evaluations: budget of {0} exceeded")]
    TooManyEvaluations(usize),

    /// The objective returned NaN or infinity at the given evaluation.
    #[error("Non-finite objective value after {0} evaluations")]
    NonFiniteObjective(usize),
}

/// Error types for the peakfit-rs library.
#[derive(Error, Debug)]
pub enum PeakFitError {
    /// Error indicating a mismatch in array or dimension counts.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A floating parameter whose bounds do not span a range.
    #[error("Invalid bounds for parameter {index}: lower ({lower}) must be less than upper ({upper})")]
    InvalidBounds { index: usize, lower: f64, upper: f64 },

    /// A floating parameter whose starting value lies outside its bounds.
    #[error("Parameter {index} value {value} is outside bounds [{lower}, {upper}]")]
    ValueOutsideBounds {
        index: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },

    /// Not enough data points to leave any degrees of freedom.
    #[error("Parameter count mismatch: {data} data points for {free} free parameters")]
    ParameterCount { data: usize, free: usize },

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid fit configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An optimizer failure surfaced where the caller asked for it.
    #[error("Optimization failed: {0}")]
    Optimization(#[from] OptimizerFailure),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for peakfit-rs operations.
pub type Result<T> = std::result::Result<T, PeakFitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PeakFitError::DimensionMismatch("expected 2 dims, got 3".to_string());
        assert!(format!("{}", err).contains("expected 2 dims, got 3"));

        let err = PeakFitError::InvalidBounds {
            index: 4,
            lower: 1.0,
            upper: 1.0,
        };
        assert!(format!("{}", err).contains("parameter 4"));

        let err = PeakFitError::ParameterCount { data: 3, free: 5 };
        assert!(format!("{}", err).contains("3 data points"));
    }

    #[test]
    fn test_error_conversion() {
        let err: PeakFitError = OptimizerFailure::TooManyEvaluations(100).into();
        match err {
            PeakFitError::Optimization(OptimizerFailure::TooManyEvaluations(n)) => {
                assert_eq!(n, 100)
            }
            _ => panic!("Expected Optimization variant"),
        }

        let json_err = serde_json::from_str::<f64>("not json").unwrap_err();
        let err: PeakFitError = json_err.into();
        assert!(matches!(err, PeakFitError::JsonError(_)));
    }
}
