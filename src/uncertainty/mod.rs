//! # Uncertainty Estimation
//!
//! Parameter uncertainty by bootstrap resampling. The same estimator serves
//! lattice fits and 1-D curve fits: anything implementing [`Resample`] can be
//! resampled, and a caller-supplied closure turns each resample into a
//! [`Problem`](crate::problem::Problem) that is refit from the best point.
//!
//! An estimate is published only when at least
//! [`BootstrapConfig::min_successes`] iterations converged (all of them by
//! default). Failed iterations are dropped, never imputed.

pub mod bootstrap;

pub use bootstrap::{
    task_seed, BootstrapConfig, BootstrapEstimator, BootstrapResult, PercentileInterval, Resample,
};
