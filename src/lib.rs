//! # peakfit-rs
//!
//! `peakfit-rs` fits analytic peak lineshapes to spectral intensities sampled
//! on an integer lattice, and estimates parameter uncertainty by bootstrap
//! resampling.
//!
//! The library provides:
//! - Grouping of peaks into jointly fit groups by footprint overlap or shared
//!   resonance columns
//! - A multi-signal lineshape model with optional decay or two-state exchange
//!   kinetics across delay planes
//! - Derivative-free bounded optimizers (CMA-ES and a trust-region search)
//!   working in a normalized parameter space with sync constraints
//! - Parallel bootstrap uncertainty estimation
//! - A family of 1-D kinetic curve equations fit through the same machinery
//!
//! ## Basic Usage
//!
//! ```
//! use peakfit_rs::{OptimizationEngine, ParameterGuess, ParameterSpace, Problem, Result};
//! use ndarray::Array1;
//!
//! // y = a * x, observed at x = 0..5 with a = 3
//! struct Line;
//!
//! impl Problem for Line {
//!     fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
//!         Ok(Array1::from_iter((0..6).map(|x| params[0] * x as f64 - 3.0 * x as f64)))
//!     }
//!
//!     fn parameter_count(&self) -> usize {
//!         1
//!     }
//!
//!     fn residual_count(&self) -> usize {
//!         6
//!     }
//! }
//!
//! let space = ParameterSpace::new(vec![ParameterGuess::new(1.0, 0.0, 10.0)], vec![]).unwrap();
//! let fit = OptimizationEngine::default().fit(&Line, &space).unwrap().unwrap();
//! assert!((fit.point[0] - 3.0).abs() < 1e-6);
//! ```

pub mod curve;
pub mod error;
pub mod fitter;
pub mod grouping;
pub mod lineshape;
pub mod optimizer;
pub mod parameters;
pub mod problem;
pub mod uncertainty;

// Re-exports for convenience
pub use error::{OptimizerFailure, PeakFitError, Result};
pub use fitter::{FitConfig, GroupOutcome, GroupReport, PeakFitter};
pub use optimizer::{FitResult, OptimizationEngine, OptimizerConfig};
pub use parameters::{ParameterGuess, ParameterSpace, SyncConstraint};
pub use problem::{CostMode, Problem};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
