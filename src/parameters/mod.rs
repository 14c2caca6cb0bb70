//! # Parameter Space
//!
//! Bounded parameter guesses, their linear normalization onto `[0, 100]`,
//! sync constraints between entries, and the structured layout of the flat
//! parameter vector used by lattice fits.
//!
//! ## Core Components
//!
//! - [`ParameterGuess`]: value, bounds and floating flag of one parameter
//! - [`SyncConstraint`]: forced equality `params[to] = params[from]`
//! - [`ParameterLayout`]: named blocks (baseline, exchange, amplitude, decay, width, position)
//! - [`ParameterSpace`]: the floating sub-space an optimizer works in
//!
//! ## Example Usage
//!
//! ```rust
//! use peakfit_rs::parameters::{ParameterGuess, ParameterSpace, SyncConstraint};
//! use ndarray::array;
//!
//! let space = ParameterSpace::new(
//!     vec![
//!         ParameterGuess::new(3.0, 1.0, 6.0),
//!         ParameterGuess::fixed(3.0),
//!     ],
//!     vec![SyncConstraint::new(0, 1)],
//! )
//! .unwrap();
//!
//! let full = space.expand(&array![60.0]);
//! assert_eq!(full[0], full[1]);
//! ```

pub mod bounds;
pub mod layout;
pub mod space;
pub mod sync;

// Re-export key types
pub use bounds::{clamp_guess, denormalize, normalize, ParameterGuess, NORMALIZED_SPAN};
pub use layout::{DimBlock, KineticsKind, ParameterLayout, SignalBlock};
pub use space::{BoundedProblem, ParameterSpace};
pub use sync::{apply_sync, SyncConstraint};
