//! # Lineshape Model
//!
//! Predicted intensities of overlapping signals on an integer lattice.
//!
//! A signal's intensity is separable across dimensions: its amplitude times
//! the product of one shape value per dimension. The total at a lattice point
//! is a baseline plus the sum over all signals. When the data span several
//! delay planes, the amplitude follows one of the kinetic models in
//! [`kinetics`].
//!
//! ## Example Usage
//!
//! ```rust
//! use peakfit_rs::lineshape::{LatticeData, LatticeModel, LineShape};
//! use peakfit_rs::parameters::{KineticsKind, ParameterLayout};
//! use ndarray::{array, Array2};
//!
//! let coords = Array2::from_shape_fn((5, 1), |(i, _)| i as f64);
//! let data = LatticeData::single_plane(coords, array![0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
//! let layout = ParameterLayout::new(1, 1, KineticsKind::None);
//! let model = LatticeModel::new(layout, vec![LineShape::lorentzian()], data).unwrap();
//!
//! // baseline, amplitude, width, position
//! let predicted = model.predict(&array![0.0, 100.0, 2.0, 2.0]).unwrap();
//! assert_eq!(predicted[2], 100.0);
//! ```

pub mod catalog;
pub mod kinetics;
pub mod model;
pub mod shape;

pub use catalog::{LineshapeCatalog, TabulatedShape};
pub use kinetics::{exp_decay, zz_amplitude, zz_amplitude2, ExchangeRole, KineticGuesses};
pub use model::{LatticeData, LatticeModel};
pub use shape::{blend, LineShape};
