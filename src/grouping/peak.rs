//! The numeric peak attributes read and written by the fitter.

use serde::{Deserialize, Serialize};

/// One spectral dimension of a peak, in lattice points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDim {
    /// Center position
    pub shift: f64,

    /// Uncertainty of `shift`
    #[serde(default)]
    pub shift_err: f64,

    /// Full width at half maximum
    pub width: f64,

    /// Uncertainty of `width`
    #[serde(default)]
    pub width_err: f64,

    /// Full extent of the peak's footprint
    pub bounds: f64,

    /// Resonance assignment in this dimension, used for column grouping
    #[serde(default)]
    pub resonance: Option<u32>,
}

impl PeakDim {
    pub fn new(shift: f64, width: f64, bounds: f64) -> Self {
        Self {
            shift,
            shift_err: 0.0,
            width,
            width_err: 0.0,
            bounds,
            resonance: None,
        }
    }

    pub fn with_resonance(mut self, resonance: u32) -> Self {
        self.resonance = Some(resonance);
        self
    }

    /// Lowest coordinate covered by the footprint.
    pub fn lower(&self) -> f64 {
        self.shift - 0.5 * self.bounds
    }

    /// Highest coordinate covered by the footprint.
    pub fn upper(&self) -> f64 {
        self.shift + 0.5 * self.bounds
    }
}

/// A named fitted value with optional uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedValue {
    pub name: String,
    pub value: f64,
    pub error: Option<f64>,
}

/// A peak as seen by the fitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Caller-assigned identifier
    pub id: usize,

    /// Peak height
    pub intensity: f64,

    /// Uncertainty of `intensity`
    #[serde(default)]
    pub intensity_err: f64,

    /// One entry per spectral dimension
    pub dims: Vec<PeakDim>,

    /// Fitted kinetic parameters (decay or exchange) when a multi-plane fit ran
    #[serde(default)]
    pub relaxation: Option<Vec<FittedValue>>,
}

impl Peak {
    pub fn new(id: usize, intensity: f64, dims: Vec<PeakDim>) -> Self {
        Self {
            id,
            intensity,
            intensity_err: 0.0,
            dims,
            relaxation: None,
        }
    }

    pub fn n_dims(&self) -> usize {
        self.dims.len()
    }

    /// Whether the footprints of `self` and `other` overlap in every dimension.
    ///
    /// Footprints that only touch do not overlap.
    pub fn overlaps(&self, other: &Peak) -> bool {
        self.dims.len() == other.dims.len()
            && self
                .dims
                .iter()
                .zip(other.dims.iter())
                .all(|(a, b)| a.lower() < b.upper() && b.lower() < a.upper())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(id: usize, shift: f64) -> Peak {
        Peak::new(id, 1.0, vec![PeakDim::new(shift, 2.0, 4.0), PeakDim::new(10.0, 2.0, 4.0)])
    }

    #[test]
    fn test_overlap() {
        assert!(peak(0, 10.0).overlaps(&peak(1, 13.0)));
        assert!(!peak(0, 10.0).overlaps(&peak(1, 14.0)));
        assert!(!peak(0, 10.0).overlaps(&peak(1, 20.0)));
    }

    #[test]
    fn test_overlap_needs_every_dimension() {
        let a = peak(0, 10.0);
        let mut b = peak(1, 11.0);
        b.dims[1].shift = 30.0;
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_serde_defaults() {
        let json = r#"{"id": 3, "intensity": 5.0, "dims": [{"shift": 1.0, "width": 2.0, "bounds": 4.0}]}"#;
        let peak: Peak = serde_json::from_str(json).unwrap();
        assert_eq!(peak.dims[0].resonance, None);
        assert_eq!(peak.relaxation, None);
    }
}
