//! Per-dimension peak shapes.

use std::f64::consts::LN_2;
use std::sync::Arc;

use super::catalog::TabulatedShape;

/// Lorentzian/Gaussian blend at offset `d` from the center.
///
/// The shape is defined as:
/// f(d) = (1 - η) · h² / (h² + d²) + η · exp(-ln2 · d² / h²)
///
/// where `h = width / 2`, so both components fall to one half at `|d| = h`
/// and the blend is 1 at the center.
///
/// # Arguments
///
/// * `offset` - Distance from the peak center in lattice points
/// * `width` - Full width at half maximum in lattice points
/// * `shape_factor` - Gaussian fraction η in `[0, 1]`
pub fn blend(offset: f64, width: f64, shape_factor: f64) -> f64 {
    let h = 0.5 * width;
    if h <= 0.0 {
        return if offset == 0.0 { 1.0 } else { 0.0 };
    }
    let h2 = h * h;
    let d2 = offset * offset;
    let lorentzian = h2 / (h2 + d2);
    if shape_factor <= 0.0 {
        return lorentzian;
    }
    let gaussian = (-LN_2 * d2 / h2).exp();
    (1.0 - shape_factor) * lorentzian + shape_factor * gaussian
}

/// Shape used for one spectral dimension of a lattice model.
#[derive(Debug, Clone)]
pub enum LineShape {
    /// Analytic Lorentzian/Gaussian blend with the given Gaussian fraction.
    Blend { shape_factor: f64 },

    /// Precomputed shape sampled on a grid of width-scaled offsets.
    Tabulated(Arc<TabulatedShape>),
}

impl Default for LineShape {
    fn default() -> Self {
        LineShape::lorentzian()
    }
}

impl LineShape {
    pub fn lorentzian() -> Self {
        LineShape::Blend { shape_factor: 0.0 }
    }

    pub fn gaussian() -> Self {
        LineShape::Blend { shape_factor: 1.0 }
    }

    pub fn blend(shape_factor: f64) -> Self {
        LineShape::Blend {
            shape_factor: shape_factor.clamp(0.0, 1.0),
        }
    }

    /// Shape value at `offset` from a center for a peak of the given width.
    pub fn eval(&self, offset: f64, width: f64) -> f64 {
        match self {
            LineShape::Blend { shape_factor } => blend(offset, width, *shape_factor),
            LineShape::Tabulated(table) => {
                if width <= 0.0 {
                    return if offset == 0.0 { table.eval(0.0) } else { 0.0 };
                }
                table.eval(offset / width)
            }
        }
    }

    pub fn is_tabulated(&self) -> bool {
        matches!(self, LineShape::Tabulated(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unit_height_at_center() {
        for eta in [0.0, 0.3, 1.0] {
            assert_relative_eq!(blend(0.0, 3.0, eta), 1.0);
        }
    }

    #[test]
    fn test_half_height_at_half_width() {
        assert_relative_eq!(blend(1.5, 3.0, 0.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(blend(-1.5, 3.0, 1.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(blend(1.5, 3.0, 0.4), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_gaussian_tails_fall_faster() {
        let l = LineShape::lorentzian().eval(6.0, 3.0);
        let g = LineShape::gaussian().eval(6.0, 3.0);
        assert!(g < l);
    }

    #[test]
    fn test_zero_width() {
        assert_eq!(blend(0.0, 0.0, 0.0), 1.0);
        assert_eq!(blend(0.5, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_blend_factor_is_clamped() {
        assert!(matches!(LineShape::blend(1.7), LineShape::Blend { shape_factor } if shape_factor == 1.0));
    }
}
