//! Access to measured intensities on the lattice.

use std::collections::HashSet;

use ndarray::{ArrayD, IxDyn};

use crate::error::{PeakFitError, Result};
use crate::grouping::Region;

/// Source of measured intensities for a fit.
///
/// Positions are absolute lattice coordinates, one entry per dimension.
pub trait IntensityProvider {
    /// Number of spectral dimensions.
    fn dimension_count(&self) -> usize;

    /// Number of delay planes.
    fn plane_count(&self) -> usize;

    /// Intensities at `positions` in `plane`.
    fn intensities(&self, positions: &[Vec<i64>], plane: usize) -> Result<Vec<f64>>;

    /// Whether `position` lies inside the measured data.
    fn contains(&self, position: &[i64]) -> bool;

    /// Whether `position` was acquired. Every point is, unless the data were
    /// sampled non-uniformly.
    fn is_sampled(&self, _position: &[i64]) -> bool {
        true
    }

    /// Measurement noise of `plane`, used to weight residuals when known.
    fn noise_level(&self, _plane: usize) -> Option<f64> {
        None
    }

    /// Positions in `region` near at least one peak.
    ///
    /// A point is kept when it lies in the data, was sampled, and falls inside
    /// the ellipse `Σ ((x - center) / (multiplier · width))² ≤ 1` of some peak.
    ///
    /// # Arguments
    ///
    /// * `region` - Candidate box
    /// * `centers` - Peak centers, one row per peak
    /// * `widths` - Peak widths, one row per peak
    /// * `multiplier` - Scale applied to the widths
    fn filtered_positions(
        &self,
        region: &Region,
        centers: &[Vec<f64>],
        widths: &[Vec<f64>],
        multiplier: f64,
    ) -> Result<Vec<Vec<i64>>> {
        if region.n_dims() != self.dimension_count() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Region has {} dimensions, data have {}",
                region.n_dims(),
                self.dimension_count()
            )));
        }
        if centers.len() != widths.len() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "{} peak centers but {} peak widths",
                centers.len(),
                widths.len()
            )));
        }

        let near_peak = |position: &[i64]| {
            centers.iter().zip(widths.iter()).any(|(center, width)| {
                let distance: f64 = position
                    .iter()
                    .zip(center.iter().zip(width.iter()))
                    .map(|(&x, (&c, &w))| {
                        let scaled = (x as f64 - c) / (multiplier * w);
                        scaled * scaled
                    })
                    .sum();
                distance <= 1.0
            })
        };

        Ok(region
            .positions()
            .into_iter()
            .filter(|p| self.contains(p) && self.is_sampled(p) && near_peak(p))
            .collect())
    }
}

/// Non-uniform sampling schedule over a subset of dimensions.
///
/// Only positions whose coordinates in `dims` appear in the schedule were
/// acquired.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSchedule {
    dims: Vec<usize>,
    points: HashSet<Vec<i64>>,
}

impl SampleSchedule {
    pub fn new(dims: Vec<usize>, points: Vec<Vec<i64>>) -> Result<Self> {
        if let Some(bad) = points.iter().find(|p| p.len() != dims.len()) {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Schedule point {:?} does not match {} scheduled dimensions",
                bad,
                dims.len()
            )));
        }
        Ok(Self {
            dims,
            points: points.into_iter().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn contains(&self, position: &[i64]) -> bool {
        let key: Vec<i64> = self
            .dims
            .iter()
            .map(|&d| position.get(d).copied().unwrap_or(i64::MIN))
            .collect();
        self.points.contains(&key)
    }
}

/// In-memory intensities, one array per delay plane.
#[derive(Debug, Clone)]
pub struct GridIntensities {
    planes: Vec<ArrayD<f64>>,
    schedule: Option<SampleSchedule>,
    noise: Option<f64>,
}

impl GridIntensities {
    /// Create a provider from planes of identical shape.
    pub fn new(planes: Vec<ArrayD<f64>>) -> Result<Self> {
        let first = planes
            .first()
            .ok_or_else(|| PeakFitError::InvalidInput("No intensity planes".to_string()))?;
        if planes.iter().any(|p| p.shape() != first.shape()) {
            return Err(PeakFitError::DimensionMismatch(
                "Intensity planes differ in shape".to_string(),
            ));
        }
        Ok(Self {
            planes,
            schedule: None,
            noise: None,
        })
    }

    /// Restrict the data to a non-uniform sampling schedule.
    pub fn with_schedule(mut self, schedule: SampleSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Known noise level of every plane.
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = Some(noise);
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.planes[0].shape()
    }

    fn index(&self, position: &[i64]) -> Option<Vec<usize>> {
        if position.len() != self.shape().len() {
            return None;
        }
        position
            .iter()
            .zip(self.shape().iter())
            .map(|(&p, &n)| if p >= 0 && (p as usize) < n { Some(p as usize) } else { None })
            .collect()
    }
}

impl IntensityProvider for GridIntensities {
    fn dimension_count(&self) -> usize {
        self.shape().len()
    }

    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn intensities(&self, positions: &[Vec<i64>], plane: usize) -> Result<Vec<f64>> {
        let data = self.planes.get(plane).ok_or_else(|| {
            PeakFitError::InvalidInput(format!(
                "Plane {} requested, data have {}",
                plane,
                self.planes.len()
            ))
        })?;
        positions
            .iter()
            .map(|position| {
                self.index(position)
                    .map(|index| data[IxDyn(&index)])
                    .ok_or_else(|| {
                        PeakFitError::InvalidInput(format!(
                            "Position {:?} outside data of shape {:?}",
                            position,
                            self.shape()
                        ))
                    })
            })
            .collect()
    }

    fn contains(&self, position: &[i64]) -> bool {
        self.index(position).is_some()
    }

    fn is_sampled(&self, position: &[i64]) -> bool {
        self.schedule.as_ref().map_or(true, |s| s.contains(position))
    }

    fn noise_level(&self, _plane: usize) -> Option<f64> {
        self.noise
    }
}
