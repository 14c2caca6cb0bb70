//! # Peak Fitter
//!
//! Drives a batch of group fits: groups the peaks, selects lattice points
//! near each group, builds guesses, fits the lineshape model, optionally
//! bootstraps the result, and writes the fitted values back to the peaks.
//!
//! Every group produces a [`GroupReport`]. A group without usable lattice
//! points, whose data or guesses are unusable, or whose fit fails leaves its
//! peaks untouched; the batch continues with the next group.
//!
//! ## Example Usage
//!
//! ```rust
//! use peakfit_rs::fitter::{FitConfig, GridIntensities, GroupOutcome, PeakFitter};
//! use peakfit_rs::grouping::{Peak, PeakDim};
//! use peakfit_rs::lineshape::blend;
//! use ndarray::Array1;
//!
//! let plane = Array1::from_shape_fn(21, |i| 50.0 * blend(i as f64 - 10.0, 3.0, 0.0)).into_dyn();
//! let provider = GridIntensities::new(vec![plane]).unwrap();
//! let mut peaks = vec![Peak::new(0, 40.0, vec![PeakDim::new(10.4, 2.5, 6.0)])];
//!
//! let fitter = PeakFitter::new(FitConfig::default());
//! let reports = fitter.fit_peaks(&mut peaks, &provider, None).unwrap();
//! assert_eq!(reports[0].outcome, GroupOutcome::Fitted);
//! assert!((peaks[0].intensity - 50.0).abs() < 0.5);
//! ```

pub mod config;
pub mod provider;

use log::{debug, info, warn};
use ndarray::{Array1, Array2};

use crate::error::{PeakFitError, Result};
use crate::grouping::{
    build_guesses, fit_window, group_by_column, group_by_overlap, FitGroup, FittedValue, Peak,
    Region,
};
use crate::lineshape::{LatticeData, LatticeModel, LineShape, LineshapeCatalog};
use crate::optimizer::{FitResult, OptimizationEngine, Strategy};
use crate::parameters::{KineticsKind, ParameterLayout};
use crate::uncertainty::{BootstrapEstimator, BootstrapResult};

pub use config::{FitConfig, FitMode, Grouping};
pub use provider::{GridIntensities, IntensityProvider, SampleSchedule};

/// How a group fit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    /// The fit converged.
    Fitted,

    /// No lattice point passed the filter; nothing was fit.
    NoPositions,

    /// The optimizer failed; the peaks are unchanged.
    Failed,

    /// The group's data or guesses were unusable; see [`GroupReport::error`].
    Rejected,
}

/// A fitted parameter with its bootstrap uncertainty.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterReport {
    pub name: String,
    pub value: f64,
    pub error: Option<f64>,
}

/// Result of fitting one group.
#[derive(Debug, Clone)]
pub struct GroupReport {
    /// Peaks in the group
    pub group: FitGroup,

    /// Lattice window of the fit
    pub window: Option<Region>,

    pub outcome: GroupOutcome,

    /// Every model parameter, positions relative to the window origin
    pub parameters: Vec<ParameterReport>,

    /// Objective value at the optimum
    pub objective: Option<f64>,

    /// Data rows used (points times planes)
    pub n_points: usize,

    /// Successful bootstrap iterations, when uncertainty was estimated
    pub bootstrap_successes: Option<usize>,

    /// Why a rejected group could not be fit
    pub error: Option<String>,
}

impl GroupReport {
    fn empty(group: FitGroup, window: Option<Region>, outcome: GroupOutcome, n_points: usize) -> Self {
        Self {
            group,
            window,
            outcome,
            parameters: Vec::new(),
            objective: None,
            n_points,
            bootstrap_successes: None,
            error: None,
        }
    }

    fn rejected(group: FitGroup, error: &PeakFitError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(group, None, GroupOutcome::Rejected, 0)
        }
    }

    /// Value of the parameter called `name`.
    pub fn parameter(&self, name: &str) -> Option<&ParameterReport> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Fits groups of peaks against lattice intensities.
#[derive(Debug, Clone, Default)]
pub struct PeakFitter {
    config: FitConfig,
    catalog: Option<LineshapeCatalog>,
}

impl PeakFitter {
    pub fn new(config: FitConfig) -> Self {
        Self {
            config,
            catalog: None,
        }
    }

    /// Use tabulated lineshapes; fits then run the trust-region optimizer.
    pub fn with_catalog(mut self, catalog: LineshapeCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Partition `peaks` according to the configured grouping.
    pub fn groups(&self, peaks: &[Peak]) -> Result<Vec<FitGroup>> {
        match &self.config.grouping {
            Grouping::Overlap => Ok(group_by_overlap(peaks)),
            Grouping::Column(dim) => group_by_column(peaks, *dim),
            Grouping::Explicit(groups) => {
                if let Some(bad) = groups
                    .iter()
                    .flat_map(|g| g.peaks.iter())
                    .find(|&&i| i >= peaks.len())
                {
                    return Err(PeakFitError::InvalidInput(format!(
                        "Group refers to missing peak {}",
                        bad
                    )));
                }
                Ok(groups.clone())
            }
        }
    }

    /// Fit every group of `peaks`.
    ///
    /// # Arguments
    ///
    /// * `peaks` - Peaks to fit; updated in place in [`FitMode::Update`]
    /// * `provider` - Measured intensities
    /// * `delays` - Delay of each plane; required for kinetic fits
    ///
    /// # Returns
    ///
    /// * One report per group, in grouping order
    ///
    /// # Errors
    ///
    /// Only problems of the whole batch are errors: an invalid configuration,
    /// missing or mismatched delays, noise levels known for some planes but
    /// not others, or groups that cannot be formed. Errors inside one group
    /// produce a [`GroupOutcome::Rejected`] report instead.
    pub fn fit_peaks<I: IntensityProvider + ?Sized>(
        &self,
        peaks: &mut [Peak],
        provider: &I,
        delays: Option<&[f64]>,
    ) -> Result<Vec<GroupReport>> {
        self.config.validate()?;
        let delays = self.plane_delays(provider, delays)?;
        let noise = plane_noise(provider)?;
        let groups = self.groups(peaks)?;

        let mut reports = Vec::with_capacity(groups.len());
        for group in groups {
            let (report, updates) =
                match self.fit_group(peaks, &group, provider, &delays, noise.as_deref()) {
                    Ok(fitted) => fitted,
                    Err(e) => (GroupReport::rejected(group.clone(), &e), Vec::new()),
                };
            match report.outcome {
                GroupOutcome::Fitted => {}
                GroupOutcome::NoPositions => {
                    warn!("Group {:?}: no lattice positions, skipped", group.peaks)
                }
                GroupOutcome::Failed => warn!("Group {:?}: fit failed, peaks unchanged", group.peaks),
                GroupOutcome::Rejected => warn!(
                    "Group {:?}: {}, peaks unchanged",
                    group.peaks,
                    report.error.as_deref().unwrap_or("rejected")
                ),
            }
            if self.config.mode == FitMode::Update {
                for (index, peak) in updates {
                    peaks[index] = peak;
                }
            }
            reports.push(report);
        }

        let fitted = reports
            .iter()
            .filter(|r| r.outcome == GroupOutcome::Fitted)
            .count();
        info!(
            "Fit {} groups: {} fitted, {} skipped or failed",
            reports.len(),
            fitted,
            reports.len() - fitted
        );
        Ok(reports)
    }

    fn plane_delays<I: IntensityProvider + ?Sized>(
        &self,
        provider: &I,
        delays: Option<&[f64]>,
    ) -> Result<Vec<f64>> {
        match delays {
            Some(delays) => {
                if delays.len() != provider.plane_count() {
                    return Err(PeakFitError::DimensionMismatch(format!(
                        "{} delays for {} planes",
                        delays.len(),
                        provider.plane_count()
                    )));
                }
                Ok(delays.to_vec())
            }
            None if self.config.kinetics != KineticsKind::None => Err(PeakFitError::InvalidConfig(
                "Kinetic fits need the delay of every plane".to_string(),
            )),
            None => Ok(vec![0.0]),
        }
    }

    /// Fit one group; returns the report and the updated copies of its peaks.
    fn fit_group<I: IntensityProvider + ?Sized>(
        &self,
        peaks: &[Peak],
        group: &FitGroup,
        provider: &I,
        delays: &[f64],
        noise: Option<&[f64]>,
    ) -> Result<(GroupReport, Vec<(usize, Peak)>)> {
        let window = fit_window(peaks, group)?;
        let centers: Vec<Vec<f64>> = group
            .peaks
            .iter()
            .map(|&i| peaks[i].dims.iter().map(|d| d.shift).collect())
            .collect();
        let widths: Vec<Vec<f64>> = group
            .peaks
            .iter()
            .map(|&i| peaks[i].dims.iter().map(|d| d.width).collect())
            .collect();
        let positions =
            provider.filtered_positions(&window, &centers, &widths, self.config.width_multiplier)?;
        if positions.is_empty() {
            return Ok((
                GroupReport::empty(group.clone(), Some(window), GroupOutcome::NoPositions, 0),
                Vec::new(),
            ));
        }

        let data = self.gather(provider, &positions, &window, delays, noise)?;
        let n_points = data.len();
        let guesses = build_guesses(
            peaks,
            group,
            &window,
            &self.config.guess_options(),
            data.max_abs(),
        )?;
        let shapes = match &self.catalog {
            Some(catalog) => catalog.shapes(window.n_dims())?,
            None => vec![LineShape::blend(self.config.shape_factor); window.n_dims()],
        };
        let weighted = data.errors().is_some();
        let model = LatticeModel::new(guesses.layout.clone(), shapes, data.clone())?.with_weighting(weighted);

        let mut optimizer = self.config.optimizer.clone();
        if self.catalog.is_some() {
            optimizer.strategy = Strategy::Local;
        }
        let engine = OptimizationEngine::new(optimizer);
        let fitted = if self.config.n_tries > 1 {
            engine.fit_with_restarts(&model, &guesses.space, self.config.n_tries)?
        } else {
            engine.run(&model, &guesses.space)?
        };
        let fitted = match fitted {
            Some(fitted) => fitted,
            None => {
                return Ok((
                    GroupReport::empty(group.clone(), Some(window), GroupOutcome::Failed, n_points),
                    Vec::new(),
                ))
            }
        };
        debug!(
            "Group {:?}: objective {:.6e} over {} points after {} evaluations",
            group.peaks, fitted.value, n_points, fitted.evaluations
        );

        let bootstrap = match &self.config.bootstrap {
            Some(config) => BootstrapEstimator::new(config.clone()).estimate(
                &data,
                |sample| Ok(model.with_data(sample)),
                &guesses.space,
                &fitted.point,
                &engine,
            )?,
            None => None,
        };

        let report = self.report(group, &window, &guesses.layout, &fitted, bootstrap.as_ref(), n_points);
        let updates = self.updated_peaks(peaks, group, &window, &model, &fitted, bootstrap.as_ref());
        Ok((report, updates))
    }

    fn gather<I: IntensityProvider + ?Sized>(
        &self,
        provider: &I,
        positions: &[Vec<i64>],
        window: &Region,
        delays: &[f64],
        noise: Option<&[f64]>,
    ) -> Result<LatticeData> {
        let n_dims = window.n_dims();
        let n_points = positions.len();
        let n_rows = n_points * delays.len();
        let mut coords = Array2::zeros((n_rows, n_dims));
        let mut row_delays = Array1::zeros(n_rows);
        let mut values = Array1::zeros(n_rows);

        for (plane, &delay) in delays.iter().enumerate() {
            let intensities = provider.intensities(positions, plane)?;
            for (k, (position, value)) in positions.iter().zip(intensities).enumerate() {
                let row = plane * n_points + k;
                for (d, &x) in position.iter().enumerate() {
                    coords[[row, d]] = (x - window.lower[d]) as f64;
                }
                row_delays[row] = delay;
                values[row] = value;
            }
        }
        let errors = noise.map(|levels| Array1::from_shape_fn(n_rows, |row| levels[row / n_points]));
        LatticeData::new(coords, row_delays, values, errors)
    }

    fn report(
        &self,
        group: &FitGroup,
        window: &Region,
        layout: &ParameterLayout,
        fitted: &FitResult,
        bootstrap: Option<&BootstrapResult>,
        n_points: usize,
    ) -> GroupReport {
        let parameters = layout
            .names()
            .into_iter()
            .enumerate()
            .map(|(i, name)| ParameterReport {
                name,
                value: fitted.point[i],
                error: bootstrap.map(|b| b.std_devs[i]),
            })
            .collect();
        GroupReport {
            group: group.clone(),
            window: Some(window.clone()),
            outcome: GroupOutcome::Fitted,
            parameters,
            objective: Some(fitted.value),
            n_points,
            bootstrap_successes: bootstrap.map(|b| b.succeeded),
            error: None,
        }
    }

    /// Copies of the group's peaks carrying the fitted values.
    fn updated_peaks(
        &self,
        peaks: &[Peak],
        group: &FitGroup,
        window: &Region,
        model: &LatticeModel,
        fitted: &FitResult,
        bootstrap: Option<&BootstrapResult>,
    ) -> Vec<(usize, Peak)> {
        let layout = model.layout();
        let point = &fitted.point;
        let error = |index: usize| bootstrap.map(|b| b.std_devs[index]);

        group
            .peaks
            .iter()
            .enumerate()
            .map(|(signal, &index)| {
                let mut peak = peaks[index].clone();
                peak.intensity = fitted_intensity(model, point, signal);
                if let Some(b) = bootstrap {
                    let amplitudes: Vec<f64> = b
                        .samples
                        .rows()
                        .into_iter()
                        .map(|row| fitted_intensity(model, &row.to_owned(), signal))
                        .collect();
                    peak.intensity_err = sample_std(&amplitudes);
                }

                for (dim, peak_dim) in peak.dims.iter_mut().enumerate() {
                    let width = layout.width(signal, dim);
                    let position = layout.position(signal, dim);
                    peak_dim.width = point[width];
                    peak_dim.shift = point[position] + window.lower[dim] as f64;
                    if let Some(e) = error(width) {
                        peak_dim.width_err = e;
                    }
                    if let Some(e) = error(position) {
                        peak_dim.shift_err = e;
                    }
                }

                let mut kinetic = Vec::new();
                if let (Some(rate), Some(floor)) = (layout.decay_rate(signal), layout.decay_floor(signal)) {
                    for (name, i) in [("decay_rate", rate), ("decay_floor", floor)] {
                        kinetic.push(FittedValue {
                            name: name.to_string(),
                            value: point[i],
                            error: error(i),
                        });
                    }
                }
                for (k, name) in layout.kinetics().exchange_names().iter().enumerate() {
                    if let Some(i) = layout.exchange(k) {
                        kinetic.push(FittedValue {
                            name: name.to_string(),
                            value: point[i],
                            error: error(i),
                        });
                    }
                }
                if !kinetic.is_empty() {
                    peak.relaxation = Some(kinetic);
                }

                (index, peak)
            })
            .collect()
    }
}

/// Intensity written back for `signal`.
///
/// Exchange groups report their shared I0 scale, since cross peaks vanish at
/// zero delay; other fits report the amplitude at zero delay.
fn fitted_intensity(model: &LatticeModel, params: &Array1<f64>, signal: usize) -> f64 {
    let layout = model.layout();
    if layout.kinetics().is_exchange() {
        params[layout.amplitude(signal)]
    } else {
        model.signal_amplitude(params, signal, 0.0)
    }
}

/// Noise level of every plane, or None when no plane has one.
///
/// A partial set is rejected: every row of a fit is weighted or none is.
fn plane_noise<I: IntensityProvider + ?Sized>(provider: &I) -> Result<Option<Vec<f64>>> {
    let levels: Vec<Option<f64>> = (0..provider.plane_count())
        .map(|plane| provider.noise_level(plane))
        .collect();
    if levels.iter().all(Option::is_none) {
        return Ok(None);
    }
    levels
        .into_iter()
        .enumerate()
        .map(|(plane, level)| {
            level.filter(|n| *n > 0.0).ok_or_else(|| {
                PeakFitError::InvalidInput(format!(
                    "Plane {} has no positive noise level while other planes do",
                    plane
                ))
            })
        })
        .collect::<Result<Vec<f64>>>()
        .map(Some)
}

fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}
