//! End-to-end tests of lattice lineshape fits.
//!
//! These tests build synthetic lattices with known signals and check that the
//! fitter recovers them, alone, jointly with overlapping neighbours, with
//! constrained columns, tabulated shapes and kinetics across delay planes.

use approx::assert_relative_eq;
use ndarray::{Array1, Array2, ArrayD};
use peakfit_rs::fitter::{FitConfig, FitMode, GridIntensities, GroupOutcome, Grouping, PeakFitter};
use peakfit_rs::grouping::{FitGroup, Peak, PeakDim};
use peakfit_rs::lineshape::{
    blend, zz_amplitude, ExchangeRole, LatticeData, LatticeModel, LineShape, LineshapeCatalog,
    TabulatedShape,
};
use peakfit_rs::optimizer::{OptimizationEngine, OptimizerConfig};
use peakfit_rs::parameters::{KineticsKind, ParameterGuess, ParameterLayout, ParameterSpace};
use peakfit_rs::problem::CostMode;
use peakfit_rs::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn lorentzian_line(n: usize, peaks: &[(f64, f64, f64)]) -> Array1<f64> {
    Array1::from_shape_fn(n, |i| {
        peaks
            .iter()
            .map(|&(amp, width, pos)| amp * blend(i as f64 - pos, width, 0.0))
            .sum()
    })
}

fn line_coords(n: usize) -> Array2<f64> {
    Array2::from_shape_fn((n, 1), |(i, _)| i as f64)
}

#[test]
fn test_single_peak_recovery() -> Result<()> {
    init_logging();
    let values = lorentzian_line(21, &[(100.0, 3.0, 10.0)]);
    let data = LatticeData::single_plane(line_coords(21), values)?;
    let layout = ParameterLayout::new(1, 1, KineticsKind::None);
    let model = LatticeModel::new(layout.clone(), vec![LineShape::lorentzian()], data)?;

    let mut guesses = vec![ParameterGuess::fixed(0.0); layout.len()];
    guesses[layout.amplitude(0)] = ParameterGuess::new(90.0, 9.0, 315.0);
    guesses[layout.width(0, 0)] = ParameterGuess::new(2.5, 0.5, 5.0);
    guesses[layout.position(0, 0)] = ParameterGuess::new(10.5, 7.5, 13.5);
    let space = ParameterSpace::new(guesses, vec![])?;

    let fit = OptimizationEngine::default().fit(&model, &space)?.unwrap();
    assert_relative_eq!(fit.point[layout.amplitude(0)], 100.0, max_relative = 0.01);
    assert!((fit.point[layout.position(0, 0)] - 10.0).abs() < 0.1);
    assert_relative_eq!(fit.point[layout.width(0, 0)], 3.0, max_relative = 0.05);
    Ok(())
}

#[test]
fn test_same_inputs_give_same_fit() -> Result<()> {
    let values = lorentzian_line(21, &[(100.0, 3.0, 10.0)]);
    let build = || -> Result<Vec<Peak>> {
        let provider = GridIntensities::new(vec![values.clone().into_dyn()])?;
        let mut peaks = vec![Peak::new(0, 80.0, vec![PeakDim::new(9.6, 2.4, 7.0)])];
        PeakFitter::new(FitConfig::default()).fit_peaks(&mut peaks, &provider, None)?;
        Ok(peaks)
    };
    assert_eq!(build()?, build()?);
    Ok(())
}

#[test]
fn test_overlapping_doublet_joint_fit_beats_independent_fits() -> Result<()> {
    init_logging();
    let width = 3.0;
    let truth = [(100.0, width, 18.0), (80.0, width, 18.0 + 1.5 * width)];
    let mut rng = ChaCha8Rng::seed_from_u64(20);
    let noise = Normal::new(0.0, 100.0 / 20.0).unwrap();
    let values = lorentzian_line(41, &truth) + Array1::from_shape_fn(41, |_| noise.sample(&mut rng));
    let data = LatticeData::single_plane(line_coords(41), values)?;

    let guess = |amp: f64, pos: f64| {
        [
            ParameterGuess::new(amp, 0.1 * amp, 3.5 * amp),
            ParameterGuess::new(width, 0.2 * width, 2.0 * width),
            ParameterGuess::new(pos, pos - 3.0, pos + 3.0),
        ]
    };
    let engine = OptimizationEngine::default();

    // Joint fit of both signals
    let layout = ParameterLayout::new(2, 1, KineticsKind::None);
    let model = LatticeModel::new(layout.clone(), vec![LineShape::lorentzian()], data.clone())?;
    let mut guesses = vec![ParameterGuess::fixed(0.0); layout.len()];
    for (signal, &(amp, _, pos)) in truth.iter().enumerate() {
        let [a, w, p] = guess(amp, pos);
        guesses[layout.amplitude(signal)] = a;
        guesses[layout.width(signal, 0)] = w;
        guesses[layout.position(signal, 0)] = p;
    }
    let joint = engine
        .fit(&model, &ParameterSpace::new(guesses, vec![])?)?
        .unwrap();

    // Each signal alone, ignoring the other
    let single = ParameterLayout::new(1, 1, KineticsKind::None);
    let mut independent = 0.0;
    for &(amp, _, pos) in &truth {
        let model = LatticeModel::new(single.clone(), vec![LineShape::lorentzian()], data.clone())?;
        let [a, w, p] = guess(amp, pos);
        let space = ParameterSpace::new(vec![ParameterGuess::fixed(0.0), a, w, p], vec![])?;
        independent += engine.fit(&model, &space)?.unwrap().value;
    }

    assert!(
        joint.value < independent,
        "joint {} vs independent {}",
        joint.value,
        independent
    );
    Ok(())
}

#[test]
fn test_constrained_column_shares_width_and_position() -> Result<()> {
    init_logging();
    let plane = Array2::from_shape_fn((20, 32), |(i, j)| {
        let x = i as f64;
        let y = j as f64;
        90.0 * blend(x - 9.0, 3.0, 0.0) * blend(y - 8.0, 2.5, 0.0)
            + 60.0 * blend(x - 9.0, 3.0, 0.0) * blend(y - 22.0, 2.0, 0.0)
    })
    .into_dyn();
    let provider = GridIntensities::new(vec![plane])?;
    let mut peaks = vec![
        Peak::new(0, 85.0, vec![PeakDim::new(9.2, 2.8, 8.0).with_resonance(1), PeakDim::new(8.3, 2.4, 7.0)]),
        Peak::new(1, 55.0, vec![PeakDim::new(8.7, 3.3, 8.0).with_resonance(1), PeakDim::new(21.6, 2.2, 7.0)]),
    ];

    let config = FitConfig::default()
        .with_grouping(Grouping::Column(0))
        .with_constrained_dim(0);
    let reports = PeakFitter::new(config).fit_peaks(&mut peaks, &provider, None)?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, GroupOutcome::Fitted);
    assert_eq!(peaks[0].dims[0].width, peaks[1].dims[0].width);
    assert_eq!(peaks[0].dims[0].shift, peaks[1].dims[0].shift);
    assert!((peaks[0].dims[0].shift - 9.0).abs() < 0.1);
    assert!((peaks[1].dims[1].shift - 22.0).abs() < 0.1);
    Ok(())
}

#[test]
fn test_tabulated_shapes_use_local_search() -> Result<()> {
    init_logging();
    let plane = Array2::from_shape_fn((24, 20), |(i, j)| {
        120.0 * blend(i as f64 - 11.0, 3.0, 0.0) * blend(j as f64 - 9.0, 2.5, 0.0)
    })
    .into_dyn();
    let provider = GridIntensities::new(vec![plane])?;
    let table = TabulatedShape::from_fn(|u| blend(u, 1.0, 0.0), 25.0, 10001)?;
    let catalog = LineshapeCatalog::new(vec![table.clone(), table]);
    let mut peaks = vec![Peak::new(
        0,
        110.0,
        vec![PeakDim::new(11.3, 2.7, 8.0), PeakDim::new(8.8, 2.3, 7.0)],
    )];

    let config = FitConfig::default()
        .with_optimizer(OptimizerConfig::default().with_cost_mode(CostMode::MeanSquared));
    let fitter = PeakFitter::new(config).with_catalog(catalog);
    let reports = fitter.fit_peaks(&mut peaks, &provider, None)?;
    assert_eq!(reports[0].outcome, GroupOutcome::Fitted);
    assert_relative_eq!(peaks[0].intensity, 120.0, max_relative = 0.02);
    assert!((peaks[0].dims[0].shift - 11.0).abs() < 0.1);
    assert!((peaks[0].dims[1].shift - 9.0).abs() < 0.1);
    Ok(())
}

#[test]
fn test_decay_across_planes() -> Result<()> {
    init_logging();
    let delays = [0.0, 0.4, 0.8, 1.6];
    let planes: Vec<ArrayD<f64>> = delays
        .iter()
        .map(|&t| lorentzian_line(25, &[(100.0 * (-1.2f64 * t).exp(), 3.0, 12.0)]).into_dyn())
        .collect();
    let provider = GridIntensities::new(planes)?;
    let mut peaks = vec![Peak::new(0, 95.0, vec![PeakDim::new(12.3, 2.8, 8.0)])];

    let config = FitConfig::default().with_kinetics(KineticsKind::Decay);
    PeakFitter::new(config).fit_peaks(&mut peaks, &provider, Some(&delays[..]))?;

    let relaxation = peaks[0].relaxation.as_ref().unwrap();
    let rate = relaxation.iter().find(|v| v.name == "decay_rate").unwrap();
    assert_relative_eq!(rate.value, 1.2, max_relative = 0.02);
    assert_relative_eq!(peaks[0].intensity, 100.0, max_relative = 0.01);
    Ok(())
}

#[test]
fn test_exchange_group_across_planes() -> Result<()> {
    init_logging();
    let (i0, r1, pop_a, k_ex) = (200.0, 1.0, 0.6, 4.0);
    let centers = [8.0, 20.0, 32.0, 44.0];
    let roles = [ExchangeRole::AA, ExchangeRole::BB, ExchangeRole::AB, ExchangeRole::BA];
    let delays = [0.0, 0.1, 0.3, 0.6];
    let planes: Vec<ArrayD<f64>> = delays
        .iter()
        .map(|&t| {
            let signals: Vec<(f64, f64, f64)> = centers
                .iter()
                .zip(roles.iter())
                .map(|(&c, &role)| (i0 * zz_amplitude(r1, pop_a, k_ex, t, role), 3.0, c))
                .collect();
            lorentzian_line(53, &signals).into_dyn()
        })
        .collect();
    let provider = GridIntensities::new(planes)?;
    let mut peaks: Vec<Peak> = centers
        .iter()
        .enumerate()
        .map(|(i, &c)| Peak::new(i, if i < 2 { 100.0 } else { 10.0 }, vec![PeakDim::new(c + 0.2, 2.8, 8.0)]))
        .collect();

    let config = FitConfig::default()
        .with_kinetics(KineticsKind::Exchange)
        .with_grouping(Grouping::Explicit(vec![FitGroup::new(vec![0, 1, 2, 3])]))
        .with_mode(FitMode::Report);
    let reports = PeakFitter::new(config).fit_peaks(&mut peaks, &provider, Some(&delays[..]))?;
    let report = &reports[0];
    assert_eq!(report.outcome, GroupOutcome::Fitted);
    assert_relative_eq!(report.parameter("k_ex").unwrap().value, k_ex, max_relative = 0.05);
    assert!((report.parameter("pop_a").unwrap().value - pop_a).abs() < 0.02);
    assert_relative_eq!(report.parameter("r1").unwrap().value, r1, max_relative = 0.05);
    Ok(())
}

#[test]
fn test_nonuniform_sampling_still_recovers_peak() -> Result<()> {
    use peakfit_rs::fitter::SampleSchedule;

    let plane = Array2::from_shape_fn((24, 20), |(i, j)| {
        70.0 * blend(i as f64 - 11.0, 3.0, 0.0) * blend(j as f64 - 9.0, 2.5, 0.0)
    })
    .into_dyn();
    let sampled: Vec<Vec<i64>> = (0..24).filter(|i| i % 3 != 1).map(|i| vec![i]).collect();
    let provider = GridIntensities::new(vec![plane])?.with_schedule(SampleSchedule::new(vec![0], sampled)?);
    let mut peaks = vec![Peak::new(
        0,
        60.0,
        vec![PeakDim::new(11.2, 2.6, 8.0), PeakDim::new(9.3, 2.2, 7.0)],
    )];
    let reports = PeakFitter::new(FitConfig::default()).fit_peaks(&mut peaks, &provider, None)?;
    assert_eq!(reports[0].outcome, GroupOutcome::Fitted);
    assert_relative_eq!(peaks[0].intensity, 70.0, max_relative = 0.01);
    Ok(())
}

#[test]
fn test_batch_continues_past_an_underdetermined_group() -> Result<()> {
    init_logging();
    let values = lorentzian_line(50, &[(100.0, 3.0, 10.0), (60.0, 3.0, 40.0)]);
    let provider = GridIntensities::new(vec![values.into_dyn()])?;
    // The narrow second peak selects a single lattice point for three free parameters
    let mut peaks = vec![
        Peak::new(0, 80.0, vec![PeakDim::new(10.3, 2.7, 8.0)]),
        Peak::new(1, 50.0, vec![PeakDim::new(40.0, 0.4, 2.0)]),
        Peak::new(2, 50.0, vec![PeakDim::new(40.2, 2.7, 8.0)]),
    ];
    let narrow = peaks[1].clone();

    let config = FitConfig::default().with_grouping(Grouping::Explicit(vec![
        FitGroup::new(vec![0]),
        FitGroup::new(vec![1]),
        FitGroup::new(vec![2]),
    ]));
    let reports = PeakFitter::new(config).fit_peaks(&mut peaks, &provider, None)?;

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].outcome, GroupOutcome::Fitted);
    assert_eq!(reports[1].outcome, GroupOutcome::Rejected);
    assert!(reports[1].error.is_some());
    assert_eq!(reports[2].outcome, GroupOutcome::Fitted);

    assert_eq!(peaks[1], narrow);
    assert_relative_eq!(peaks[0].intensity, 100.0, max_relative = 0.01);
    assert_relative_eq!(peaks[2].intensity, 60.0, max_relative = 0.01);
    Ok(())
}

#[test]
fn test_exchange_update_keeps_cross_peak_intensities() -> Result<()> {
    init_logging();
    let (i0, r1, pop_a, k_ex) = (200.0, 1.0, 0.6, 4.0);
    let centers = [8.0, 20.0, 32.0, 44.0];
    let roles = [ExchangeRole::AA, ExchangeRole::BB, ExchangeRole::AB, ExchangeRole::BA];
    let delays = [0.0, 0.1, 0.3, 0.6];
    let planes: Vec<ArrayD<f64>> = delays
        .iter()
        .map(|&t| {
            let signals: Vec<(f64, f64, f64)> = centers
                .iter()
                .zip(roles.iter())
                .map(|(&c, &role)| (i0 * zz_amplitude(r1, pop_a, k_ex, t, role), 3.0, c))
                .collect();
            lorentzian_line(53, &signals).into_dyn()
        })
        .collect();
    let provider = GridIntensities::new(planes)?;
    let mut peaks: Vec<Peak> = centers
        .iter()
        .enumerate()
        .map(|(i, &c)| Peak::new(i, if i < 2 { 100.0 } else { 10.0 }, vec![PeakDim::new(c + 0.2, 2.8, 8.0)]))
        .collect();

    let config = FitConfig::default()
        .with_kinetics(KineticsKind::Exchange)
        .with_grouping(Grouping::Explicit(vec![FitGroup::new(vec![0, 1, 2, 3])]));
    let reports = PeakFitter::new(config).fit_peaks(&mut peaks, &provider, Some(&delays[..]))?;
    assert_eq!(reports[0].outcome, GroupOutcome::Fitted);

    for peak in &peaks {
        assert_relative_eq!(peak.intensity, i0, max_relative = 0.02);
        let relaxation = peak.relaxation.as_ref().unwrap();
        let value = |name: &str| relaxation.iter().find(|v| v.name == name).unwrap().value;
        assert_relative_eq!(value("k_ex"), k_ex, max_relative = 0.05);
        assert!((value("pop_a") - pop_a).abs() < 0.02);
        assert_relative_eq!(value("r1"), r1, max_relative = 0.05);
    }
    Ok(())
}
