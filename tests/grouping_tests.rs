//! Integration tests for peak grouping through the fitter.

use peakfit_rs::fitter::{FitConfig, GridIntensities, GroupOutcome, Grouping, PeakFitter};
use peakfit_rs::grouping::{fit_window, group_by_overlap, FitGroup, Peak, PeakDim};
use peakfit_rs::lineshape::blend;
use peakfit_rs::{PeakFitError, Result};
use ndarray::Array2;

fn peak(id: usize, x: f64, y: f64) -> Peak {
    Peak::new(id, 50.0, vec![PeakDim::new(x, 2.0, 6.0), PeakDim::new(y, 2.0, 6.0)])
}

#[test]
fn test_overlap_groups_are_layered() {
    // A overlaps B, B overlaps C, D stands alone
    let peaks = vec![
        peak(0, 10.0, 10.0),
        peak(1, 14.0, 12.0),
        peak(2, 18.0, 14.0),
        peak(3, 40.0, 40.0),
    ];
    let groups = group_by_overlap(&peaks);
    assert_eq!(groups, vec![FitGroup::new(vec![0, 1, 2]), FitGroup::new(vec![3])]);

    let window = fit_window(&peaks, &groups[0]).unwrap();
    assert!(window.contains(&[10, 10]));
    assert!(window.contains(&[18, 14]));
    assert!(!window.contains(&[40, 40]));
}

#[test]
fn test_peak_outside_data_reports_no_positions() -> Result<()> {
    let plane = Array2::from_shape_fn((20, 20), |(i, j)| {
        50.0 * blend(i as f64 - 8.0, 2.0, 0.0) * blend(j as f64 - 8.0, 2.0, 0.0)
    });
    let provider = GridIntensities::new(vec![plane.into_dyn()])?;
    let mut peaks = vec![peak(0, 8.0, 8.0), peak(1, 90.0, 90.0)];
    let original = peaks[1].clone();

    let reports = PeakFitter::new(FitConfig::default()).fit_peaks(&mut peaks, &provider, None)?;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].outcome, GroupOutcome::NoPositions);
    assert!(reports[1].parameters.is_empty());
    assert_eq!(peaks[1], original);
    Ok(())
}

#[test]
fn test_explicit_groups_are_checked() {
    let peaks = vec![peak(0, 8.0, 8.0)];
    let config = FitConfig::default().with_grouping(Grouping::Explicit(vec![FitGroup::new(vec![0, 5])]));
    let result = PeakFitter::new(config).groups(&peaks);
    assert!(matches!(result, Err(PeakFitError::InvalidInput(_))));
}
