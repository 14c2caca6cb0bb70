//! Integration tests for the kinetic curve equations.

use approx::assert_relative_eq;
use ndarray::{Array1, Array2};
use peakfit_rs::curve::{CurveData, CurveEquation, CurveFitter, ExchangeRatio, TwoStateReaction, ZzExchange};
use peakfit_rs::Result;

fn delays() -> Array2<f64> {
    Array2::from_shape_fn((12, 1), |(i, _)| 0.05 * i as f64)
}

/// Noise-free observations of `equation` at `params`.
fn observe<E: CurveEquation>(equation: &E, params: &[f64]) -> Result<CurveData> {
    let x = delays();
    let params = Array1::from(params.to_vec());
    let mut y = Array2::zeros((x.nrows(), equation.n_y()));
    for (i, row) in x.rows().into_iter().enumerate() {
        for (c, value) in equation.predict(row, &params).into_iter().enumerate() {
            y[[i, c]] = value;
        }
    }
    CurveData::new(x, y, None)
}

#[test]
fn test_zz_exchange_recovers_rates() -> Result<()> {
    let data = observe(&ZzExchange::default(), &[100.0, 1.5, 0.65, 6.0])?;
    let fit = CurveFitter::new(ZzExchange::default()).fit(&data)?.unwrap();
    assert_relative_eq!(fit.value("i0").unwrap(), 100.0, max_relative = 0.01);
    assert_relative_eq!(fit.value("r1").unwrap(), 1.5, max_relative = 0.02);
    assert_relative_eq!(fit.value("pop_a").unwrap(), 0.65, max_relative = 0.01);
    assert_relative_eq!(fit.value("k_ex").unwrap(), 6.0, max_relative = 0.02);
    Ok(())
}

#[test]
fn test_independent_zz_exchange_fits_its_own_data() -> Result<()> {
    let equation = ZzExchange { independent_r1: true };
    let data = observe(&equation, &[100.0, 0.6, 1.0, 2.0, 4.0, 6.0])?;
    let fit = CurveFitter::new(equation).fit(&data)?.unwrap();
    assert!(fit.objective < 1e-2);
    assert_relative_eq!(fit.value("pop_a").unwrap(), 0.6, max_relative = 0.05);
    Ok(())
}

#[test]
fn test_two_state_reaction() -> Result<()> {
    let data = observe(&TwoStateReaction, &[80.0, 60.0, 3.0])?;
    let fit = CurveFitter::new(TwoStateReaction).fit(&data)?.unwrap();
    assert_relative_eq!(fit.value("a0").unwrap(), 80.0, max_relative = 0.01);
    assert_relative_eq!(fit.value("b_max").unwrap(), 60.0, max_relative = 0.01);
    assert_relative_eq!(fit.value("k").unwrap(), 3.0, max_relative = 0.02);
    Ok(())
}

#[test]
fn test_exchange_ratio() -> Result<()> {
    let data = observe(&ExchangeRatio, &[5.0, 0.7])?;
    let fit = CurveFitter::new(ExchangeRatio).fit(&data)?.unwrap();
    assert_relative_eq!(fit.value("k_ex").unwrap(), 5.0, max_relative = 0.02);
    assert_relative_eq!(fit.value("pop_a").unwrap(), 0.7, max_relative = 0.02);
    Ok(())
}

#[test]
fn test_wrong_channel_count_is_rejected() -> Result<()> {
    let data = observe(&TwoStateReaction, &[80.0, 60.0, 3.0])?;
    assert!(CurveFitter::new(ZzExchange::default()).fit(&data).is_err());
    Ok(())
}
