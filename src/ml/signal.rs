//! Signal cleaning applied to region timeseries

use crate::config::SignalConfig;
use crate::ml::linalg::residualize;
use crate::structs::Result;
use ndarray::{Array1, Array2, Axis};

/// Standard deviations below this are treated as constant signals
const STD_EPS: f64 = 1e-12;

/// Remove the mean and the least-squares linear trend from each column
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn detrend(signals: &Array2<f64>) -> Array2<f64> {
    let n = signals.nrows();
    if n == 0 {
        return signals.clone();
    }

    let center = (n as f64 - 1.0) / 2.0;
    let t: Array1<f64> = (0..n).map(|i| i as f64 - center).collect();
    let t_norm = t.dot(&t);

    let mut out = signals.clone();
    for mut col in out.columns_mut() {
        let mean = col.mean().unwrap_or(0.0);
        let slope = if t_norm > 0.0 { t.dot(&col) / t_norm } else { 0.0 };
        col.iter_mut()
            .zip(t.iter())
            .for_each(|(v, &ti)| *v -= mean + slope * ti);
    }
    out
}

/// Z-score each column (population standard deviation)
#[must_use]
pub fn standardize(signals: &Array2<f64>) -> Array2<f64> {
    let mut out = signals.clone();
    for mut col in out.columns_mut() {
        let mean = col.mean().unwrap_or(0.0);
        let std = col.std(0.0);
        let scale = if std < STD_EPS { 1.0 } else { std };
        col.mapv_inplace(|v| (v - mean) / scale);
    }
    out
}

/// Detrend (optionally), regress out confounds, then standardize (optionally)
///
/// Confound row count must already match the signal row count.
///
/// # Errors
/// Returns error if the confound regression fails
pub fn clean(
    signals: &Array2<f64>,
    confounds: Option<&Array2<f64>>,
    config: &SignalConfig,
) -> Result<Array2<f64>> {
    let mut out = if config.detrend {
        detrend(signals)
    } else {
        signals.clone()
    };

    if let Some(confounds) = confounds {
        if confounds.ncols() > 0 {
            let regressors = if config.detrend {
                detrend(confounds)
            } else {
                let mean = confounds.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(confounds.ncols()));
                confounds - &mean
            };
            out = residualize(&out, &regressors)?;
        }
    }

    if config.standardize {
        out = standardize(&out);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_detrend_removes_line() {
        let signals = Array2::from_shape_fn((10, 2), |(i, j)| {
            let t = i as f64;
            if j == 0 {
                3.0 + 0.5 * t
            } else {
                -2.0 * t
            }
        });

        let out = detrend(&signals);
        assert!(out.iter().all(|v| v.abs() < 1e-10));
    }

    #[test]
    fn test_standardize_zero_mean_unit_variance() {
        let signals = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [6.0, 5.0]];
        let out = standardize(&signals);

        let col = out.column(0);
        assert!(col.mean().expect("mean").abs() < 1e-12);
        assert!((col.std(0.0) - 1.0).abs() < 1e-12);
        // constant column stays finite
        assert!(out.column(1).iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_clean_regresses_confounds() {
        let n = 40;
        let confound: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
        let signals = Array2::from_shape_fn((n, 1), |(i, _)| 2.0 * confound[i]);
        let confounds = Array2::from_shape_fn((n, 1), |(i, _)| confound[i]);

        let config = SignalConfig {
            smoothing_fwhm: 0.0,
            detrend: true,
            standardize: false,
        };
        let out = clean(&signals, Some(&confounds), &config).expect("clean");

        assert!(out.iter().all(|v| v.abs() < 1e-8));
    }

    #[test]
    fn test_clean_without_confounds_standardizes() {
        let signals = array![[1.0], [4.0], [2.0], [8.0], [3.0]];
        let out = clean(&signals, None, &SignalConfig::default()).expect("clean");

        assert!(out.column(0).mean().expect("mean").abs() < 1e-12);
        assert!((out.column(0).std(0.0) - 1.0).abs() < 1e-12);
    }
}
