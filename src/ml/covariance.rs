//! Ledoit-Wolf shrinkage covariance for zero-centred timeseries

use crate::structs::{FconnError, Result};
use ndarray::{Array2, Axis};

/// A shrunk covariance estimate
#[derive(Debug, Clone)]
pub struct ShrunkCovariance {
    pub covariance: Array2<f64>,
    /// Weight given to the scaled identity target, in [0, 1]
    pub shrinkage: f64,
}

/// Ledoit-Wolf shrinkage coefficient of `x` (samples x features), assumed centred
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ledoit_wolf_shrinkage(x: &Array2<f64>) -> f64 {
    let (n_samples, n_features) = x.dim();
    if n_features <= 1 || n_samples == 0 {
        return 0.0;
    }
    let n = n_samples as f64;
    let p = n_features as f64;

    let x2 = x.mapv(|v| v * v);
    let emp_cov_trace = x2.sum_axis(Axis(0)) / n;
    let mu = emp_cov_trace.sum() / p;

    let beta_sum = x2.t().dot(&x2).sum();
    let delta_sum = x.t().dot(x).mapv(|v| v * v).sum() / (n * n);

    let beta = (beta_sum / n - delta_sum) / (p * n);
    let delta = (delta_sum - 2.0 * mu * emp_cov_trace.sum() + p * mu * mu) / p;
    let beta = beta.min(delta);

    if beta <= 0.0 || delta <= 0.0 {
        0.0
    } else {
        (beta / delta).clamp(0.0, 1.0)
    }
}

/// Shrunk covariance `(1 - s) * S + s * mu * I` with `S = X'X / n`
///
/// # Errors
/// Returns `SingularCovariance` if there are no samples, the average variance
/// is not strictly positive, or the shrunk estimate still has a non-positive
/// or non-finite variance (a flat region with zero shrinkage)
#[allow(clippy::cast_precision_loss)]
pub fn ledoit_wolf(x: &Array2<f64>) -> Result<ShrunkCovariance> {
    let (n_samples, n_features) = x.dim();
    if n_samples == 0 || n_features == 0 {
        return Err(FconnError::SingularCovariance(format!(
            "cannot estimate covariance from a {n_samples}x{n_features} timeseries"
        )));
    }

    let emp = x.t().dot(x) / n_samples as f64;
    let mu = emp.diag().sum() / n_features as f64;
    if !(mu > 0.0 && mu.is_finite()) {
        return Err(FconnError::SingularCovariance(format!(
            "average variance is {mu}, shrinkage cannot regularize"
        )));
    }

    let shrinkage = ledoit_wolf_shrinkage(x);
    let mut covariance = emp * (1.0 - shrinkage);
    covariance.diag_mut().mapv_inplace(|v| v + shrinkage * mu);

    if let Some((region, &v)) = covariance
        .diag()
        .iter()
        .enumerate()
        .find(|(_, v)| !(**v > 0.0 && v.is_finite()))
    {
        return Err(FconnError::SingularCovariance(format!(
            "region {region} has variance {v} after shrinkage {shrinkage}"
        )));
    }
    if covariance.iter().any(|v| !v.is_finite()) {
        return Err(FconnError::SingularCovariance(
            "non-finite covariance entry".into(),
        ));
    }

    Ok(ShrunkCovariance {
        covariance,
        shrinkage,
    })
}
