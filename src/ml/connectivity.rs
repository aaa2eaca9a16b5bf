//! Per-subject connectivity matrices from region timeseries

use crate::ml::covariance::ledoit_wolf;
use crate::ml::linalg::{expm, inv_spd, inv_sqrtm, logm, sqrtm, symmetrize};
use crate::structs::{Connectivity, ConnectivityKind, FconnError, Result};
use ndarray::Array2;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Geometric mean iteration limit
const GMEAN_MAX_ITER: usize = 10;

/// Stop when `||mean log||_F / size` falls below this
const GMEAN_TOLERANCE: f64 = 1e-7;

/// Compute one connectivity matrix per subject, plus the cohort mean/reference
///
/// # Errors
/// `DataShape` for an empty cohort or differing region counts,
/// `SingularCovariance` if a covariance cannot be regularized or inverted
pub fn connectivity(timeseries: &[Array2<f64>], kind: ConnectivityKind) -> Result<Connectivity> {
    let n_regions = check_shapes(timeseries)?;

    let covariances = subject_covariances(timeseries)?;

    let (matrices, mean) = match kind {
        ConnectivityKind::Covariance => {
            let mean = arithmetic_mean(&covariances, n_regions);
            (covariances, mean)
        }
        ConnectivityKind::Correlation => {
            let matrices: Vec<_> = covariances.iter().map(cov_to_corr).collect();
            let mean = arithmetic_mean(&matrices, n_regions);
            (matrices, mean)
        }
        ConnectivityKind::Precision => {
            let matrices = per_subject(&covariances, "precision", inv_spd)?;
            let mean = arithmetic_mean(&matrices, n_regions);
            (matrices, mean)
        }
        ConnectivityKind::PartialCorrelation => {
            let matrices = per_subject(&covariances, "partial correlation", |c| {
                inv_spd(c).map(|p| precision_to_partial(&p))
            })?;
            let mean = arithmetic_mean(&matrices, n_regions);
            (matrices, mean)
        }
        ConnectivityKind::Tangent => {
            let mean = geometric_mean(&covariances)?;
            let whitening = inv_sqrtm(&mean)?;
            let matrices = per_subject(&covariances, "tangent", |c| {
                logm(&symmetrize(&whitening.dot(c).dot(&whitening)))
            })?;
            (matrices, mean)
        }
    };

    debug!(kind = %kind, subjects = matrices.len(), regions = n_regions, "computed connectivity");

    Ok(Connectivity {
        kind,
        matrices,
        mean,
    })
}

fn check_shapes(timeseries: &[Array2<f64>]) -> Result<usize> {
    let first = timeseries
        .first()
        .ok_or_else(|| FconnError::DataShape("no subjects to compute connectivity on".into()))?;
    let n_regions = first.ncols();

    for (subject, ts) in timeseries.iter().enumerate() {
        if ts.ncols() != n_regions {
            return Err(FconnError::DataShape(format!(
                "subject {subject} has {} regions, subject 0 has {n_regions}",
                ts.ncols()
            )));
        }
        if ts.nrows() < ts.ncols() {
            debug!(
                subject,
                timepoints = ts.nrows(),
                regions = ts.ncols(),
                "fewer timepoints than regions, relying on shrinkage"
            );
        }
    }
    Ok(n_regions)
}

/// Shrunk covariance per subject; on failure, the lowest failing subject is named
fn subject_covariances(timeseries: &[Array2<f64>]) -> Result<Vec<Array2<f64>>> {
    let estimate = |(subject, ts): (usize, &Array2<f64>)| {
        ledoit_wolf(ts)
            .map(|e| {
                debug!(subject, shrinkage = e.shrinkage, "shrunk covariance");
                e.covariance
            })
            .map_err(|e| name_subject(e, subject))
    };

    #[cfg(feature = "parallel")]
    let estimates: Vec<Result<Array2<f64>>> =
        timeseries.par_iter().enumerate().map(estimate).collect();
    #[cfg(not(feature = "parallel"))]
    let estimates: Vec<Result<Array2<f64>>> =
        timeseries.iter().enumerate().map(estimate).collect();

    estimates.into_iter().collect()
}

fn per_subject<F>(covariances: &[Array2<f64>], what: &str, f: F) -> Result<Vec<Array2<f64>>>
where
    F: Fn(&Array2<f64>) -> Result<Array2<f64>>,
{
    covariances
        .iter()
        .enumerate()
        .map(|(subject, c)| {
            f(c).map_err(|e| match e {
                FconnError::SingularCovariance(msg) => FconnError::SingularCovariance(format!(
                    "subject {subject} ({what}): {msg}"
                )),
                other => other,
            })
        })
        .collect()
}

fn name_subject(e: FconnError, subject: usize) -> FconnError {
    match e {
        FconnError::SingularCovariance(msg) => {
            FconnError::SingularCovariance(format!("subject {subject}: {msg}"))
        }
        other => other,
    }
}

/// Normalise a covariance to unit diagonal
#[must_use]
pub fn cov_to_corr(covariance: &Array2<f64>) -> Array2<f64> {
    let std = covariance.diag().mapv(f64::sqrt);
    let mut corr = Array2::from_shape_fn(covariance.dim(), |(i, j)| {
        covariance[[i, j]] / (std[i] * std[j])
    });
    corr.diag_mut().fill(1.0);
    symmetrize(&corr)
}

/// Partial correlations from a precision matrix
#[must_use]
pub fn precision_to_partial(precision: &Array2<f64>) -> Array2<f64> {
    let mut partial = -cov_to_corr(precision);
    partial.diag_mut().fill(1.0);
    partial
}

#[allow(clippy::cast_precision_loss)]
fn arithmetic_mean(matrices: &[Array2<f64>], n_regions: usize) -> Array2<f64> {
    let mut mean = Array2::<f64>::zeros((n_regions, n_regions));
    for m in matrices {
        mean += m;
    }
    if !matrices.is_empty() {
        mean /= matrices.len() as f64;
    }
    mean
}

/// Riemannian geometric mean of symmetric positive definite matrices
///
/// Fixed-point iteration from the arithmetic mean; the step is halved whenever
/// the norm of the mean log grows.
///
/// # Errors
/// `SingularCovariance` if a matrix is not positive definite
#[allow(clippy::cast_precision_loss)]
pub fn geometric_mean(matrices: &[Array2<f64>]) -> Result<Array2<f64>> {
    let n_regions = matrices
        .first()
        .map(Array2::nrows)
        .ok_or_else(|| FconnError::DataShape("geometric mean of an empty set".into()))?;
    let size = (n_regions * n_regions) as f64;

    let mut gmean = arithmetic_mean(matrices, n_regions);
    let mut norm_old = f64::INFINITY;
    let mut step = 1.0;

    for iteration in 0..GMEAN_MAX_ITER {
        let gmean_sqrt = sqrtm(&gmean)?;
        let gmean_inv_sqrt = inv_sqrtm(&gmean)?;

        let mut logs_mean = Array2::<f64>::zeros((n_regions, n_regions));
        for m in matrices {
            let whitened = symmetrize(&gmean_inv_sqrt.dot(m).dot(&gmean_inv_sqrt));
            logs_mean += &logm(&whitened)?;
        }
        logs_mean /= matrices.len() as f64;

        if logs_mean.iter().any(|v| !v.is_finite()) {
            return Err(FconnError::SingularCovariance(
                "non-finite value after matrix logarithm".into(),
            ));
        }

        let mut norm = logs_mean.iter().map(|v| v * v).sum::<f64>().sqrt();
        let update = expm(&(&logs_mean * step))?;
        gmean = symmetrize(&gmean_sqrt.dot(&update).dot(&gmean_sqrt));

        if norm < norm_old {
            norm_old = norm;
        } else if norm > norm_old {
            step /= 2.0;
            norm = norm_old;
        }

        if norm / size < GMEAN_TOLERANCE {
            debug!(iterations = iteration + 1, "geometric mean converged");
            return Ok(gmean);
        }
    }

    warn!(
        max_iter = GMEAN_MAX_ITER,
        "geometric mean did not reach tolerance, using last iterate"
    );
    Ok(gmean)
}

/// Map a tangent-space matrix back to a covariance around `mean`
///
/// # Errors
/// `SingularCovariance` if `mean` is not positive definite
#[allow(dead_code)]
pub fn tangent_to_covariance(tangent: &Array2<f64>, mean: &Array2<f64>) -> Result<Array2<f64>> {
    let mean_sqrt = sqrtm(mean)?;
    let exp = expm(tangent)?;
    Ok(symmetrize(&mean_sqrt.dot(&exp).dot(&mean_sqrt)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn cohort(subjects: usize, timepoints: usize, regions: usize) -> Vec<Array2<f64>> {
        let mut rng = StdRng::seed_from_u64(11);
        (0..subjects)
            .map(|_| {
                Array2::from_shape_simple_fn((timepoints, regions), || {
                    StandardNormal.sample(&mut rng)
                })
            })
            .collect()
    }

    fn assert_symmetric(m: &Array2<f64>) {
        let (rows, cols) = m.dim();
        assert_eq!(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                assert!((m[[i, j]] - m[[j, i]]).abs() < 1e-10);
                assert!(m[[i, j]].is_finite());
            }
        }
    }

    #[test]
    fn test_every_kind_is_symmetric() {
        let ts = cohort(6, 50, 5);
        for kind in [
            ConnectivityKind::Covariance,
            ConnectivityKind::Correlation,
            ConnectivityKind::PartialCorrelation,
            ConnectivityKind::Tangent,
            ConnectivityKind::Precision,
        ] {
            let result = connectivity(&ts, kind).expect("connectivity");
            assert_eq!(result.kind, kind);
            assert_eq!(result.matrices.len(), 6);
            result.matrices.iter().for_each(assert_symmetric);
            assert_symmetric(&result.mean);
        }
    }

    #[test]
    fn test_correlation_unit_diagonal_and_bounded() {
        let ts = cohort(3, 40, 4);
        let result = connectivity(&ts, ConnectivityKind::Correlation).expect("correlation");
        for m in &result.matrices {
            for i in 0..4 {
                assert!((m[[i, i]] - 1.0).abs() < 1e-12);
            }
            assert!(m.iter().all(|v| v.abs() <= 1.0 + 1e-12));
        }
    }

    #[test]
    fn test_fewer_timepoints_than_regions() {
        let ts = cohort(4, 5, 8);
        let result = connectivity(&ts, ConnectivityKind::Tangent).expect("tangent");
        result.matrices.iter().for_each(assert_symmetric);
    }

    #[test]
    fn test_geometric_mean_of_identical_matrices() {
        let c = ndarray::array![[2.0, 0.4], [0.4, 1.0]];
        let mean = geometric_mean(&[c.clone(), c.clone(), c.clone()]).expect("gmean");
        for (a, b) in mean.iter().zip(c.iter()) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn test_geometric_mean_of_commuting_matrices() {
        // diagonal matrices: geometric mean is the elementwise geometric mean
        let a = ndarray::array![[1.0, 0.0], [0.0, 4.0]];
        let b = ndarray::array![[4.0, 0.0], [0.0, 1.0]];
        let mean = geometric_mean(&[a, b]).expect("gmean");
        assert!((mean[[0, 0]] - 2.0).abs() < 1e-6);
        assert!((mean[[1, 1]] - 2.0).abs() < 1e-6);
        assert!(mean[[0, 1]].abs() < 1e-6);
    }

    #[test]
    fn test_tangent_round_trip() {
        let ts = cohort(5, 60, 4);
        let result = connectivity(&ts, ConnectivityKind::Tangent).expect("tangent");
        let covariances = connectivity(&ts, ConnectivityKind::Covariance).expect("covariance");

        let back = tangent_to_covariance(&result.matrices[0], &result.mean).expect("inverse");
        for (a, b) in back.iter().zip(covariances.matrices[0].iter()) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn test_region_mismatch_is_shape_error() {
        let mut ts = cohort(2, 20, 3);
        ts.push(Array2::zeros((20, 4)));
        assert!(matches!(
            connectivity(&ts, ConnectivityKind::Correlation),
            Err(FconnError::DataShape(_))
        ));
    }

    #[test]
    fn test_zero_subject_names_index() {
        let mut ts = cohort(2, 20, 3);
        ts.push(Array2::zeros((20, 3)));
        match connectivity(&ts, ConnectivityKind::Correlation) {
            Err(FconnError::SingularCovariance(msg)) => assert!(msg.contains("subject 2")),
            other => panic!("expected SingularCovariance, got {other:?}"),
        }
    }

    #[test]
    fn test_flat_region_fails_instead_of_nan() {
        let ts = Array2::from_shape_fn((20, 2), |(t, r)| {
            if r == 1 {
                0.0
            } else if t % 2 == 0 {
                1.0
            } else {
                -1.0
            }
        });

        for kind in [ConnectivityKind::Correlation, ConnectivityKind::PartialCorrelation] {
            match connectivity(&[ts.clone(), ts.clone()], kind) {
                Err(FconnError::SingularCovariance(msg)) => assert!(msg.contains("subject 0")),
                other => panic!("expected SingularCovariance, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_lowest_failing_subject_is_named() {
        let mut ts = cohort(4, 20, 3);
        ts[1] = Array2::zeros((20, 3));
        ts[3] = Array2::zeros((20, 3));
        match connectivity(&ts, ConnectivityKind::Covariance) {
            Err(FconnError::SingularCovariance(msg)) => {
                assert!(msg.contains("subject 1"), "{msg}");
            }
            other => panic!("expected SingularCovariance, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_cohort() {
        assert!(connectivity(&[], ConnectivityKind::Tangent).is_err());
    }
}
