//! Symmetric-matrix helpers bridging `ndarray` and `nalgebra`

use crate::structs::{FconnError, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::Array2;

/// Copy an ndarray matrix into a nalgebra one
#[must_use]
pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

/// Copy a nalgebra matrix into an ndarray one
#[must_use]
pub fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Average a matrix with its transpose
#[must_use]
pub fn symmetrize(a: &Array2<f64>) -> Array2<f64> {
    (a + &a.t()) * 0.5
}

/// Apply `f` to the eigenvalues of a symmetric matrix and recompose
///
/// # Errors
/// Returns `SingularCovariance` when `positive` is set and an eigenvalue is not
/// strictly positive, or when `f` yields a non-finite value
pub fn map_eigenvalues<F>(a: &Array2<f64>, positive: bool, f: F) -> Result<Array2<f64>>
where
    F: Fn(f64) -> f64,
{
    let eigen = SymmetricEigen::new(to_dmatrix(a));

    if positive {
        if let Some(min) = eigen.eigenvalues.iter().copied().reduce(f64::min) {
            if min <= 0.0 || !min.is_finite() {
                return Err(FconnError::SingularCovariance(format!(
                    "matrix is not positive definite (smallest eigenvalue {min:e})"
                )));
            }
        }
    }

    let mapped = eigen.eigenvalues.map(&f);
    if mapped.iter().any(|v| !v.is_finite()) {
        return Err(FconnError::SingularCovariance(
            "eigenvalue map produced a non-finite value".into(),
        ));
    }

    let vecs = &eigen.eigenvectors;
    let recomposed = vecs * DMatrix::from_diagonal(&mapped) * vecs.transpose();
    Ok(symmetrize(&from_dmatrix(&recomposed)))
}

/// Matrix logarithm of a symmetric positive definite matrix
///
/// # Errors
/// Returns `SingularCovariance` if the matrix is not positive definite
pub fn logm(a: &Array2<f64>) -> Result<Array2<f64>> {
    map_eigenvalues(a, true, f64::ln)
}

/// Matrix exponential of a symmetric matrix
///
/// # Errors
/// Returns `SingularCovariance` on overflow
pub fn expm(a: &Array2<f64>) -> Result<Array2<f64>> {
    map_eigenvalues(a, false, f64::exp)
}

/// Square root of a symmetric positive definite matrix
///
/// # Errors
/// Returns `SingularCovariance` if the matrix is not positive definite
pub fn sqrtm(a: &Array2<f64>) -> Result<Array2<f64>> {
    map_eigenvalues(a, true, f64::sqrt)
}

/// Inverse square root of a symmetric positive definite matrix
///
/// # Errors
/// Returns `SingularCovariance` if the matrix is not positive definite
pub fn inv_sqrtm(a: &Array2<f64>) -> Result<Array2<f64>> {
    map_eigenvalues(a, true, |v| 1.0 / v.sqrt())
}

/// Inverse of a symmetric positive definite matrix
///
/// # Errors
/// Returns `SingularCovariance` if the matrix is not positive definite
pub fn inv_spd(a: &Array2<f64>) -> Result<Array2<f64>> {
    map_eigenvalues(a, true, f64::recip)
}

/// Least-squares residual of each column of `y` after projecting out `x`
///
/// # Errors
/// Returns `Ml` if the SVD solve fails
pub fn residualize(y: &Array2<f64>, x: &Array2<f64>) -> Result<Array2<f64>> {
    let xm = to_dmatrix(x);
    let ym = to_dmatrix(y);
    let beta = xm
        .clone()
        .svd(true, true)
        .solve(&ym, 1e-10)
        .map_err(|e| FconnError::Ml(format!("Confound regression failed: {e}")))?;
    Ok(from_dmatrix(&(ym - xm * beta)))
}
