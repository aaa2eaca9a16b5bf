//! Symmetric matrix <-> coefficient vector conversion
//!
//! Coefficients are the row-major lower triangle `(0,0), (1,0), (1,1), (2,0), ...`
//! with off-diagonal entries scaled by sqrt(2), so the Euclidean norm of the
//! vector equals the Frobenius norm of the matrix.

use crate::structs::{FconnError, FeatureVector, Result};
use ndarray::{Array1, Array2};
use std::f64::consts::SQRT_2;

/// Number of coefficients for an `n_regions` square matrix
#[must_use]
pub const fn n_coefficients(n_regions: usize, discard_diagonal: bool) -> usize {
    if discard_diagonal {
        n_regions * n_regions.saturating_sub(1) / 2
    } else {
        n_regions * (n_regions + 1) / 2
    }
}

/// Flatten the lower triangle of a symmetric matrix
///
/// # Errors
/// Returns `DataShape` if the matrix is not square
pub fn vector_from_matrix(matrix: &Array2<f64>, discard_diagonal: bool) -> Result<FeatureVector> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(FconnError::DataShape(format!(
            "cannot vectorize a non-square {rows}x{cols} matrix"
        )));
    }

    let mut coefficients = Vec::with_capacity(n_coefficients(rows, discard_diagonal));
    for i in 0..rows {
        for j in 0..=i {
            if i == j {
                if !discard_diagonal {
                    coefficients.push(matrix[[i, i]]);
                }
            } else {
                coefficients.push(matrix[[i, j]] * SQRT_2);
            }
        }
    }
    Ok(Array1::from(coefficients))
}

/// Rebuild the symmetric matrix from a full (diagonal-included) coefficient vector
///
/// # Errors
/// Returns `DataShape` if the length is not `n_regions * (n_regions + 1) / 2`
#[allow(dead_code)]
pub fn matrix_from_vector(coefficients: &Array1<f64>, n_regions: usize) -> Result<Array2<f64>> {
    let expected = n_coefficients(n_regions, false);
    if coefficients.len() != expected {
        return Err(FconnError::DataShape(format!(
            "{} coefficients cannot form a {n_regions}x{n_regions} matrix (expected {expected})",
            coefficients.len()
        )));
    }

    let mut matrix = Array2::<f64>::zeros((n_regions, n_regions));
    let mut k = 0;
    for i in 0..n_regions {
        for j in 0..=i {
            let value = if i == j {
                coefficients[k]
            } else {
                coefficients[k] / SQRT_2
            };
            matrix[[i, j]] = value;
            matrix[[j, i]] = value;
            k += 1;
        }
    }
    Ok(matrix)
}

/// Rebuild the symmetric matrix from a discard-diagonal vector and the diagonal
///
/// # Errors
/// Returns `DataShape` if the vector length does not match the diagonal length
#[allow(dead_code)]
pub fn matrix_from_vector_with_diagonal(
    coefficients: &Array1<f64>,
    diagonal: &Array1<f64>,
) -> Result<Array2<f64>> {
    let n_regions = diagonal.len();
    let expected = n_coefficients(n_regions, true);
    if coefficients.len() != expected {
        return Err(FconnError::DataShape(format!(
            "{} off-diagonal coefficients do not match a diagonal of length {n_regions}",
            coefficients.len()
        )));
    }

    let mut matrix = Array2::from_diag(diagonal);
    let mut k = 0;
    for i in 0..n_regions {
        for j in 0..i {
            let value = coefficients[k] / SQRT_2;
            matrix[[i, j]] = value;
            matrix[[j, i]] = value;
            k += 1;
        }
    }
    Ok(matrix)
}

/// Stack one coefficient vector per subject into a subjects x coefficients matrix
///
/// # Errors
/// Returns `DataShape` for an empty cohort or differing matrix sizes
pub fn vectorize_cohort(matrices: &[Array2<f64>]) -> Result<Array2<f64>> {
    let first = matrices
        .first()
        .ok_or_else(|| FconnError::DataShape("no matrices to vectorize".into()))?;
    let width = n_coefficients(first.nrows(), false);

    let mut features = Array2::<f64>::zeros((matrices.len(), width));
    for (subject, matrix) in matrices.iter().enumerate() {
        let row = vector_from_matrix(matrix, false)?;
        if row.len() != width {
            return Err(FconnError::DataShape(format!(
                "subject {subject} yields {} coefficients, expected {width}",
                row.len()
            )));
        }
        features.row_mut(subject).assign(&row);
    }
    Ok(features)
}
