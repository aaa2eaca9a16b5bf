//! File-backed dataset and atlas provider

use crate::config::CohortConfig;
use crate::csv_reader::{read_matrix, CsvData};
use crate::structs::{Atlas, FconnError, Result, Subject};
use ndarray::Array2;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Subjects of a study, in phenotype file order
#[derive(Debug, Clone)]
pub struct Cohort {
    pub subjects: Vec<Subject>,
}

/// Resolve `value` against `base` unless it is already absolute
fn resolve(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl Cohort {
    /// Read subjects from a phenotype table
    ///
    /// # Errors
    /// Returns error if the table cannot be read, a required column is missing,
    /// or a subject has an empty path or label
    pub fn from_phenotype(path: &Path, config: &CohortConfig) -> Result<Self> {
        let csv = CsvData::from_path(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let id_col = csv.require_column(&config.subject_column, path)?;
        let func_col = csv.require_column(&config.func_column, path)?;
        let label_col = csv.require_column(&config.label_column, path)?;
        let confounds_col = csv.column_index(&config.confounds_column);

        let mut subjects = Vec::with_capacity(csv.row_count());
        for row in 0..csv.row_count() {
            let id = csv.cell(row, id_col).unwrap_or_default().to_string();
            let func = csv.cell(row, func_col).unwrap_or_default();
            let label_value = csv.cell(row, label_col).unwrap_or_default().to_string();

            if func.is_empty() {
                return Err(FconnError::Config(format!(
                    "Subject {row} ({id}) has no functional data path"
                )));
            }
            if label_value.is_empty() {
                return Err(FconnError::Config(format!(
                    "Subject {row} ({id}) has an empty '{}' value",
                    config.label_column
                )));
            }

            let confounds = confounds_col
                .and_then(|c| csv.cell(row, c))
                .filter(|s| !s.is_empty())
                .map(|s| resolve(base, s));

            subjects.push(Subject {
                index: row,
                id,
                func: resolve(base, func),
                confounds,
                label: label_value == config.positive_label,
            });
        }

        if subjects.is_empty() {
            return Err(FconnError::Config(format!(
                "No subjects in {}",
                path.display()
            )));
        }

        debug!(subjects = subjects.len(), "loaded phenotype table");
        Ok(Self { subjects })
    }

    /// Number of subjects
    #[must_use]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Binary class labels aligned with `subjects`
    #[must_use]
    pub fn labels(&self) -> Vec<bool> {
        self.subjects.iter().map(|s| s.label).collect()
    }

    /// Number of positive-class subjects
    #[must_use]
    pub fn n_positive(&self) -> usize {
        self.subjects.iter().filter(|s| s.label).count()
    }
}

/// Load a subject's functional data, timepoints x voxels
///
/// # Errors
/// Returns error if the file cannot be read or is not numeric
pub fn load_functional(subject: &Subject) -> Result<Array2<f64>> {
    read_matrix(&subject.func)
}

/// Load a subject's confound signals, timepoints x confounds
///
/// # Errors
/// Returns error if the file cannot be read or is not numeric
pub fn load_confounds(subject: &Subject) -> Result<Option<Array2<f64>>> {
    subject.confounds.as_deref().map(read_matrix).transpose()
}

impl Atlas {
    /// Read a label table with `x`, `y`, `z` and `label` columns, one row per voxel
    ///
    /// # Errors
    /// Returns error if a column is missing, a value is not an integer, or no
    /// voxel carries a non-zero label
    pub fn from_file(path: &Path) -> Result<Self> {
        let csv = CsvData::from_path(path)?;
        let cols = [
            csv.require_column("x", path)?,
            csv.require_column("y", path)?,
            csv.require_column("z", path)?,
        ];
        let label_col = csv.require_column("label", path)?;

        let parse = |row: usize, col: usize| -> Result<i64> {
            let cell = csv.cell(row, col).unwrap_or_default();
            cell.parse::<i64>().map_err(|_| {
                FconnError::DataShape(format!(
                    "{}: non-integer value '{cell}' at row {}",
                    path.display(),
                    row + 1
                ))
            })
        };

        let mut coords = Vec::with_capacity(csv.row_count());
        let mut labels = Vec::with_capacity(csv.row_count());
        for row in 0..csv.row_count() {
            coords.push([parse(row, cols[0])?, parse(row, cols[1])?, parse(row, cols[2])?]);
            labels.push(parse(row, label_col)?);
        }

        Self::new(coords, labels)
    }

    /// Build an atlas from voxel coordinates and labels
    ///
    /// # Errors
    /// Returns error on length mismatch or when every label is background
    pub fn new(coords: Vec<[i64; 3]>, labels: Vec<i64>) -> Result<Self> {
        if coords.len() != labels.len() {
            return Err(FconnError::DataShape(format!(
                "atlas has {} coordinates but {} labels",
                coords.len(),
                labels.len()
            )));
        }

        let regions: Vec<i64> = labels
            .iter()
            .copied()
            .filter(|&l| l != 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if regions.is_empty() {
            return Err(FconnError::DataShape("atlas has no labelled regions".into()));
        }

        Ok(Self {
            coords,
            labels,
            regions,
        })
    }
}
