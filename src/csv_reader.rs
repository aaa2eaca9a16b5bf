use crate::structs::{FconnError, Result};
use csv::ReaderBuilder;
use ndarray::Array2;
use std::path::Path;

/// Represents a parsed CSV/TSV file with headers and rows
#[derive(Debug, Clone)]
pub struct CsvData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Whether a path should be read tab-delimited
#[must_use]
pub fn is_tsv_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tsv"))
}

impl CsvData {
    /// Parse a CSV or TSV file
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or a record is malformed
    pub fn from_file(path: &Path, is_tsv: bool) -> Result<Self> {
        let delimiter = if is_tsv { b'\t' } else { b',' };

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    /// Parse a file, choosing the delimiter from its extension
    ///
    /// # Errors
    /// Returns error if the file cannot be parsed
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_file(path, is_tsv_path(path))
    }

    /// Get number of rows
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get number of columns
    #[must_use]
    pub fn col_count(&self) -> usize {
        self.headers.len()
    }

    /// Get column index by name
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Get column index by name, failing with a message naming the file
    ///
    /// # Errors
    /// Returns a config error if the column is absent
    pub fn require_column(&self, name: &str, source: &Path) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            FconnError::Config(format!(
                "Column '{name}' not found in {} (columns: {})",
                source.display(),
                self.headers.join(", ")
            ))
        })
    }

    /// Get a cell as a string slice
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col)).map(String::as_str)
    }

    /// Convert every cell to `f64`, rows x columns
    ///
    /// # Errors
    /// Returns a shape error on ragged rows or non-numeric cells
    pub fn to_matrix(&self) -> Result<Array2<f64>> {
        let n_cols = self.col_count();
        let mut flat = Vec::with_capacity(self.row_count() * n_cols);

        for (row_idx, row) in self.rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(FconnError::DataShape(format!(
                    "row {} has {} values, expected {n_cols}",
                    row_idx + 1,
                    row.len()
                )));
            }
            for (col_idx, cell) in row.iter().enumerate() {
                let value = cell.parse::<f64>().map_err(|_| {
                    FconnError::DataShape(format!(
                        "non-numeric value '{cell}' at row {}, column '{}'",
                        row_idx + 1,
                        self.headers[col_idx]
                    ))
                })?;
                flat.push(value);
            }
        }

        Array2::from_shape_vec((self.row_count(), n_cols), flat)
            .map_err(|e| FconnError::DataShape(format!("Failed to create array: {e}")))
    }
}

/// Read a numeric matrix file (header row, then one row per observation)
///
/// # Errors
/// Returns error if the file cannot be read or contains non-numeric cells
pub fn read_matrix(path: &Path) -> Result<Array2<f64>> {
    CsvData::from_path(path)?.to_matrix().map_err(|e| match e {
        FconnError::DataShape(msg) => FconnError::DataShape(format!("{}: {msg}", path.display())),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn create_test_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(content.as_bytes()).expect("write content");
        file
    }

    #[test]
    fn test_parse_csv() {
        let file = create_test_csv("subject,func,subject_type\ns1,a.csv,Patient\ns2,b.csv,Control");

        let data = CsvData::from_file(file.path(), false).expect("parse csv");

        assert_eq!(data.headers, vec!["subject", "func", "subject_type"]);
        assert_eq!(data.row_count(), 2);
        assert_eq!(data.col_count(), 3);
        assert_eq!(data.cell(1, 2), Some("Control"));
    }

    #[test]
    fn test_to_matrix() {
        let file = create_test_csv("v0,v1\n1.0,2.0\n3.0,4.5\n-1,0");

        let matrix = CsvData::from_file(file.path(), false)
            .expect("parse csv")
            .to_matrix()
            .expect("numeric");

        assert_eq!(matrix.dim(), (3, 2));
        assert!((matrix[[1, 1]] - 4.5).abs() < 1e-12);
        assert!((matrix[[2, 0]] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_numeric_cell_is_shape_error() {
        let file = create_test_csv("v0,v1\n1.0,abc");

        let result = read_matrix(file.path());
        assert!(matches!(result, Err(FconnError::DataShape(_))));
    }

    #[test]
    fn test_tsv_by_extension() {
        let mut file = Builder::new().suffix(".tsv").tempfile().expect("create temp file");
        file.write_all(b"a\tb\n1\t2\n").expect("write content");

        assert!(is_tsv_path(file.path()));
        let matrix = read_matrix(file.path()).expect("read tsv");
        assert_eq!(matrix.dim(), (1, 2));
    }

    #[test]
    fn test_require_column() {
        let file = create_test_csv("a,b\n1,2");
        let data = CsvData::from_file(file.path(), false).expect("parse csv");

        assert_eq!(data.require_column("b", file.path()).expect("present"), 1);
        assert!(data.require_column("missing", file.path()).is_err());
    }
}
