//! Pipeline configuration, loadable from JSON and overridable from the command line

use crate::structs::{ConnectivityKind, FconnError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Column names and class mapping for the phenotype table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    pub subject_column: String,
    pub func_column: String,
    pub confounds_column: String,
    pub label_column: String,
    /// Label value mapped to the positive class
    pub positive_label: String,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            subject_column: "subject".into(),
            func_column: "func".into(),
            confounds_column: "confounds".into(),
            label_column: "subject_type".into(),
            positive_label: "Patient".into(),
        }
    }
}

/// Timeseries extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Gaussian smoothing kernel FWHM in mm, <= 0 disables smoothing
    pub smoothing_fwhm: f64,
    pub detrend: bool,
    pub standardize: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            smoothing_fwhm: 6.0,
            detrend: true,
            standardize: true,
        }
    }
}

/// Cross-validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CvConfig {
    pub n_splits: usize,
    pub train_fraction: f64,
    pub seed: u64,
    /// Inverse L2 regularisation strength
    pub svm_c: f64,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            n_splits: 100,
            train_fraction: 0.75,
            seed: 0,
            svm_c: 1.0,
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cohort: CohortConfig,
    pub signal: SignalConfig,
    pub cv: CvConfig,
    pub kinds: Vec<ConnectivityKind>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cohort: CohortConfig::default(),
            signal: SignalConfig::default(),
            cv: CvConfig::default(),
            kinds: vec![ConnectivityKind::Correlation, ConnectivityKind::Tangent],
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; absent fields take their defaults
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FconnError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns a config error describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.kinds.is_empty() {
            return Err(FconnError::Config("At least one connectivity kind is required".into()));
        }
        self.cv.validate()
    }
}

impl CvConfig {
    /// Check value ranges
    ///
    /// # Errors
    /// Returns a config error describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.n_splits == 0 {
            return Err(FconnError::Config("n_splits must be at least 1".into()));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(FconnError::Config(format!(
                "train_fraction must be in (0, 1), got {}",
                self.train_fraction
            )));
        }
        if !(self.svm_c > 0.0 && self.svm_c.is_finite()) {
            return Err(FconnError::Config(format!(
                "svm_c must be positive, got {}",
                self.svm_c
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.cv.n_splits, 100);
        assert!((config.cv.train_fraction - 0.75).abs() < f64::EPSILON);
        assert_eq!(
            config.kinds,
            vec![ConnectivityKind::Correlation, ConnectivityKind::Tangent]
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().expect("create");
        file.write_all(br#"{"cv": {"n_splits": 7}, "kinds": ["partial-correlation"]}"#)
            .expect("write");

        let config = PipelineConfig::from_file(file.path()).expect("load");

        assert_eq!(config.cv.n_splits, 7);
        assert_eq!(config.cv.seed, 0);
        assert_eq!(config.kinds, vec![ConnectivityKind::PartialCorrelation]);
        assert_eq!(config.cohort.positive_label, "Patient");
        assert!((config.signal.smoothing_fwhm - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_train_fraction() {
        let mut config = PipelineConfig::default();
        config.cv.train_fraction = 1.0;
        assert!(matches!(config.validate(), Err(FconnError::Config(_))));
    }

    #[test]
    fn test_empty_kinds_rejected() {
        let config = PipelineConfig {
            kinds: Vec::new(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
