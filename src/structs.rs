//! Consolidated public types for the fconn crate
//!
//! This module contains the error type and the data carried between pipeline stages.

use clap::ValueEnum;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum FconnError {
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Data shape error: {0}")]
    DataShape(String),

    #[error(
        "Confound alignment error: subject {subject} has {confound_rows} confound rows for {timepoints} timepoints"
    )]
    ConfoundAlignment {
        subject: usize,
        confound_rows: usize,
        timepoints: usize,
    },

    #[error("Singular covariance: {0}")]
    SingularCovariance(String),

    #[error("Insufficient class coverage: split {split} has a single class in its {partition} partition")]
    InsufficientClassCoverage { split: usize, partition: Partition },

    #[error("ML error: {0}")]
    Ml(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FconnError>;

/// Side of a train/test split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Train,
    Test,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => f.write_str("train"),
            Self::Test => f.write_str("test"),
        }
    }
}

// ============================================================================
// Cohort Types
// ============================================================================

/// One row of the phenotype table
#[derive(Debug, Clone)]
pub struct Subject {
    /// Position in the cohort (phenotype file order)
    pub index: usize,
    pub id: String,
    /// Functional data, timepoints x voxels
    pub func: PathBuf,
    pub confounds: Option<PathBuf>,
    pub label: bool,
}

/// Voxel coordinates and region labels of a parcellation
#[derive(Debug, Clone)]
pub struct Atlas {
    /// Integer `[x, y, z]` per voxel, in millimetres
    pub coords: Vec<[i64; 3]>,
    /// Region label per voxel, 0 is background
    pub labels: Vec<i64>,
    /// Distinct non-zero labels in ascending order
    pub regions: Vec<i64>,
}

impl Atlas {
    /// Number of voxels (columns expected in functional data)
    #[must_use]
    pub fn n_voxels(&self) -> usize {
        self.labels.len()
    }

    /// Number of labelled regions
    #[must_use]
    pub fn n_regions(&self) -> usize {
        self.regions.len()
    }

    /// Region names used as matrix headers
    #[must_use]
    pub fn region_names(&self) -> Vec<String> {
        self.regions.iter().map(|r| format!("region_{r}")).collect()
    }
}

// ============================================================================
// Connectivity Types
// ============================================================================

/// Connectivity measure computed per subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectivityKind {
    Covariance,
    Correlation,
    PartialCorrelation,
    Tangent,
    Precision,
}

impl ConnectivityKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Covariance => "covariance",
            Self::Correlation => "correlation",
            Self::PartialCorrelation => "partial-correlation",
            Self::Tangent => "tangent",
            Self::Precision => "precision",
        }
    }
}

impl fmt::Display for ConnectivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-subject connectivity matrices of one kind
#[derive(Debug, Clone)]
pub struct Connectivity {
    pub kind: ConnectivityKind,
    /// One regions x regions matrix per subject, cohort order
    pub matrices: Vec<Array2<f64>>,
    /// Geometric mean covariance for `Tangent`, arithmetic mean of `matrices` otherwise
    pub mean: Array2<f64>,
}

// ============================================================================
// Cross-Validation Types
// ============================================================================

/// Disjoint train/test index sets over the cohort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Scores from one cross-validation run
#[derive(Debug, Clone, Serialize)]
pub struct CvReport {
    /// ROC-AUC per split, split order
    pub scores: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

impl CvReport {
    /// Format as a summary line
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "ROC-AUC {:.3} +/- {:.3} over {} splits",
            self.mean,
            self.std,
            self.scores.len()
        )
    }
}

/// Distribution summary of split scores
#[derive(Debug, Clone, Serialize)]
pub struct ScoreStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl ScoreStats {
    /// Format as a summary string
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "n={}, mean={:.3}, std={:.3}, min={:.3}, Q1={:.3}, median={:.3}, Q3={:.3}, max={:.3}",
            self.count, self.mean, self.std_dev, self.min, self.q1, self.median, self.q3, self.max
        )
    }
}

/// Classification outcome for one connectivity kind
#[derive(Debug, Clone)]
pub struct KindReport {
    pub kind: ConnectivityKind,
    pub cv: CvReport,
    pub mean_matrix: Array2<f64>,
}

/// Result of the full pipeline
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub reports: Vec<KindReport>,
}

/// A subject's features as fed to the classifier
pub type FeatureVector = Array1<f64>;
