//! Result file writers for the analyze and demo commands

use crate::config::PipelineConfig;
use crate::structs::{AnalysisResult, ConnectivityKind, Result, ScoreStats};
use ndarray::Array2;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Build the human readable overview written to `summary.txt`
#[must_use]
pub fn build_summary(source: &str, n_subjects: usize, n_positive: usize, result: &AnalysisResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Connectivity classification: {source}");
    let _ = writeln!(
        out,
        "Subjects: {n_subjects} ({n_positive} positive, {} negative)",
        n_subjects - n_positive
    );
    let _ = writeln!(out);

    for report in &result.reports {
        let _ = writeln!(out, "[{}]", report.kind);
        let _ = writeln!(out, "  {}", report.cv.summary());
        if let Ok(stats) = ScoreStats::calculate(&report.cv.scores) {
            let _ = writeln!(out, "  {}", stats.summary());
        }
        let _ = writeln!(out);
    }

    if let Some(best) = result
        .reports
        .iter()
        .max_by(|a, b| a.cv.mean.partial_cmp(&b.cv.mean).unwrap_or(std::cmp::Ordering::Equal))
    {
        let _ = writeln!(out, "Best kind: {} (mean ROC-AUC {:.3})", best.kind, best.cv.mean);
    }
    out
}

/// Write `summary.txt`
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_summary(output_dir: &Path, content: &str) -> Result<()> {
    let path = output_dir.join("summary.txt");
    fs::write(path, content)?;
    Ok(())
}

/// Write `scores.csv` - one row per kind and split
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_scores(output_dir: &Path, result: &AnalysisResult) -> Result<()> {
    let path = output_dir.join("scores.csv");
    let mut content = String::from("kind,split,roc_auc\n");

    for report in &result.reports {
        for (split, score) in report.cv.scores.iter().enumerate() {
            let _ = writeln!(content, "{},{split},{score:.6}", report.kind);
        }
    }

    fs::write(path, content)?;
    Ok(())
}

/// Path of the mean matrix file for `kind`
#[must_use]
pub fn matrix_path(output_dir: &Path, kind: ConnectivityKind) -> PathBuf {
    output_dir.join(format!("mean_{}.csv", kind.name().replace('-', "_")))
}

/// Write a region x region matrix with region names as header and row labels
///
/// # Errors
/// Returns error if the file cannot be written
pub fn write_matrix_csv(path: &Path, matrix: &Array2<f64>, names: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![String::from("region")];
    header.extend(names.iter().cloned());
    writer.write_record(&header)?;

    for (name, row) in names.iter().zip(matrix.rows()) {
        let mut record = vec![name.clone()];
        record.extend(row.iter().map(|v| format!("{v:.6}")));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write `mean_<kind>.csv` for every report
///
/// # Errors
/// Returns error if a file cannot be written
pub fn write_mean_matrices(output_dir: &Path, result: &AnalysisResult, names: &[String]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(result.reports.len());
    for report in &result.reports {
        let path = matrix_path(output_dir, report.kind);
        write_matrix_csv(&path, &report.mean_matrix, names)?;
        written.push(path);
    }
    Ok(written)
}

/// Write `results.json` - configuration echo plus per-kind scores
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_results_json(
    output_dir: &Path,
    config: &PipelineConfig,
    n_subjects: usize,
    n_positive: usize,
    result: &AnalysisResult,
) -> Result<()> {
    let path = output_dir.join("results.json");

    let kinds = result
        .reports
        .iter()
        .map(|r| {
            Ok(KindEntry {
                kind: r.kind,
                mean: r.cv.mean,
                std: r.cv.std,
                stats: ScoreStats::calculate(&r.cv.scores)?,
                scores: &r.cv.scores,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let output = ResultsOutput {
        subjects: n_subjects,
        positive: n_positive,
        config,
        kinds,
    };

    let json = serde_json::to_string_pretty(&output)?;
    fs::write(path, json)?;
    Ok(())
}

// JSON output structures

#[derive(Serialize)]
struct ResultsOutput<'a> {
    subjects: usize,
    positive: usize,
    config: &'a PipelineConfig,
    kinds: Vec<KindEntry<'a>>,
}

#[derive(Serialize)]
struct KindEntry<'a> {
    kind: ConnectivityKind,
    mean: f64,
    std: f64,
    stats: ScoreStats,
    scores: &'a [f64],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::{CvReport, KindReport};
    use tempfile::TempDir;

    fn sample_result() -> AnalysisResult {
        let report = |kind, scores: Vec<f64>| KindReport {
            kind,
            cv: CvReport {
                mean: scores.iter().sum::<f64>() / 2.0,
                std: 0.05,
                scores,
            },
            mean_matrix: Array2::eye(2),
        };
        AnalysisResult {
            reports: vec![
                report(ConnectivityKind::Correlation, vec![0.6, 0.7]),
                report(ConnectivityKind::PartialCorrelation, vec![0.8, 0.9]),
            ],
        }
    }

    #[test]
    fn test_write_summary() {
        let dir = TempDir::new().expect("create temp dir");
        write_summary(dir.path(), "Test summary content").expect("write summary");

        let content = fs::read_to_string(dir.path().join("summary.txt")).expect("read");
        assert_eq!(content, "Test summary content");
    }

    #[test]
    fn test_build_summary() {
        let summary = build_summary("cohort.csv", 20, 10, &sample_result());
        assert!(summary.contains("Subjects: 20 (10 positive, 10 negative)"));
        assert!(summary.contains("[correlation]"));
        assert!(summary.contains("Best kind: partial-correlation"));
    }

    #[test]
    fn test_write_scores() {
        let dir = TempDir::new().expect("create temp dir");
        write_scores(dir.path(), &sample_result()).expect("write scores");

        let content = fs::read_to_string(dir.path().join("scores.csv")).expect("read");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "kind,split,roc_auc");
        assert_eq!(lines[1], "correlation,0,0.600000");
        assert_eq!(lines[4], "partial-correlation,1,0.900000");
    }

    #[test]
    fn test_write_mean_matrices() {
        let dir = TempDir::new().expect("create temp dir");
        let names = vec!["region_1".to_string(), "region_2".to_string()];
        let written = write_mean_matrices(dir.path(), &sample_result(), &names).expect("write");

        assert_eq!(written.len(), 2);
        assert!(written[1].ends_with("mean_partial_correlation.csv"));
        let content = fs::read_to_string(&written[0]).expect("read");
        assert!(content.starts_with("region,region_1,region_2\n"));
        assert!(content.contains("region_2,0.000000,1.000000"));
    }

    #[test]
    fn test_write_results_json() {
        let dir = TempDir::new().expect("create temp dir");
        write_results_json(dir.path(), &PipelineConfig::default(), 20, 10, &sample_result())
            .expect("write json");

        let content = fs::read_to_string(dir.path().join("results.json")).expect("read");
        let value: serde_json::Value = serde_json::from_str(&content).expect("parse");
        assert_eq!(value["subjects"], 20);
        assert_eq!(value["kinds"][1]["kind"], "partial-correlation");
        assert_eq!(value["kinds"][0]["scores"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["config"]["cv"]["n_splits"], 100);
    }
}
