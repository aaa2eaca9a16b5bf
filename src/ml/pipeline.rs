//! Analysis pipeline that chains extraction, connectivity, vectorization and classification

use crate::cohort::{load_confounds, load_functional, Cohort};
use crate::config::PipelineConfig;
use crate::ml::classifier::cross_validate;
use crate::ml::connectivity::connectivity;
use crate::ml::masker::LabelsMasker;
use crate::ml::vectorize::vectorize_cohort;
use crate::structs::{AnalysisResult, FconnError, KindReport, Result, Subject};
use ndarray::Array2;
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Load and extract the region timeseries of every subject, cohort order
///
/// Every subject is processed before errors are inspected, so the error
/// returned is that of the lowest failing subject index.
///
/// # Errors
/// `DataShape` for an empty cohort, otherwise the lowest failing subject's
/// load or extraction error
pub fn extract_cohort(cohort: &Cohort, masker: &LabelsMasker) -> Result<Vec<Array2<f64>>> {
    if cohort.is_empty() {
        return Err(FconnError::DataShape("cohort has no subjects".into()));
    }

    let extract = |subject: &Subject| -> Result<Array2<f64>> {
        let image = load_functional(subject)?;
        let confounds = load_confounds(subject)?;
        let ts = masker.transform(subject.index, &image, confounds.as_ref())?;
        debug!(subject = %subject.id, timepoints = ts.nrows(), "extracted timeseries");
        Ok(ts)
    };

    #[cfg(feature = "parallel")]
    let results: Vec<Result<Array2<f64>>> = cohort.subjects.par_iter().map(extract).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<Array2<f64>>> = cohort.subjects.iter().map(extract).collect();

    let timeseries = results.into_iter().collect::<Result<Vec<_>>>()?;
    info!(
        subjects = timeseries.len(),
        regions = masker.n_regions(),
        "extracted cohort timeseries"
    );
    Ok(timeseries)
}

/// Run connectivity, vectorization and cross-validation for each configured kind
///
/// # Errors
/// Returns error on invalid configuration, mismatched labels, or the first
/// failing stage of any kind
pub fn run_pipeline(
    timeseries: &[Array2<f64>],
    labels: &[bool],
    config: &PipelineConfig,
) -> Result<AnalysisResult> {
    config.validate()?;
    if timeseries.len() != labels.len() {
        return Err(FconnError::DataShape(format!(
            "{} timeseries for {} labels",
            timeseries.len(),
            labels.len()
        )));
    }

    let mut reports = Vec::with_capacity(config.kinds.len());
    for &kind in &config.kinds {
        info!(kind = %kind, "estimating connectivity");
        let conn = connectivity(timeseries, kind)?;
        let features = vectorize_cohort(&conn.matrices)?;
        let cv = cross_validate(&features, labels, &config.cv)?;
        info!(kind = %conn.kind, "{}", cv.summary());

        reports.push(KindReport {
            kind: conn.kind,
            cv,
            mean_matrix: conn.mean,
        });
    }

    Ok(AnalysisResult { reports })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CvConfig, SignalConfig};
    use crate::structs::{Atlas, ConnectivityKind};
    use crate::synthetic::{generate_timeseries, write_dataset, SyntheticSpec};
    use std::fs;
    use tempfile::TempDir;

    fn config(n_splits: usize) -> PipelineConfig {
        PipelineConfig {
            cv: CvConfig {
                n_splits,
                ..CvConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_synthetic_end_to_end() {
        let (timeseries, labels) = generate_timeseries(&SyntheticSpec::default());
        let result = run_pipeline(&timeseries, &labels, &config(10)).expect("pipeline");

        assert_eq!(result.reports.len(), 2);
        assert_eq!(result.reports[0].kind, ConnectivityKind::Correlation);
        assert_eq!(result.reports[1].kind, ConnectivityKind::Tangent);
        for report in &result.reports {
            assert_eq!(report.cv.scores.len(), 10);
            assert!(report.cv.scores.iter().all(|s| (0.0..=1.0).contains(s)));
            assert_eq!(report.mean_matrix.dim(), (5, 5));
        }
    }

    #[test]
    fn test_strong_effect_is_detected() {
        let spec = SyntheticSpec {
            effect: 2.0,
            seed: 5,
            ..SyntheticSpec::default()
        };
        let (timeseries, labels) = generate_timeseries(&spec);
        let mut cfg = config(10);
        cfg.kinds = vec![ConnectivityKind::Correlation];

        let result = run_pipeline(&timeseries, &labels, &cfg).expect("pipeline");
        assert!(result.reports[0].cv.mean > 0.8, "{}", result.reports[0].cv.summary());
    }

    #[test]
    fn test_single_member_class_aborts() {
        let (timeseries, mut labels) = generate_timeseries(&SyntheticSpec::default());
        for label in &mut labels {
            *label = false;
        }
        labels[3] = true;

        let result = run_pipeline(&timeseries, &labels, &config(10));
        assert!(matches!(
            result,
            Err(FconnError::InsufficientClassCoverage { .. })
        ));
    }

    #[test]
    fn test_label_count_mismatch() {
        let (timeseries, labels) = generate_timeseries(&SyntheticSpec::default());
        let result = run_pipeline(&timeseries[..19], &labels, &config(2));
        assert!(matches!(result, Err(FconnError::DataShape(_))));
    }

    fn on_disk_cohort(dir: &TempDir) -> (Cohort, LabelsMasker) {
        let spec = SyntheticSpec {
            n_per_class: 3,
            timepoints: 20,
            regions: 3,
            effect: 0.5,
            seed: 1,
        };
        write_dataset(dir.path(), &spec).expect("write dataset");

        let cfg = PipelineConfig::default();
        let cohort =
            Cohort::from_phenotype(&dir.path().join("phenotype.csv"), &cfg.cohort).expect("cohort");
        let atlas = Atlas::from_file(&dir.path().join("atlas.csv")).expect("atlas");
        let masker = LabelsMasker::new(&atlas, &SignalConfig::default());
        (cohort, masker)
    }

    #[test]
    fn test_extract_cohort_from_disk() {
        let dir = TempDir::new().expect("create temp dir");
        let (cohort, masker) = on_disk_cohort(&dir);

        let timeseries = extract_cohort(&cohort, &masker).expect("extract");
        assert_eq!(timeseries.len(), 6);
        assert!(timeseries.iter().all(|ts| ts.dim() == (20, 3)));
        assert_eq!(cohort.n_positive(), 3);
    }

    #[test]
    fn test_confound_mismatch_names_subject() {
        let dir = TempDir::new().expect("create temp dir");
        let (cohort, masker) = on_disk_cohort(&dir);

        let confounds = dir.path().join("sub-0002_confounds.csv");
        let content = fs::read_to_string(&confounds).expect("read confounds");
        let truncated: Vec<&str> = content.lines().take(11).collect();
        fs::write(&confounds, truncated.join("\n")).expect("rewrite confounds");

        match extract_cohort(&cohort, &masker) {
            Err(FconnError::ConfoundAlignment {
                subject,
                confound_rows,
                timepoints,
            }) => {
                assert_eq!(subject, 2);
                assert_eq!(confound_rows, 10);
                assert_eq!(timepoints, 20);
            }
            other => panic!("expected confound alignment error, got {other:?}"),
        }
    }

    #[test]
    fn test_lowest_failing_subject_is_reported() {
        let dir = TempDir::new().expect("create temp dir");
        let (cohort, masker) = on_disk_cohort(&dir);

        for (id, keep) in [("sub-0004", 6), ("sub-0001", 16)] {
            let confounds = dir.path().join(format!("{id}_confounds.csv"));
            let content = fs::read_to_string(&confounds).expect("read confounds");
            let truncated: Vec<&str> = content.lines().take(keep).collect();
            fs::write(&confounds, truncated.join("\n")).expect("rewrite confounds");
        }

        for _ in 0..5 {
            match extract_cohort(&cohort, &masker) {
                Err(FconnError::ConfoundAlignment { subject, .. }) => assert_eq!(subject, 1),
                other => panic!("expected confound alignment error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_cohort_is_shape_error() {
        let dir = TempDir::new().expect("create temp dir");
        let (_, masker) = on_disk_cohort(&dir);
        let cohort = Cohort { subjects: vec![] };
        assert!(matches!(
            extract_cohort(&cohort, &masker),
            Err(FconnError::DataShape(_))
        ));
    }
}
