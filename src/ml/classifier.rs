//! Linear SVM and stratified cross-validation scored by ROC-AUC

use crate::config::CvConfig;
use crate::ml::split::{missing_class, StratifiedShuffleSplit};
use crate::ml::stats::{mean_std, roc_auc};
use crate::structs::{CvReport, FconnError, Result, Split};
use linfa::traits::Fit;
use linfa::Dataset;
use linfa_svm::Svm;
use ndarray::{Array1, Array2, Axis};
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// L2-regularised linear support vector classifier
///
/// Holds only hyperparameters; every `fit` returns an independent model.
#[derive(Debug, Clone, Copy)]
pub struct LinearSvc {
    /// Inverse regularisation strength
    pub c: f64,
}

/// A fitted linear SVM
pub struct LinearSvcModel {
    svm: Svm<f64, bool>,
}

impl LinearSvc {
    #[must_use]
    pub const fn new(c: f64) -> Self {
        Self { c }
    }

    /// Fit on `x` (samples x features) and binary labels `y`
    ///
    /// # Errors
    /// Returns `DataShape` on length mismatch, `Ml` if the solver fails
    pub fn fit(&self, x: &Array2<f64>, y: &[bool]) -> Result<LinearSvcModel> {
        if x.nrows() != y.len() {
            return Err(FconnError::DataShape(format!(
                "{} feature rows for {} labels",
                x.nrows(),
                y.len()
            )));
        }

        let dataset = Dataset::new(x.to_owned(), Array1::from(y.to_vec()));

        let svm = Svm::<f64, bool>::params()
            .pos_neg_weights(self.c, self.c)
            .linear_kernel()
            .fit(&dataset)
            .map_err(|e| FconnError::Ml(format!("SVM fit failed: {e}")))?;

        Ok(LinearSvcModel { svm })
    }

    /// Fit on the train side of `split` and return the test ROC-AUC
    ///
    /// # Errors
    /// Returns error if fitting fails or the decision values are not finite
    pub fn score_split(
        &self,
        index: usize,
        x: &Array2<f64>,
        y: &[bool],
        split: &Split,
    ) -> Result<f64> {
        let x_train = x.select(Axis(0), &split.train);
        let y_train: Vec<bool> = split.train.iter().map(|&i| y[i]).collect();
        let model = self.fit(&x_train, &y_train)?;

        let x_test = x.select(Axis(0), &split.test);
        let y_test: Vec<bool> = split.test.iter().map(|&i| y[i]).collect();
        let decision = model.decision_function(&x_test);

        if decision.iter().any(|v| !v.is_finite()) {
            return Err(FconnError::Ml(format!(
                "split {index}: non-finite decision values"
            )));
        }

        let auc = roc_auc(&y_test, &decision.to_vec()).map_err(|e| match e {
            FconnError::InsufficientClassCoverage { partition, .. } => {
                FconnError::InsufficientClassCoverage {
                    split: index,
                    partition,
                }
            }
            other => other,
        })?;

        debug!(split = index, auc, "scored split");
        Ok(auc)
    }
}

impl LinearSvcModel {
    /// Signed distance to the separating hyperplane, positive for the `true` class
    #[must_use]
    pub fn decision_function(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| self.svm.weighted_sum(&row) - self.svm.rho)
            .collect()
    }
}

/// Score a linear SVM over seeded stratified shuffle splits
///
/// Every split is checked for class coverage before any fitting; the first
/// split lacking a class aborts the run.
///
/// # Errors
/// `Config` for invalid settings, `DataShape` on row/label mismatch or a cohort
/// too small to split, `InsufficientClassCoverage` naming the failing split,
/// `Ml` if a fit fails
pub fn cross_validate(features: &Array2<f64>, labels: &[bool], config: &CvConfig) -> Result<CvReport> {
    config.validate()?;
    if features.nrows() != labels.len() {
        return Err(FconnError::DataShape(format!(
            "{} feature rows for {} labels",
            features.nrows(),
            labels.len()
        )));
    }

    let splits = StratifiedShuffleSplit::new(config.n_splits, config.train_fraction, config.seed)
        .split(labels)?;

    for (index, split) in splits.iter().enumerate() {
        if let Some(partition) = missing_class(split, labels) {
            return Err(FconnError::InsufficientClassCoverage {
                split: index,
                partition,
            });
        }
    }

    let classifier = LinearSvc::new(config.svm_c);
    let evaluate =
        |(index, split): (usize, &Split)| classifier.score_split(index, features, labels, split);

    #[cfg(feature = "parallel")]
    let results: Vec<Result<f64>> = splits.par_iter().enumerate().map(evaluate).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<f64>> = splits.iter().enumerate().map(evaluate).collect();

    let scores = results.into_iter().collect::<Result<Vec<f64>>>()?;
    let (mean, std) = mean_std(&scores);

    info!(
        splits = scores.len(),
        mean,
        std,
        "cross-validation finished"
    );

    Ok(CvReport { scores, mean, std })
}
