use crate::structs::{FconnError, Partition, Result, ScoreStats};

impl ScoreStats {
    /// Calculate statistics for a set of scores
    ///
    /// # Errors
    /// Returns error if values is empty
    pub fn calculate(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(FconnError::Ml("Cannot calculate stats for empty scores".into()));
        }

        let (mean, std_dev) = mean_std(values);

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        Ok(Self {
            count: values.len(),
            mean,
            std_dev,
            min: sorted[0],
            q1: percentile(&sorted, 25.0),
            median: percentile(&sorted, 50.0),
            q3: percentile(&sorted, 75.0),
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Mean and population standard deviation; `(NaN, NaN)` for no values
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Calculate percentile using linear interpolation
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let k = (p / 100.0) * (sorted.len() - 1) as f64;
    let f = k.floor() as usize;
    let c = k.ceil() as usize;

    if f == c {
        sorted[f]
    } else {
        sorted[f] * (c as f64 - k) + sorted[c] * (k - f as f64)
    }
}

/// Area under the ROC curve for decision `scores` against binary `labels`
///
/// Computed as the Mann-Whitney statistic with average ranks for ties, so a
/// constant scorer gets 0.5.
///
/// # Errors
/// `DataShape` on length mismatch, `InsufficientClassCoverage` (split 0, test)
/// if only one class is present
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Result<f64> {
    if labels.len() != scores.len() {
        return Err(FconnError::DataShape(format!(
            "{} labels for {} scores",
            labels.len(),
            scores.len()
        )));
    }

    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(FconnError::InsufficientClassCoverage {
            split: 0,
            partition: Partition::Test,
        });
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // 1-based ranks, ties share their average rank
    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg_rank;
        }
        start = end;
    }

    let rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter_map(|(&l, &r)| l.then_some(r))
        .sum();

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    let u = rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Ok(u / (n_pos * n_neg))
}
