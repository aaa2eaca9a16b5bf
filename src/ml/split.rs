//! Seeded stratified shuffle splits

use crate::structs::{FconnError, Partition, Result, Split};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Repeated random train/test partitions preserving class proportions
#[derive(Debug, Clone)]
pub struct StratifiedShuffleSplit {
    pub n_splits: usize,
    pub train_fraction: f64,
    pub seed: u64,
}

impl StratifiedShuffleSplit {
    #[must_use]
    pub const fn new(n_splits: usize, train_fraction: f64, seed: u64) -> Self {
        Self {
            n_splits,
            train_fraction,
            seed,
        }
    }

    /// Train and test sizes for a cohort of `n`
    ///
    /// # Errors
    /// Returns `DataShape` if either side would be empty
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn sizes(&self, n: usize) -> Result<(usize, usize)> {
        let n_test = ((1.0 - self.train_fraction) * n as f64).ceil() as usize;
        let n_train = n.saturating_sub(n_test);
        if n_test == 0 || n_train == 0 {
            return Err(FconnError::DataShape(format!(
                "train fraction {} leaves an empty partition for {n} subjects",
                self.train_fraction
            )));
        }
        Ok((n_train, n_test))
    }

    /// Generate `n_splits` splits over `labels`; same seed, same splits
    ///
    /// # Errors
    /// Returns `DataShape` if the cohort is too small to split
    pub fn split(&self, labels: &[bool]) -> Result<Vec<Split>> {
        let (n_train, n_test) = self.sizes(labels.len())?;

        let classes: [Vec<usize>; 2] = [
            (0..labels.len()).filter(|&i| !labels[i]).collect(),
            (0..labels.len()).filter(|&i| labels[i]).collect(),
        ];
        let counts = [classes[0].len(), classes[1].len()];

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut splits = Vec::with_capacity(self.n_splits);

        for _ in 0..self.n_splits {
            let train_counts = approximate_mode(&counts, n_train);
            let remaining = [counts[0] - train_counts[0], counts[1] - train_counts[1]];
            let test_counts = approximate_mode(&remaining, n_test);

            let mut train = Vec::with_capacity(n_train);
            let mut test = Vec::with_capacity(n_test);
            for (class, members) in classes.iter().enumerate() {
                let mut shuffled = members.clone();
                shuffled.shuffle(&mut rng);
                train.extend_from_slice(&shuffled[..train_counts[class]]);
                test.extend_from_slice(
                    &shuffled[train_counts[class]..train_counts[class] + test_counts[class]],
                );
            }
            train.shuffle(&mut rng);
            test.shuffle(&mut rng);

            splits.push(Split { train, test });
        }

        Ok(splits)
    }
}

/// Allocate `n_draws` across classes proportionally to `counts`
///
/// Floors of the proportional shares, then the remainder one at a time to the
/// classes with the largest fractional parts (ties to the lower class index),
/// never exceeding a class count.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn approximate_mode(counts: &[usize; 2], n_draws: usize) -> [usize; 2] {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return [0, 0];
    }

    let shares: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 * n_draws as f64 / total as f64)
        .collect();
    let mut alloc = [shares[0].floor() as usize, shares[1].floor() as usize];

    let mut order = [0usize, 1];
    order.sort_by(|&a, &b| {
        let fa = shares[a] - shares[a].floor();
        let fb = shares[b] - shares[b].floor();
        fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut need = n_draws.saturating_sub(alloc[0] + alloc[1]);
    while need > 0 {
        let before = need;
        for &class in &order {
            if need > 0 && alloc[class] < counts[class] {
                alloc[class] += 1;
                need -= 1;
            }
        }
        if need == before {
            break;
        }
    }
    alloc
}

/// Which partition of `split`, if any, lacks one of the two classes
#[must_use]
pub fn missing_class(split: &Split, labels: &[bool]) -> Option<Partition> {
    let covers = |indices: &[usize]| {
        indices.iter().any(|&i| labels[i]) && indices.iter().any(|&i| !labels[i])
    };
    if !covers(&split.train) {
        Some(Partition::Train)
    } else if !covers(&split.test) {
        Some(Partition::Test)
    } else {
        None
    }
}
