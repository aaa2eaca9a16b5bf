//! Synthetic cohorts for demos and end-to-end runs

use crate::structs::{FconnError, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, StandardNormal};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

/// Side length of each region's voxel cube
const BLOCK: i64 = 2;

/// Shape and seed of a generated cohort
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub n_per_class: usize,
    pub timepoints: usize,
    pub regions: usize,
    /// Coupling strength added between regions 0 and 1 for positive subjects
    pub effect: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            n_per_class: 10,
            timepoints: 50,
            regions: 5,
            effect: 0.0,
            seed: 0,
        }
    }
}

impl SyntheticSpec {
    /// Labels `[false; n] ++ [true; n]`
    #[must_use]
    pub fn labels(&self) -> Vec<bool> {
        (0..2 * self.n_per_class)
            .map(|i| i >= self.n_per_class)
            .collect()
    }
}

/// Region timeseries per subject
fn region_signals(spec: &SyntheticSpec, positive: bool, rng: &mut StdRng) -> Array2<f64> {
    let mut ts: Array2<f64> =
        Array2::from_shape_simple_fn((spec.timepoints, spec.regions), || {
            StandardNormal.sample(&mut *rng)
        });
    if positive && spec.regions >= 2 && spec.effect != 0.0 {
        let driver = ts.column(0).to_owned();
        ts.column_mut(1).scaled_add(spec.effect, &driver);
    }
    ts
}

/// Gaussian timeseries (timepoints x regions) per subject, plus labels
#[must_use]
pub fn generate_timeseries(spec: &SyntheticSpec) -> (Vec<Array2<f64>>, Vec<bool>) {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let labels = spec.labels();
    let timeseries = labels
        .iter()
        .map(|&positive| region_signals(spec, positive, &mut rng))
        .collect();
    (timeseries, labels)
}

/// Voxel coordinates and labels: one `BLOCK`^3 cube per region along x, 10 mm apart
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn atlas_layout(regions: usize) -> (Vec<[i64; 3]>, Vec<i64>) {
    let mut coords = Vec::new();
    let mut labels = Vec::new();
    for (r, label) in (1..=regions as i64).enumerate() {
        let x0 = r as i64 * 10;
        for dx in 0..BLOCK {
            for dy in 0..BLOCK {
                for dz in 0..BLOCK {
                    coords.push([x0 + dx, dy, dz]);
                    labels.push(label);
                }
            }
        }
    }
    (coords, labels)
}

fn matrix_csv(header_prefix: &str, data: &Array2<f64>) -> String {
    let header: Vec<String> = (0..data.ncols()).map(|i| format!("{header_prefix}{i}")).collect();
    let mut out = header.join(",");
    out.push('\n');
    for row in data.rows() {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
        let _ = writeln!(out, "{}", cells.join(","));
    }
    out
}

/// Write an on-disk cohort: `atlas.csv`, `phenotype.csv`, and per-subject
/// functional and confound tables
///
/// # Errors
/// Returns error if the directory or a file cannot be written
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn write_dataset(dir: &Path, spec: &SyntheticSpec) -> Result<()> {
    fs::create_dir_all(dir)?;

    let (coords, atlas_labels) = atlas_layout(spec.regions);
    let mut atlas = String::from("x,y,z,label\n");
    for (c, l) in coords.iter().zip(&atlas_labels) {
        let _ = writeln!(atlas, "{},{},{},{l}", c[0], c[1], c[2]);
    }
    fs::write(dir.join("atlas.csv"), atlas)?;

    let (timeseries, labels) = generate_timeseries(spec);
    let mut rng = StdRng::seed_from_u64(spec.seed.wrapping_add(1));
    let voxel_noise = Normal::new(0.0, 0.5)
        .map_err(|e| FconnError::Config(format!("invalid noise distribution: {e}")))?;

    let mut phenotype = String::from("subject,func,confounds,subject_type\n");
    for (index, (ts, &positive)) in timeseries.iter().zip(&labels).enumerate() {
        let id = format!("sub-{index:04}");

        let confounds: Array2<f64> = Array2::from_shape_fn((spec.timepoints, 2), |(t, c)| {
            if c == 0 {
                t as f64 / spec.timepoints as f64
            } else {
                StandardNormal.sample(&mut rng)
            }
        });

        let image = Array2::from_shape_fn((spec.timepoints, atlas_labels.len()), |(t, v)| {
            let region = (atlas_labels[v] - 1) as usize;
            ts[[t, region]] + 0.8 * confounds[[t, 1]] + 2.0 * confounds[[t, 0]]
                + voxel_noise.sample(&mut rng)
        });

        let func_name = format!("{id}_func.csv");
        let confounds_name = format!("{id}_confounds.csv");
        fs::write(dir.join(&func_name), matrix_csv("v", &image))?;
        fs::write(dir.join(&confounds_name), matrix_csv("c", &confounds))?;

        let class = if positive { "Patient" } else { "Control" };
        let _ = writeln!(phenotype, "{id},{func_name},{confounds_name},{class}");
    }
    fs::write(dir.join("phenotype.csv"), phenotype)?;

    info!(
        subjects = labels.len(),
        regions = spec.regions,
        dir = %dir.display(),
        "wrote synthetic dataset"
    );
    Ok(())
}
