//! Region timeseries extraction from voxel data using a label atlas

use crate::config::SignalConfig;
use crate::ml::signal;
use crate::structs::{Atlas, FconnError, Result};
use ndarray::Array2;
use std::collections::HashMap;
use tracing::debug;

/// FWHM to Gaussian sigma: 2 * sqrt(2 * ln 2)
const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// Kernel truncation radius in sigmas
const TRUNCATE: f64 = 3.0;

/// Atlas-derived extraction state, computed once and shared across subjects
#[derive(Debug, Clone)]
pub struct LabelsMasker {
    n_voxels: usize,
    /// Voxel indices per region, ascending label order
    members: Vec<Vec<usize>>,
    /// Normalised `(neighbour, weight)` lists per voxel; `None` when smoothing is off
    kernel: Option<Vec<Vec<(usize, f64)>>>,
    config: SignalConfig,
}

impl LabelsMasker {
    /// Precompute region membership and the smoothing neighbourhoods for `atlas`
    #[must_use]
    pub fn new(atlas: &Atlas, config: &SignalConfig) -> Self {
        let position: HashMap<i64, usize> = atlas
            .regions
            .iter()
            .enumerate()
            .map(|(i, &label)| (label, i))
            .collect();

        let mut members = vec![Vec::new(); atlas.n_regions()];
        for (voxel, label) in atlas.labels.iter().enumerate() {
            if let Some(&region) = position.get(label) {
                members[region].push(voxel);
            }
        }

        let kernel = (config.smoothing_fwhm > 0.0)
            .then(|| smoothing_kernel(&atlas.coords, config.smoothing_fwhm));

        debug!(
            voxels = atlas.n_voxels(),
            regions = atlas.n_regions(),
            smoothing = kernel.is_some(),
            "built labels masker"
        );

        Self {
            n_voxels: atlas.n_voxels(),
            members,
            kernel,
            config: config.clone(),
        }
    }

    /// Number of regions in the output timeseries
    #[must_use]
    pub fn n_regions(&self) -> usize {
        self.members.len()
    }

    /// Extract a cleaned timeseries matrix (timepoints x regions) for one subject
    ///
    /// # Errors
    /// `DataShape` if the voxel count does not match the atlas or there are fewer
    /// than two timepoints, `ConfoundAlignment` if the confound row count differs
    /// from the timepoint count
    pub fn transform(
        &self,
        subject: usize,
        image: &Array2<f64>,
        confounds: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        let (timepoints, voxels) = image.dim();

        if voxels != self.n_voxels {
            return Err(FconnError::DataShape(format!(
                "subject {subject}: functional data has {voxels} voxels, atlas has {}",
                self.n_voxels
            )));
        }
        if timepoints < 2 {
            return Err(FconnError::DataShape(format!(
                "subject {subject}: need at least 2 timepoints, got {timepoints}"
            )));
        }
        if let Some(c) = confounds {
            if c.nrows() != timepoints {
                return Err(FconnError::ConfoundAlignment {
                    subject,
                    confound_rows: c.nrows(),
                    timepoints,
                });
            }
        }

        let smoothed = match &self.kernel {
            Some(kernel) => smooth(image, kernel),
            None => image.clone(),
        };

        let mut regions = Array2::<f64>::zeros((timepoints, self.n_regions()));
        for (r, voxels) in self.members.iter().enumerate() {
            if voxels.is_empty() {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let scale = 1.0 / voxels.len() as f64;
            let mut column = regions.column_mut(r);
            for &v in voxels {
                column.scaled_add(scale, &smoothed.column(v));
            }
        }

        signal::clean(&regions, confounds, &self.config)
    }
}

/// Gaussian neighbourhoods over voxel coordinates, weights summing to 1 per voxel
fn smoothing_kernel(coords: &[[i64; 3]], fwhm: f64) -> Vec<Vec<(usize, f64)>> {
    let sigma = fwhm / FWHM_PER_SIGMA;
    let radius_sq = (TRUNCATE * sigma).powi(2);
    let denom = 2.0 * sigma * sigma;

    coords
        .iter()
        .map(|a| {
            let mut weights: Vec<(usize, f64)> = coords
                .iter()
                .enumerate()
                .filter_map(|(j, b)| {
                    #[allow(clippy::cast_precision_loss)]
                    let d2 = a
                        .iter()
                        .zip(b.iter())
                        .map(|(p, q)| ((p - q) as f64).powi(2))
                        .sum::<f64>();
                    (d2 <= radius_sq).then(|| (j, (-d2 / denom).exp()))
                })
                .collect();
            let total: f64 = weights.iter().map(|(_, w)| w).sum();
            for (_, w) in &mut weights {
                *w /= total;
            }
            weights
        })
        .collect()
}

fn smooth(image: &Array2<f64>, kernel: &[Vec<(usize, f64)>]) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros(image.dim());
    for (v, neighbours) in kernel.iter().enumerate() {
        let mut column = out.column_mut(v);
        for &(j, w) in neighbours {
            column.scaled_add(w, &image.column(j));
        }
    }
    out
}
