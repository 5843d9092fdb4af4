//! Baseline reconstruction scorer.
//!
//! Trains a reduced linear basis from a fixed-size set of sampled frames and
//! scores new frames by how poorly the basis reconstructs them. The
//! eigen-decomposition itself is delegated to nalgebra's SVD; the authored
//! logic is frame vectorization and the error arithmetic.

use image::imageops::FilterType;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Edge length of the downsampled grayscale vectorization (64×64 = 4096 dims).
pub const BASELINE_EDGE: u32 = 64;

/// Number of frames collected before a training run fires.
pub const TRAINING_TARGET_FRAMES: usize = 15;

/// Below this many samples, training is a no-op.
pub const MIN_TRAINING_FRAMES: usize = 5;

/// Fixed divisor applied to the raw reconstruction error.
const SCORE_SCALE: f32 = 10.0;

// ITU-R BT.601 luminance weights.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

// Relative cutoff below which a singular value is treated as zero.
const SINGULAR_VALUE_TOL: f32 = 1e-5;

#[derive(Error, Debug)]
pub enum BaselineError {
    #[error("frame buffer length {actual} does not match {width}x{height} RGBA")]
    BadBuffer { width: u32, height: u32, actual: usize },
    #[error("training needs at least 2 samples, got {0}")]
    NotEnoughSamples(usize),
    #[error("training sample {index} has {actual} dims, expected {expected}")]
    InconsistentSample { index: usize, expected: usize, actual: usize },
}

/// Downsample an RGBA frame to a fixed-length grayscale intensity vector.
///
/// Deterministic: 64×64 bilinear resize, then per-pixel BT.601 luminance
/// scaled to [0, 1].
pub fn vectorize_rgba(rgba: &[u8], width: u32, height: u32) -> Result<Vec<f32>, BaselineError> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(BaselineError::BadBuffer { width, height, actual: rgba.len() });
    }
    let img = image::RgbaImage::from_raw(width, height, rgba.to_vec())
        .ok_or(BaselineError::BadBuffer { width, height, actual: rgba.len() })?;
    let small = image::imageops::resize(&img, BASELINE_EDGE, BASELINE_EDGE, FilterType::Triangle);

    Ok(small
        .pixels()
        .map(|p| (LUMA_R * p[0] as f32 + LUMA_G * p[1] as f32 + LUMA_B * p[2] as f32) / 255.0)
        .collect())
}

/// Reduced linear basis with a mean vector — the narrow contract the scorer
/// needs from whatever numerical backend computed it.
pub trait Subspace: Send {
    /// Project a full-dimensional vector into the reduced space.
    fn project(&self, v: &[f32]) -> Vec<f32>;
    /// Map a reduced-space vector back to full dimensionality.
    fn reconstruct(&self, p: &[f32]) -> Vec<f32>;
    /// Fraction of total variance each retained component explains.
    fn explained_variance_ratio(&self) -> &[f32];
    /// Dimensionality of the full space.
    fn input_dim(&self) -> usize;
}

/// Subspace fitted with a thin SVD of the centered sample matrix.
pub struct SvdSubspace {
    mean: DVector<f32>,
    /// Retained principal directions, one per row (k × d).
    components: DMatrix<f32>,
    explained: Vec<f32>,
}

impl SvdSubspace {
    /// Fit mean and principal directions from the sample set.
    ///
    /// Singular values below a relative tolerance are dropped, so a
    /// degenerate sample set (all frames identical) yields a zero-component
    /// basis whose reconstruction is simply the mean.
    pub fn fit(samples: &[Vec<f32>]) -> Result<Self, BaselineError> {
        if samples.len() < 2 {
            return Err(BaselineError::NotEnoughSamples(samples.len()));
        }
        let dim = samples[0].len();
        for (index, s) in samples.iter().enumerate() {
            if s.len() != dim {
                return Err(BaselineError::InconsistentSample {
                    index,
                    expected: dim,
                    actual: s.len(),
                });
            }
        }

        let n = samples.len();
        let mut mean = DVector::<f32>::zeros(dim);
        for s in samples {
            mean += DVector::from_column_slice(s);
        }
        mean /= n as f32;

        let centered = DMatrix::from_row_iterator(
            n,
            dim,
            samples
                .iter()
                .flat_map(|s| s.iter().enumerate().map(|(i, &v)| v - mean[i])),
        );

        let svd = centered.svd(false, true);
        let v_t = svd
            .v_t
            .expect("svd computed with right singular vectors");
        let singular = &svd.singular_values;

        let total: f32 = singular.iter().map(|s| s * s).sum();
        let s_max = singular.iter().cloned().fold(0.0f32, f32::max);
        let tol = s_max * SINGULAR_VALUE_TOL;

        let kept: Vec<usize> = (0..singular.len())
            .filter(|&i| singular[i] > tol && singular[i] > 0.0)
            .collect();

        let mut components = DMatrix::<f32>::zeros(kept.len(), dim);
        let mut explained = Vec::with_capacity(kept.len());
        for (row, &i) in kept.iter().enumerate() {
            components.row_mut(row).copy_from(&v_t.row(i));
            explained.push(if total > 0.0 { singular[i] * singular[i] / total } else { 0.0 });
        }

        tracing::debug!(
            samples = n,
            dims = dim,
            retained = kept.len(),
            "baseline subspace fitted"
        );

        Ok(Self { mean, components, explained })
    }
}

impl Subspace for SvdSubspace {
    fn project(&self, v: &[f32]) -> Vec<f32> {
        let centered = DVector::from_column_slice(v) - &self.mean;
        (&self.components * centered).iter().copied().collect()
    }

    fn reconstruct(&self, p: &[f32]) -> Vec<f32> {
        let full = self.components.transpose() * DVector::from_column_slice(p) + &self.mean;
        full.iter().copied().collect()
    }

    fn explained_variance_ratio(&self) -> &[f32] {
        &self.explained
    }

    fn input_dim(&self) -> usize {
        self.mean.len()
    }
}

/// Score plus a human-readable explanation for the operator log.
#[derive(Debug, Clone)]
pub struct AnomalyScore {
    pub score: f32,
    pub details: String,
}

/// Reconstruction-error anomaly scorer.
///
/// Replaced wholesale on retraining, never updated incrementally.
pub struct BaselineScorer {
    subspace: Option<Box<dyn Subspace>>,
}

impl BaselineScorer {
    pub fn new() -> Self {
        Self { subspace: None }
    }

    /// Inject a pre-fitted basis (used by tests and custom backends).
    pub fn with_subspace(subspace: Box<dyn Subspace>) -> Self {
        Self { subspace: Some(subspace) }
    }

    pub fn is_trained(&self) -> bool {
        self.subspace.is_some()
    }

    pub fn explained_variance_ratio(&self) -> Option<&[f32]> {
        self.subspace.as_deref().map(Subspace::explained_variance_ratio)
    }

    /// Fit a fresh subspace from the sample set.
    ///
    /// Returns `Ok(false)` without touching the current model when fewer
    /// than [`MIN_TRAINING_FRAMES`] samples are supplied.
    pub fn train(&mut self, samples: &[Vec<f32>]) -> Result<bool, BaselineError> {
        if samples.len() < MIN_TRAINING_FRAMES {
            tracing::warn!(
                samples = samples.len(),
                minimum = MIN_TRAINING_FRAMES,
                "too few samples, baseline left unchanged"
            );
            return Ok(false);
        }
        self.subspace = Some(Box::new(SvdSubspace::fit(samples)?));
        Ok(true)
    }

    /// Scaled reconstruction error of `v` against the trained baseline.
    ///
    /// Untrained scorers report a zero score rather than failing.
    pub fn score(&self, v: &[f32]) -> AnomalyScore {
        let Some(subspace) = self.subspace.as_deref() else {
            return AnomalyScore { score: 0.0, details: "Model not trained".into() };
        };
        if v.len() != subspace.input_dim() {
            tracing::warn!(
                got = v.len(),
                expected = subspace.input_dim(),
                "scoring input has wrong dimensionality"
            );
            return AnomalyScore { score: 0.0, details: "Input length mismatch".into() };
        }

        let reconstructed = subspace.reconstruct(&subspace.project(v));
        let error: f32 = v
            .iter()
            .zip(reconstructed.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt();
        let score = error / SCORE_SCALE;

        let leading = subspace
            .explained_variance_ratio()
            .first()
            .copied()
            .unwrap_or(0.0);
        AnomalyScore {
            score,
            details: format!(
                "Reconstruction error: {score:.4}. Leading component explains {:.2}% of baseline variance.",
                leading * 100.0
            ),
        }
    }
}

impl Default for BaselineScorer {
    fn default() -> Self {
        Self::new()
    }
}
