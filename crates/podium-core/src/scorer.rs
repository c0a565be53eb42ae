//! Fused image-pair similarity scoring.
//!
//! Two operating modes, chosen by whether BOTH frames yielded a face
//! region: face patches are compared with a weighted blend of histogram
//! correlation and mean pixel difference; faceless pairs fall back to a
//! whole-frame pixel comparison with a stricter change threshold.

use crate::detector::{DetectorError, FaceDetector};
use crate::loader::{load_image, LoadError};
use crate::region::{largest_region, normalize_patch, PATCH_SIZE};
use crate::types::SimilarityResult;
use image::imageops::FilterType;
use image::{DynamicImage, Pixel, RgbImage};
use std::path::Path;
use thiserror::Error;

pub const HIST_BINS: usize = 256;
const HIST_WEIGHT: f64 = 0.6;
const PIXEL_WEIGHT: f64 = 0.4;

/// Change threshold for aligned face patches. Small crops are a tight
/// signal, so a lower bar suffices before declaring a change.
pub const FACE_CHANGE_THRESHOLD: f64 = 0.6;
/// Change threshold for whole-frame comparison. Background and lighting
/// dominate here, so the bar is higher to avoid false positives.
pub const FRAME_CHANGE_THRESHOLD: f64 = 0.7;

/// Internal pipeline failure, classified into the two degraded-result
/// postures: unreadable input (pessimistic) vs unexpected fault (neutral).
#[derive(Error, Debug)]
pub enum CompareError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

impl CompareError {
    fn into_result(self) -> SimilarityResult {
        match self {
            CompareError::Load(e) => SimilarityResult::degraded_load(e.to_string()),
            CompareError::Detector(e) => SimilarityResult::degraded_fault(e.to_string()),
        }
    }
}

/// Compare two frames on disk.
///
/// Never fails: every error path folds into a well-formed degraded
/// [`SimilarityResult`] so a batch of comparisons is never halted.
pub fn compare_paths(
    detector: &mut dyn FaceDetector,
    path_a: &Path,
    path_b: &Path,
) -> SimilarityResult {
    let loaded = (|| Ok::<_, CompareError>((load_image(path_a)?, load_image(path_b)?)))();
    match loaded {
        Ok((a, b)) => compare_images(detector, &a, &b),
        Err(err) => {
            tracing::warn!(error = %err, "comparison degraded");
            err.into_result()
        }
    }
}

/// Compare two decoded frames. Same no-fail contract as [`compare_paths`].
pub fn compare_images(
    detector: &mut dyn FaceDetector,
    a: &DynamicImage,
    b: &DynamicImage,
) -> SimilarityResult {
    match compare_inner(detector, a, b) {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(error = %err, "comparison degraded");
            err.into_result()
        }
    }
}

fn compare_inner(
    detector: &mut dyn FaceDetector,
    a: &DynamicImage,
    b: &DynamicImage,
) -> Result<SimilarityResult, CompareError> {
    let faces_a = detector.detect(&a.to_luma8())?;
    let faces_b = detector.detect(&b.to_luma8())?;
    tracing::debug!(faces_a = faces_a.len(), faces_b = faces_b.len(), "detection done");

    match (largest_region(&faces_a), largest_region(&faces_b)) {
        (Some(face_a), Some(face_b)) => {
            let patch_a = normalize_patch(a, face_a);
            let patch_b = normalize_patch(b, face_b);
            let similarity = face_similarity(&patch_a, &patch_b);
            Ok(SimilarityResult::scored(similarity, FACE_CHANGE_THRESHOLD))
        }
        _ => {
            tracing::debug!("no face in at least one frame, using whole-frame comparison");
            let similarity = frame_similarity(a, b);
            Ok(SimilarityResult::scored(similarity, FRAME_CHANGE_THRESHOLD))
        }
    }
}

/// Fused similarity of two canonical face patches: weighted blend of
/// intensity-histogram correlation and mean pixel difference, clamped to
/// [0, 1] (the correlation term can be negative).
pub fn face_similarity(a: &RgbImage, b: &RgbImage) -> f64 {
    let hist = histogram_correlation(&intensity_histogram(a), &intensity_histogram(b));
    let pixel = pixel_similarity(a, b);
    (HIST_WEIGHT * hist + PIXEL_WEIGHT * pixel).clamp(0.0, 1.0)
}

/// Whole-frame fallback: rescale both frames to the canonical patch size,
/// convert to grayscale, and score by mean pixel difference.
pub fn frame_similarity(a: &DynamicImage, b: &DynamicImage) -> f64 {
    let gray_a = a.resize_exact(PATCH_SIZE, PATCH_SIZE, FilterType::Triangle).to_luma8();
    let gray_b = b.resize_exact(PATCH_SIZE, PATCH_SIZE, FilterType::Triangle).to_luma8();
    mean_difference_similarity(gray_a.as_raw(), gray_b.as_raw())
}

/// 256-bin intensity histogram of a patch, min-max normalized to [0, 1].
fn intensity_histogram(patch: &RgbImage) -> [f64; HIST_BINS] {
    let mut counts = [0u32; HIST_BINS];
    for pixel in patch.pixels() {
        let luma = pixel.to_luma().0[0];
        counts[luma as usize] += 1;
    }

    let max = *counts.iter().max().unwrap_or(&0) as f64;
    let min = *counts.iter().min().unwrap_or(&0) as f64;

    let mut hist = [0.0f64; HIST_BINS];
    if max > min {
        for (bin, &count) in hist.iter_mut().zip(counts.iter()) {
            *bin = (count as f64 - min) / (max - min);
        }
    }
    hist
}

/// Pearson correlation between two normalized histograms, in [-1, 1].
///
/// Zero-variance rule: two flat histograms correlate at 1.0, a flat
/// histogram against a varying one at 0.0. Keeps all-black patches (and
/// other degenerate inputs) from producing a division fault.
fn histogram_correlation(a: &[f64; HIST_BINS], b: &[f64; HIST_BINS]) -> f64 {
    let n = HIST_BINS as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    match (var_a == 0.0, var_b == 0.0) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => cov / (var_a.sqrt() * var_b.sqrt()),
    }
}

/// Mean-absolute-difference similarity over two same-size patches:
/// `1 − mean(|a − b|)/255`, in [0, 1].
fn pixel_similarity(a: &RgbImage, b: &RgbImage) -> f64 {
    mean_difference_similarity(a.as_raw(), b.as_raw())
}

fn mean_difference_similarity(a: &[u8], b: &[u8]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 1.0;
    }
    let total: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x as f64 - y as f64).abs())
        .sum();
    let mean = total / a.len() as f64;
    (1.0 - mean / 255.0).clamp(0.0, 1.0)
}
