//! Frontal-face detection via ONNX Runtime.
//!
//! Runs an SCRFD-style anchor-free detector over a grayscale derivative of
//! the input frame and reports candidate face regions. Detection is a pure
//! function of the image: zero faces is an empty result, never an error.

use crate::types::Region;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DETECTOR_INPUT_SIZE: u32 = 640;
const DETECTOR_MEAN: f32 = 127.5;
const DETECTOR_STD: f32 = 128.0;
/// Tuned for recall over precision: marginal detections still feed the
/// largest-region selector, which discards everything but one box anyway.
const SCORE_THRESHOLD: f32 = 0.4;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Pluggable face detection backend.
///
/// The similarity scorer only needs candidate regions; tests substitute a
/// stub implementation so the scoring pipeline runs without a model file.
pub trait FaceDetector {
    /// Detect faces in a grayscale frame. An image without faces yields an
    /// empty vec.
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<Region>, DetectorError>;
}

/// Metadata for mapping detections back out of the letterboxed input.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// SCRFD-based face detector.
///
/// Load once at startup and reuse across comparisons; the session holds
/// read-only model state for the process lifetime.
pub struct OnnxFaceDetector {
    session: Session,
}

impl OnnxFaceDetector {
    /// Load the detection model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            "loaded face detection model"
        );

        // Scores for strides 8/16/32 come first, then the matching bbox
        // tensors. Landmark outputs (if the export has them) trail behind
        // and are ignored.
        if num_outputs < 2 * STRIDES.len() {
            return Err(DetectorError::InferenceFailed(format!(
                "detection model requires {} outputs (scores + bboxes per stride), got {num_outputs}",
                2 * STRIDES.len()
            )));
        }

        Ok(Self { session })
    }

    fn detect_faces(&mut self, gray: &GrayImage) -> Result<Vec<Region>, DetectorError> {
        let (input, letterbox) = preprocess(gray, DETECTOR_INPUT_SIZE);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (stride_pos, &stride) in STRIDES.iter().enumerate() {
            let (_, scores) = outputs[stride_pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[stride_pos + STRIDES.len()]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                DETECTOR_INPUT_SIZE as usize,
                &letterbox,
                SCORE_THRESHOLD,
            ));
        }

        let regions = nms(candidates, NMS_IOU_THRESHOLD);
        tracing::debug!(faces = regions.len(), "face detection complete");
        Ok(regions)
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<Region>, DetectorError> {
        self.detect_faces(gray)
    }
}

/// Letterbox-resize a grayscale frame into an NCHW float tensor.
///
/// The frame is scaled to fit within the square input, centered, and
/// normalized; padding stays at the mean value, which normalizes to 0.
/// Grayscale is replicated across the three input channels.
fn preprocess(gray: &GrayImage, input_size: u32) -> (Array4<f32>, Letterbox) {
    let (width, height) = gray.dimensions();
    let scale = (input_size as f32 / width as f32).min(input_size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, input_size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, input_size);
    let pad_x = (input_size - new_w) as f32 / 2.0;
    let pad_y = (input_size - new_h) as f32 / 2.0;

    let resized = imageops::resize(gray, new_w, new_h, FilterType::Triangle);

    let size = input_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let x0 = pad_x.floor() as usize;
    let y0 = pad_y.floor() as usize;
    for (px, py, pixel) in resized.enumerate_pixels() {
        let normalized = (pixel.0[0] as f32 - DETECTOR_MEAN) / DETECTOR_STD;
        let (tx, ty) = (x0 + px as usize, y0 + py as usize);
        tensor[[0, 0, ty, tx]] = normalized;
        tensor[[0, 1, ty, tx]] = normalized;
        tensor[[0, 2, ty, tx]] = normalized;
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Decode anchor-free detections for one stride level, mapping boxes from
/// letterboxed space back into source-frame coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<Region> {
    let grid_w = input_size / stride;
    let grid_h = input_size / stride;
    let num_anchors = grid_h * grid_w * ANCHORS_PER_CELL;

    let mut regions = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid_w) as f32 * stride as f32;
        let anchor_cy = (anchor_idx / grid_w) as f32 * stride as f32;

        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[off] * stride as f32;
        let y1 = anchor_cy - bboxes[off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[off + 3] * stride as f32;

        let orig_x1 = (x1 - letterbox.pad_x) / letterbox.scale;
        let orig_y1 = (y1 - letterbox.pad_y) / letterbox.scale;
        let orig_x2 = (x2 - letterbox.pad_x) / letterbox.scale;
        let orig_y2 = (y2 - letterbox.pad_y) / letterbox.scale;

        regions.push(Region {
            x: orig_x1,
            y: orig_y1,
            width: orig_x2 - orig_x1,
            height: orig_y2 - orig_y1,
            confidence: score,
        });
    }

    regions
}

/// Non-Maximum Suppression: drop regions that overlap a stronger one.
fn nms(mut regions: Vec<Region>, iou_threshold: f32) -> Vec<Region> {
    regions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Region> = Vec::new();
    for candidate in regions {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-Union between two regions.
fn iou(a: &Region, b: &Region) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_region(x: f32, y: f32, w: f32, h: f32, conf: f32) -> Region {
        Region { x, y, width: w, height: h, confidence: conf }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_region(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = make_region(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_region(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = make_region(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_region(5.0, 0.0, 10.0, 10.0, 1.0);
        // intersection 50, union 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let regions = vec![
            make_region(0.0, 0.0, 100.0, 100.0, 0.9),
            make_region(5.0, 5.0, 100.0, 100.0, 0.8),
            make_region(300.0, 300.0, 50.0, 50.0, 0.7),
        ];
        let kept = nms(regions, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_decode_stride_below_threshold_yields_nothing() {
        let grid = DETECTOR_INPUT_SIZE as usize / 32;
        let anchors = grid * grid * ANCHORS_PER_CELL;
        let scores = vec![0.1f32; anchors];
        let bboxes = vec![1.0f32; anchors * 4];
        let letterbox = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };

        let regions = decode_stride(
            &scores,
            &bboxes,
            32,
            DETECTOR_INPUT_SIZE as usize,
            &letterbox,
            SCORE_THRESHOLD,
        );
        assert!(regions.is_empty());
    }

    #[test]
    fn test_decode_stride_single_anchor() {
        let grid = DETECTOR_INPUT_SIZE as usize / 32;
        let anchors = grid * grid * ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        scores[0] = 0.9;
        // Offsets of 0.5 cells in each direction around anchor (0, 0).
        let mut bboxes = vec![0.0f32; anchors * 4];
        bboxes[0..4].copy_from_slice(&[0.5, 0.5, 0.5, 0.5]);
        let letterbox = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };

        let regions = decode_stride(
            &scores,
            &bboxes,
            32,
            DETECTOR_INPUT_SIZE as usize,
            &letterbox,
            SCORE_THRESHOLD,
        );
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert!((r.x - (-16.0)).abs() < 1e-4);
        assert!((r.y - (-16.0)).abs() < 1e-4);
        assert!((r.width - 32.0).abs() < 1e-4);
        assert!((r.height - 32.0).abs() < 1e-4);
        assert!((r.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_stride_undoes_letterbox() {
        let grid = DETECTOR_INPUT_SIZE as usize / 32;
        let anchors = grid * grid * ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        // Anchor at cell (2, 1) for the first anchor slot.
        let cell = grid + 2;
        scores[cell * ANCHORS_PER_CELL] = 0.8;
        let mut bboxes = vec![0.0f32; anchors * 4];
        let off = cell * ANCHORS_PER_CELL * 4;
        bboxes[off..off + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let letterbox = Letterbox { scale: 2.0, pad_x: 0.0, pad_y: 80.0 };
        let regions = decode_stride(
            &scores,
            &bboxes,
            32,
            DETECTOR_INPUT_SIZE as usize,
            &letterbox,
            SCORE_THRESHOLD,
        );
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        // Anchor center (64, 32), box from (32, 0) to (96, 64) in letterbox
        // space; unpad y by 80 and divide by scale 2.
        assert!((r.x - 16.0).abs() < 1e-4);
        assert!((r.y - (-40.0)).abs() < 1e-4);
        assert!((r.width - 32.0).abs() < 1e-4);
        assert!((r.height - 32.0).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_shape_and_letterbox() {
        let gray = GrayImage::from_pixel(320, 240, image::Luma([128]));
        let (tensor, letterbox) = preprocess(&gray, DETECTOR_INPUT_SIZE);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((letterbox.scale - 2.0).abs() < 1e-6);
        assert!((letterbox.pad_x - 0.0).abs() < 1e-6);
        assert!((letterbox.pad_y - 80.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_normalization_and_padding() {
        let gray = GrayImage::from_pixel(640, 320, image::Luma([128]));
        let (tensor, _) = preprocess(&gray, DETECTOR_INPUT_SIZE);

        // Center of the content area: pixel 128 normalized.
        let expected = (128.0 - DETECTOR_MEAN) / DETECTOR_STD;
        assert!((tensor[[0, 0, 320, 320]] - expected).abs() < 1e-6);
        // Top padding row stays at the zero point of the distribution.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        // Channels are replicated.
        assert_eq!(tensor[[0, 1, 320, 320]], tensor[[0, 2, 320, 320]]);
    }
}
