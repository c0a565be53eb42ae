//! podium-core — face-aware image-pair similarity scoring.
//!
//! Decides whether the main subject changed between two frames of an event
//! recording: detect faces (SCRFD via ONNX Runtime), compare the largest
//! face regions with a fused histogram + pixel-difference metric, and fall
//! back to whole-frame comparison when no face is found in either frame.

pub mod detector;
pub mod loader;
pub mod region;
pub mod scorer;
pub mod types;

pub use detector::{FaceDetector, OnnxFaceDetector};
pub use scorer::{compare_images, compare_paths};
pub use types::{Region, SimilarityResult};

use std::path::PathBuf;

/// Default directory searched for the ONNX detection model file.
pub fn default_model_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".local/share/podium/models")
}
