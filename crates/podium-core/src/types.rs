use serde::{Deserialize, Serialize};

/// Similarity reported when an input image could not be loaded.
/// Pessimistic: assume the subject changed.
pub const DEGRADED_LOAD_SIMILARITY: f64 = 0.3;

/// Similarity reported when the detection/scoring path faulted.
/// Neutral: assume the subject did not change.
pub const DEGRADED_FAULT_SIMILARITY: f64 = 0.5;

/// Rectangular sub-area of an image believed to contain a face,
/// in the source image's pixel coordinate space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detection confidence score.
    pub confidence: f32,
}

impl Region {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Verdict of one image-pair comparison.
///
/// `confidence` always equals `similarity`; there is no independent
/// confidence estimator. `similarity` is clamped to [0, 1] even though
/// intermediate metrics (histogram correlation) can be negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub similarity: f64,
    pub person_change: bool,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SimilarityResult {
    /// Package a raw similarity score into a verdict.
    ///
    /// The threshold is exclusive: a score exactly at the threshold is
    /// not a change.
    pub fn scored(similarity: f64, change_threshold: f64) -> Self {
        let similarity = similarity.clamp(0.0, 1.0);
        Self {
            similarity,
            person_change: similarity < change_threshold,
            confidence: similarity,
            error: None,
        }
    }

    /// Degraded verdict for an unreadable input image.
    pub fn degraded_load(reason: impl Into<String>) -> Self {
        Self {
            similarity: DEGRADED_LOAD_SIMILARITY,
            person_change: true,
            confidence: DEGRADED_LOAD_SIMILARITY,
            error: Some(reason.into()),
        }
    }

    /// Degraded verdict for an unexpected fault in detection or scoring.
    pub fn degraded_fault(reason: impl Into<String>) -> Self {
        Self {
            similarity: DEGRADED_FAULT_SIMILARITY,
            person_change: false,
            confidence: DEGRADED_FAULT_SIMILARITY,
            error: Some(reason.into()),
        }
    }
}
