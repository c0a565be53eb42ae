use std::path::PathBuf;

const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing the ONNX detection model.
    pub model_dir: PathBuf,
}

impl Config {
    /// Load configuration from `PODIUM_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("PODIUM_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| podium_core::default_model_dir());
        Self { model_dir }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}
