//! Image loading.

use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to load image {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Decode a still image (JPEG/PNG) from disk into a pixel buffer.
pub fn load_image(path: &Path) -> Result<DynamicImage, LoadError> {
    let img = image::open(path).map_err(|source| LoadError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "loaded image"
    );
    Ok(img)
}
