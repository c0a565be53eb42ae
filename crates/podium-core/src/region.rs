//! Region selection and normalization.
//!
//! The largest detected region stands in for the "main subject" of a frame.
//! Selected regions are cropped and rescaled to a fixed canonical size so
//! the similarity metrics are comparable regardless of source resolution.

use crate::types::Region;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

/// Canonical patch edge length for all similarity metrics.
pub const PATCH_SIZE: u32 = 100;

/// Pick the region with maximum area. Ties keep the first-encountered
/// region in detector output order. Empty input is "no region", not an
/// error.
pub fn largest_region(regions: &[Region]) -> Option<&Region> {
    let mut best: Option<&Region> = None;
    for region in regions {
        match best {
            Some(b) if region.area() <= b.area() => {}
            _ => best = Some(region),
        }
    }
    best
}

/// Crop the image to a detected region and rescale to the canonical
/// [`PATCH_SIZE`]² patch using linear interpolation.
///
/// The region is clamped to the image bounds first; detectors may report
/// boxes that extend slightly past the frame edge.
pub fn normalize_patch(image: &DynamicImage, region: &Region) -> RgbImage {
    let (img_w, img_h) = (image.width(), image.height());

    let x = (region.x.max(0.0) as u32).min(img_w.saturating_sub(1));
    let y = (region.y.max(0.0) as u32).min(img_h.saturating_sub(1));
    let w = (region.width.round() as u32).clamp(1, img_w - x);
    let h = (region.height.round() as u32).clamp(1, img_h - y);

    let crop = image.crop_imm(x, y, w, h).into_rgb8();
    imageops::resize(&crop, PATCH_SIZE, PATCH_SIZE, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_region(x: f32, y: f32, w: f32, h: f32) -> Region {
        Region { x, y, width: w, height: h, confidence: 0.9 }
    }

    #[test]
    fn test_largest_region_picks_max_area() {
        let regions = vec![
            make_region(0.0, 0.0, 10.0, 10.0),
            make_region(5.0, 5.0, 20.0, 20.0),
        ];
        let best = largest_region(&regions).unwrap();
        assert_eq!(best.x, 5.0);
        assert_eq!(best.area(), 400.0);
    }

    #[test]
    fn test_largest_region_tie_keeps_first() {
        let regions = vec![
            make_region(0.0, 0.0, 10.0, 10.0),
            make_region(50.0, 50.0, 10.0, 10.0),
        ];
        let best = largest_region(&regions).unwrap();
        assert_eq!(best.x, 0.0);
    }

    #[test]
    fn test_largest_region_empty_is_none() {
        assert!(largest_region(&[]).is_none());
    }

    #[test]
    fn test_normalize_patch_canonical_size() {
        let img = DynamicImage::new_rgb8(320, 240);
        let patch = normalize_patch(&img, &make_region(10.0, 10.0, 64.0, 48.0));
        assert_eq!(patch.dimensions(), (PATCH_SIZE, PATCH_SIZE));
    }

    #[test]
    fn test_normalize_patch_clamps_out_of_bounds_region() {
        // Detector box extends past the right/bottom edge.
        let img = DynamicImage::new_rgb8(100, 100);
        let patch = normalize_patch(&img, &make_region(80.0, 80.0, 50.0, 50.0));
        assert_eq!(patch.dimensions(), (PATCH_SIZE, PATCH_SIZE));
    }

    #[test]
    fn test_normalize_patch_negative_origin() {
        let img = DynamicImage::new_rgb8(100, 100);
        let patch = normalize_patch(&img, &make_region(-5.0, -5.0, 40.0, 40.0));
        assert_eq!(patch.dimensions(), (PATCH_SIZE, PATCH_SIZE));
    }

    #[test]
    fn test_normalize_patch_preserves_uniform_content() {
        let mut rgb = RgbImage::new(200, 200);
        for p in rgb.pixels_mut() {
            *p = image::Rgb([90, 120, 150]);
        }
        let img = DynamicImage::ImageRgb8(rgb);
        let patch = normalize_patch(&img, &make_region(40.0, 40.0, 80.0, 80.0));
        assert!(patch.pixels().all(|p| p.0 == [90, 120, 150]));
    }
}
