use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::detection::domain::detection_config::DetectionConfig;
use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::config_error::ConfigError;
use crate::shared::frame::Frame;

use super::haar_cascade::{HaarCascade, IntegralImage};
use super::math::{group_rectangles, GROUP_EPS};

/// Multi-scale sliding-window face detector driven by a Haar cascade.
///
/// Scans a grayscale image pyramid with the cascade window, then merges the
/// raw hits with neighbour grouping.
pub struct HaarCascadeDetector {
    cascade: HaarCascade,
    config: DetectionConfig,
}

impl HaarCascadeDetector {
    pub fn new(cascade: HaarCascade, config: DetectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { cascade, config })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Raw window hits in frame coordinates, before grouping.
    fn scan(&self, gray: &GrayImage) -> Vec<BoundingBox> {
        let (fw, fh) = gray.dimensions();
        let (ww, wh) = self.cascade.window_size();
        let (min_w, min_h) = self.config.min_size;
        let mut hits = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let scaled_w = (fw as f64 / factor).round() as u32;
            let scaled_h = (fh as f64 / factor).round() as u32;
            if scaled_w <= ww || scaled_h <= wh {
                break;
            }
            let win_w = (ww as f64 * factor).round() as u32;
            let win_h = (wh as f64 * factor).round() as u32;
            if win_w < min_w || win_h < min_h {
                factor *= self.config.scale_factor;
                continue;
            }

            let resized;
            let level = if (scaled_w, scaled_h) == (fw, fh) {
                gray
            } else {
                resized = imageops::resize(gray, scaled_w, scaled_h, FilterType::Triangle);
                &resized
            };
            let integral = IntegralImage::new(level.as_raw(), scaled_w, scaled_h);

            let step = if factor > 2.0 { 1 } else { 2 };
            let before = hits.len();
            for y in (0..scaled_h - wh).step_by(step) {
                for x in (0..scaled_w - ww).step_by(step) {
                    if self.cascade.accepts(&integral, x, y) {
                        hits.push(BoundingBox::new(
                            (x as f64 * factor).round() as u32,
                            (y as f64 * factor).round() as u32,
                            win_w,
                            win_h,
                        ));
                    }
                }
            }
            log::trace!(
                "Pyramid level {scaled_w}x{scaled_h} (window {win_w}x{win_h}): {} hits",
                hits.len() - before
            );

            factor *= self.config.scale_factor;
        }
        hits
    }
}

impl FaceDetector for HaarCascadeDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectionError> {
        frame
            .check_well_formed()
            .map_err(DetectionError::InvalidFrame)?;

        let gray = frame.to_gray_image();
        let hits = self.scan(&gray);
        let faces: Vec<BoundingBox> =
            group_rectangles(&hits, self.config.min_neighbors, GROUP_EPS)
                .into_iter()
                .map(|b| b.clamp_to(frame.width(), frame.height()))
                .filter(|b| !b.is_degenerate())
                .collect();

        log::debug!(
            "Frame {}: {} raw hits grouped into {} faces",
            frame.index(),
            hits.len(),
            faces.len()
        );
        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::infrastructure::haar_cascade::tests::TOP_BRIGHT_CASCADE;

    const EDGE_ROW: u32 = 32;

    fn detector(min_neighbors: u32, min_size: (u32, u32)) -> HaarCascadeDetector {
        let cascade = HaarCascade::from_xml(TOP_BRIGHT_CASCADE).unwrap();
        let config = DetectionConfig {
            scale_factor: 1.25,
            min_neighbors,
            min_size,
        };
        HaarCascadeDetector::new(cascade, config).unwrap()
    }

    /// 64x64 RGB frame, bright above `EDGE_ROW` and black below.
    fn edge_frame() -> Frame {
        let (w, h) = (64u32, 64u32);
        let mut data = vec![0u8; (w * h * 3) as usize];
        for y in 0..EDGE_ROW {
            for x in 0..w {
                let i = ((y * w + x) * 3) as usize;
                data[i..i + 3].copy_from_slice(&[200, 200, 200]);
            }
        }
        Frame::new(data, w, h, 3, 0)
    }

    #[test]
    fn test_blank_frame_has_no_faces() {
        let mut det = detector(0, (8, 8));
        let frame = Frame::new(vec![0u8; 64 * 64 * 3], 64, 64, 3, 0);
        assert!(det.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_hits_lie_on_the_bright_dark_edge() {
        let mut det = detector(0, (8, 8));
        let faces = det.detect(&edge_frame()).unwrap();
        assert!(!faces.is_empty());
        for b in &faces {
            assert!(b.fits_within(64, 64), "{b} leaves the frame");
            assert!(
                b.y < EDGE_ROW + 8 && b.bottom() > EDGE_ROW - 8,
                "{b} is far from the edge"
            );
        }
    }

    #[test]
    fn test_grouping_reduces_raw_hits() {
        let raw = detector(0, (8, 8)).detect(&edge_frame()).unwrap();
        let grouped = detector(1, (8, 8)).detect(&edge_frame()).unwrap();
        assert!(grouped.len() < raw.len());
    }

    #[test]
    fn test_min_size_larger_than_frame_finds_nothing() {
        let mut det = detector(0, (100, 100));
        assert!(det.detect(&edge_frame()).unwrap().is_empty());
    }

    #[test]
    fn test_min_size_bounds_reported_boxes() {
        let mut det = detector(0, (16, 16));
        for b in det.detect(&edge_frame()).unwrap() {
            assert!(b.width >= 16 && b.height >= 16, "{b} is below min size");
        }
    }

    #[test]
    fn test_frame_smaller_than_window_finds_nothing() {
        let mut det = detector(0, (1, 1));
        let frame = Frame::new(vec![255u8; 6 * 6], 6, 6, 1, 0);
        assert!(det.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_zero_size_frame_is_rejected() {
        let mut det = detector(0, (8, 8));
        let frame = Frame::new(Vec::new(), 0, 0, 3, 3);
        assert!(matches!(
            det.detect(&frame),
            Err(DetectionError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let cascade = HaarCascade::from_xml(TOP_BRIGHT_CASCADE).unwrap();
        let config = DetectionConfig {
            scale_factor: 1.0,
            ..DetectionConfig::default()
        };
        assert!(matches!(
            HaarCascadeDetector::new(cascade, config),
            Err(ConfigError::ScaleFactor(_))
        ));
    }
}
