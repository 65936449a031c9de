/// Single-object tracker matching a grayscale template by normalized
/// cross-correlation.
///
/// Each update searches a window around the previous box, first on a coarse
/// grid and then pixel by pixel around the best coarse hit. The box keeps the
/// size it was initialized with; scale changes are not estimated.
use ndarray::{s, Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::shared::bounding_box::BoundingBox;
use crate::shared::config_error::ConfigError;
use crate::shared::frame::Frame;
use crate::tracking::domain::object_tracker::{
    check_init_box, ObjectTracker, TrackerFactory, TrackerInitError,
};

pub const DEFAULT_SEARCH_MARGIN: f64 = 0.5;
pub const DEFAULT_MIN_SCORE: f64 = 0.5;
pub const DEFAULT_LEARNING_RATE: f64 = 0.075;

/// Coarse grid cells per search margin.
const COARSE_DIVISIONS: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplateTrackerConfig {
    /// Search reach around the previous box, as a fraction of its size.
    pub search_margin: f64,
    /// Lowest correlation accepted as a successful match.
    pub min_score: f64,
    /// Weight of the newest patch when refreshing the template.
    pub learning_rate: f64,
}

impl Default for TemplateTrackerConfig {
    fn default() -> Self {
        Self {
            search_margin: DEFAULT_SEARCH_MARGIN,
            min_score: DEFAULT_MIN_SCORE,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

impl TemplateTrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("search margin", "[0, 4]", self.search_margin, 0.0, 4.0)?;
        check_range("minimum track score", "[0, 1]", self.min_score, 0.0, 1.0)?;
        check_range("learning rate", "[0, 1]", self.learning_rate, 0.0, 1.0)
    }
}

fn check_range(
    name: &'static str,
    range: &'static str,
    value: f64,
    lo: f64,
    hi: f64,
) -> Result<(), ConfigError> {
    if (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, range, value })
    }
}

/// Template pixels plus the zero-mean copy used for correlation.
struct Template {
    pixels: Array2<f32>,
    centered: Array2<f32>,
    energy: f64,
}

impl Template {
    fn new(pixels: Array2<f32>) -> Self {
        let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64;
        let centered = pixels.mapv(|p| (p as f64 - mean) as f32);
        let energy = centered.iter().map(|&c| (c as f64) * (c as f64)).sum();
        Self {
            pixels,
            centered,
            energy,
        }
    }

    fn blend(&mut self, patch: ArrayView2<f32>, rate: f64) {
        let rate = rate as f32;
        let mut pixels = std::mem::take(&mut self.pixels);
        Zip::from(&mut pixels)
            .and(&patch)
            .for_each(|t, &p| *t = (1.0 - rate) * *t + rate * p);
        *self = Self::new(pixels);
    }

    /// Normalized cross-correlation in `[-1, 1]`; flat patches score 0.
    fn score(&self, patch: ArrayView2<f32>) -> f64 {
        let mean = patch.iter().map(|&p| p as f64).sum::<f64>() / patch.len() as f64;
        let mut cross = 0.0f64;
        let mut energy = 0.0f64;
        Zip::from(&patch).and(&self.centered).for_each(|&p, &t| {
            let d = p as f64 - mean;
            cross += d * t as f64;
            energy += d * d;
        });
        let denom = (energy * self.energy).sqrt();
        if denom <= f64::EPSILON {
            0.0
        } else {
            cross / denom
        }
    }
}

fn gray_plane(frame: &Frame) -> Array2<f32> {
    let gray = frame.to_gray_image();
    let (w, h) = gray.dimensions();
    Array2::from_shape_vec(
        (h as usize, w as usize),
        gray.into_raw().into_iter().map(f32::from).collect(),
    )
    .expect("gray image length matches its dimensions")
}

fn patch(plane: &Array2<f32>, x: u32, y: u32, w: u32, h: u32) -> ArrayView2<'_, f32> {
    let (x, y, w, h) = (x as usize, y as usize, w as usize, h as usize);
    plane.slice(s![y..y + h, x..x + w])
}

pub struct TemplateTracker {
    config: TemplateTrackerConfig,
    template: Template,
    bbox: BoundingBox,
    frame_size: (u32, u32),
}

impl TemplateTracker {
    fn search(&self, plane: &Array2<f32>) -> (BoundingBox, f64) {
        let BoundingBox {
            x,
            y,
            width,
            height,
        } = self.bbox;
        let (fw, fh) = self.frame_size;
        let mx = (width as f64 * self.config.search_margin).round() as u32;
        let my = (height as f64 * self.config.search_margin).round() as u32;

        let x_range = (x.saturating_sub(mx), (x + mx).min(fw - width));
        let y_range = (y.saturating_sub(my), (y + my).min(fh - height));

        let coarse = (mx.max(my) / COARSE_DIVISIONS).max(1);
        let (cx, cy, coarse_score) = self.scan(plane, x_range, y_range, coarse, (x, y));
        if coarse == 1 {
            return (BoundingBox::new(cx, cy, width, height), coarse_score);
        }

        let fine_x = (
            cx.saturating_sub(coarse).max(x_range.0),
            (cx + coarse).min(x_range.1),
        );
        let fine_y = (
            cy.saturating_sub(coarse).max(y_range.0),
            (cy + coarse).min(y_range.1),
        );
        let (bx, by, score) = self.scan(plane, fine_x, fine_y, 1, (cx, cy));
        (BoundingBox::new(bx, by, width, height), score)
    }

    /// Best top-left corner on a `step` grid over the inclusive ranges.
    /// `seed` is scored first so ties keep the previous position.
    fn scan(
        &self,
        plane: &Array2<f32>,
        (x0, x1): (u32, u32),
        (y0, y1): (u32, u32),
        step: u32,
        seed: (u32, u32),
    ) -> (u32, u32, f64) {
        let (w, h) = (self.bbox.width, self.bbox.height);
        let seed_score = self.template.score(patch(plane, seed.0, seed.1, w, h));
        let mut best = (seed.0, seed.1, seed_score);
        for py in (y0..=y1).step_by(step as usize) {
            for px in (x0..=x1).step_by(step as usize) {
                let score = self.template.score(patch(plane, px, py, w, h));
                if score > best.2 {
                    best = (px, py, score);
                }
            }
        }
        best
    }
}

impl ObjectTracker for TemplateTracker {
    fn update(&mut self, frame: &Frame) -> Option<BoundingBox> {
        if (frame.width(), frame.height()) != self.frame_size {
            log::debug!(
                "Frame {}: size {}x{} differs from tracked {}x{}",
                frame.index(),
                frame.width(),
                frame.height(),
                self.frame_size.0,
                self.frame_size.1
            );
            return None;
        }

        let plane = gray_plane(frame);
        let (bbox, score) = self.search(&plane);
        if score < self.config.min_score {
            log::trace!("Frame {}: best match {score:.3} at {bbox}", frame.index());
            return None;
        }

        self.template.blend(
            patch(&plane, bbox.x, bbox.y, bbox.width, bbox.height),
            self.config.learning_rate,
        );
        self.bbox = bbox;
        Some(bbox)
    }
}

pub struct TemplateTrackerFactory {
    config: TemplateTrackerConfig,
}

impl TemplateTrackerFactory {
    pub fn new(config: TemplateTrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl TrackerFactory for TemplateTrackerFactory {
    fn create(
        &self,
        frame: &Frame,
        bbox: BoundingBox,
    ) -> Result<Box<dyn ObjectTracker>, TrackerInitError> {
        check_init_box(frame, bbox)?;
        let plane = gray_plane(frame);
        let pixels = patch(&plane, bbox.x, bbox.y, bbox.width, bbox.height).to_owned();
        let template = Template::new(pixels);
        Ok(Box::new(TemplateTracker {
            config: self.config,
            template,
            bbox,
            frame_size: (frame.width(), frame.height()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    const SIZE: u32 = 96;
    const PATTERN: u32 = 16;
    const BACKGROUND: u8 = 128;

    /// Gray frame with an off-centre bright blob in a square whose top-left
    /// corner is `at`.
    fn frame_with_pattern(at: Option<(u32, u32)>, index: usize) -> Frame {
        let mut data = vec![BACKGROUND; (SIZE * SIZE * 3) as usize];
        if let Some((ox, oy)) = at {
            for y in 0..PATTERN {
                for x in 0..PATTERN {
                    let dx = x as f64 - 6.0;
                    let dy = y as f64 - 9.0;
                    let v = (40.0 + 180.0 * (-(dx * dx + dy * dy) / 40.0).exp()).round() as u8;
                    let i = (((oy + y) * SIZE + ox + x) * 3) as usize;
                    data[i..i + 3].copy_from_slice(&[v, v, v]);
                }
            }
        }
        Frame::new(data, SIZE, SIZE, 3, index)
    }

    fn factory() -> TemplateTrackerFactory {
        TemplateTrackerFactory::new(TemplateTrackerConfig::default()).unwrap()
    }

    fn start(at: (u32, u32)) -> Box<dyn ObjectTracker> {
        factory()
            .create(
                &frame_with_pattern(Some(at), 0),
                BoundingBox::new(at.0, at.1, PATTERN, PATTERN),
            )
            .unwrap()
    }

    // ── Initialization ───────────────────────────────────────────────

    #[test]
    fn test_create_rejects_degenerate_box() {
        let frame = frame_with_pattern(None, 0);
        let result = factory().create(&frame, BoundingBox::new(10, 10, 0, 16));
        assert!(matches!(result, Err(TrackerInitError::Degenerate(_))));
    }

    #[test]
    fn test_create_rejects_box_outside_frame() {
        let frame = frame_with_pattern(None, 0);
        let result = factory().create(&frame, BoundingBox::new(90, 10, 16, 16));
        assert!(matches!(result, Err(TrackerInitError::OutOfBounds { .. })));
    }

    // ── Tracking ─────────────────────────────────────────────────────

    #[test]
    fn test_stationary_pattern_keeps_its_box() {
        let mut tracker = start((40, 40));
        let next = frame_with_pattern(Some((40, 40)), 1);
        assert_eq!(tracker.update(&next), Some(BoundingBox::new(40, 40, 16, 16)));
    }

    #[test]
    fn test_follows_moving_pattern() {
        let mut tracker = start((20, 20));
        let path = [(24, 22), (27, 25), (31, 25), (35, 28)];
        for (i, &(x, y)) in path.iter().enumerate() {
            let frame = frame_with_pattern(Some((x, y)), i + 1);
            assert_eq!(
                tracker.update(&frame),
                Some(BoundingBox::new(x, y, PATTERN, PATTERN)),
                "step {i}"
            );
        }
    }

    #[test]
    fn test_follows_pattern_to_frame_edge() {
        let mut tracker = start((74, 74));
        let frame = frame_with_pattern(Some((80, 80)), 1);
        assert_eq!(tracker.update(&frame), Some(BoundingBox::new(80, 80, 16, 16)));
    }

    #[test]
    fn test_fails_when_pattern_disappears() {
        let mut tracker = start((40, 40));
        assert_eq!(tracker.update(&frame_with_pattern(None, 1)), None);
    }

    #[test]
    fn test_fails_when_pattern_jumps_beyond_search_window() {
        let mut tracker = start((10, 10));
        assert_eq!(tracker.update(&frame_with_pattern(Some((70, 70)), 1)), None);
    }

    #[test]
    fn test_fails_on_frame_size_change() {
        let mut tracker = start((10, 10));
        let small = Frame::new(vec![BACKGROUND; 48 * 48 * 3], 48, 48, 3, 1);
        assert_eq!(tracker.update(&small), None);
    }

    // ── Correlation ──────────────────────────────────────────────────

    #[test]
    fn test_score_identical_patch_is_one() {
        let plane = gray_plane(&frame_with_pattern(Some((0, 0)), 0));
        let template = Template::new(patch(&plane, 0, 0, 16, 16).to_owned());
        assert_relative_eq!(template.score(patch(&plane, 0, 0, 16, 16)), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_score_inverted_patch_is_minus_one() {
        let pixels = Array2::from_shape_fn((4, 4), |(y, x)| (x * 10 + y) as f32);
        let inverted = pixels.mapv(|p| 255.0 - p);
        let template = Template::new(pixels);
        assert_relative_eq!(template.score(inverted.view()), -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_score_flat_patch_is_zero() {
        let template = Template::new(Array2::from_shape_fn((4, 4), |(y, x)| (x + y) as f32));
        let flat = Array2::from_elem((4, 4), 9.0f32);
        assert_eq!(template.score(flat.view()), 0.0);
    }

    #[test]
    fn test_blend_moves_template_towards_patch() {
        let mut template = Template::new(Array2::from_elem((2, 2), 100.0f32));
        let patch = Array2::from_elem((2, 2), 200.0f32);
        template.blend(patch.view(), 0.25);
        assert_relative_eq!(template.pixels[[0, 0]], 125.0);
    }

    // ── Configuration ────────────────────────────────────────────────

    #[test]
    fn test_default_config_is_valid() {
        assert!(TemplateTrackerConfig::default().validate().is_ok());
    }

    #[rstest]
    #[case::negative_margin(TemplateTrackerConfig { search_margin: -0.1, ..Default::default() })]
    #[case::score_above_one(TemplateTrackerConfig { min_score: 1.5, ..Default::default() })]
    #[case::nan_learning_rate(TemplateTrackerConfig { learning_rate: f64::NAN, ..Default::default() })]
    fn test_rejects_out_of_range_config(#[case] config: TemplateTrackerConfig) {
        assert!(matches!(
            TemplateTrackerFactory::new(config),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_config_deserializes_camel_case() {
        let config: TemplateTrackerConfig =
            serde_json::from_str(r#"{"searchMargin": 1.0, "minScore": 0.7}"#).unwrap();
        assert_eq!(config.search_margin, 1.0);
        assert_eq!(config.min_score, 0.7);
        assert_eq!(config.learning_rate, DEFAULT_LEARNING_RATE);
    }
}
