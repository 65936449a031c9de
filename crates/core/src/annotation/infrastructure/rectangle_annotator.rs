use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::config_error::ConfigError;
use crate::shared::constants::{DEFAULT_BOX_COLOR, DEFAULT_BOX_THICKNESS};
use crate::shared::frame::Frame;

/// Draws each region as a solid rectangle outline.
///
/// The outline runs through `(x, y)` and `(x + width, y + height)` inclusive
/// and is `thickness` pixels wide, centred on that path. Parts falling outside
/// the frame are clipped.
pub struct RectangleAnnotator {
    color: [u8; 3],
    thickness: u32,
}

impl RectangleAnnotator {
    pub fn new(color: [u8; 3], thickness: u32) -> Result<Self, ConfigError> {
        if thickness == 0 {
            return Err(ConfigError::OutOfRange {
                name: "box thickness",
                range: "[1, inf)",
                value: 0.0,
            });
        }
        Ok(Self { color, thickness })
    }

    /// BT.601 luma of the outline colour, for single-channel frames.
    fn gray_value(&self) -> u8 {
        let [r, g, b] = self.color;
        (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
            .round()
            .min(255.0) as u8
    }

    /// Fills the inclusive rectangle `[x0, x1] x [y0, y1]`, clipped to the frame.
    fn fill(&self, frame: &mut Frame, (x0, y0): (i64, i64), (x1, y1): (i64, i64)) {
        let fw = frame.width() as i64;
        let fh = frame.height() as i64;
        let (x0, x1) = (x0.max(0), x1.min(fw - 1));
        let (y0, y1) = (y0.max(0), y1.min(fh - 1));
        if x0 > x1 || y0 > y1 {
            return;
        }

        let channels = frame.channels() as usize;
        let gray = [self.gray_value()];
        let pixel: &[u8] = if channels == 1 { &gray } else { &self.color };
        let stride = fw as usize * channels;
        let data = frame.data_mut();
        for y in y0 as usize..=y1 as usize {
            let row = &mut data[y * stride..(y + 1) * stride];
            for x in x0 as usize..=x1 as usize {
                row[x * channels..x * channels + channels].copy_from_slice(pixel);
            }
        }
    }
}

impl Default for RectangleAnnotator {
    fn default() -> Self {
        Self {
            color: DEFAULT_BOX_COLOR,
            thickness: DEFAULT_BOX_THICKNESS,
        }
    }
}

impl FrameAnnotator for RectangleAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        regions: &[BoundingBox],
    ) -> Result<(), Box<dyn std::error::Error>> {
        if frame.channels() != 1 && frame.channels() != 3 {
            return Err(format!("cannot draw on {}-channel frames", frame.channels()).into());
        }

        let lo = (self.thickness / 2) as i64;
        let hi = ((self.thickness - 1) / 2) as i64;
        for r in regions {
            let (left, top) = (r.x as i64, r.y as i64);
            let (right, bottom) = (r.right() as i64, r.bottom() as i64);

            self.fill(frame, (left - lo, top - lo), (right + hi, top + hi));
            self.fill(frame, (left - lo, bottom - lo), (right + hi, bottom + hi));
            self.fill(frame, (left - lo, top - lo), (left + hi, bottom + hi));
            self.fill(frame, (right - lo, top - lo), (right + hi, bottom + hi));
        }
        Ok(())
    }
}
