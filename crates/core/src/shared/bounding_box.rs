use serde::{Deserialize, Serialize};

/// Axis-aligned face rectangle in frame pixel coordinates.
///
/// Produced fresh every frame by detectors and trackers; never mutated in
/// place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from signed corner coordinates, clipping it to the frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn from_corners_clamped(
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let fw = frame_width as f64;
        let fh = frame_height as f64;
        let left = x1.round().clamp(0.0, fw);
        let top = y1.round().clamp(0.0, fh);
        let right = x2.round().clamp(0.0, fw);
        let bottom = y2.round().clamp(0.0, fh);

        if right <= left || bottom <= top {
            return None;
        }
        Some(Self::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the whole box lies inside a `frame_width` x `frame_height` frame.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        (self.x as u64 + self.width as u64) <= frame_width as u64
            && (self.y as u64 + self.height as u64) <= frame_height as u64
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());

        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }
        let inter = (ix2 - ix1) as f64 * (iy2 - iy1) as f64;
        inter / (self.area() as f64 + other.area() as f64 - inter)
    }

    /// Scales origin and size by `factor`, rounding to the nearest pixel.
    pub fn scale(&self, factor: f64) -> Self {
        Self::new(
            (self.x as f64 * factor).round() as u32,
            (self.y as f64 * factor).round() as u32,
            (self.width as f64 * factor).round() as u32,
            (self.height as f64 * factor).round() as u32,
        )
    }

    /// Clips the box to the frame; a box entirely outside collapses to zero size.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Self {
        let x = self.x.min(frame_width);
        let y = self.y.min(frame_height);
        let right = self.right().min(frame_width);
        let bottom = self.bottom().min(frame_height);
        Self::new(x, y, right - x, bottom - y)
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    // ── Geometry ─────────────────────────────────────────────────────

    #[test]
    fn test_edges_and_area() {
        let b = BoundingBox::new(10, 20, 30, 40);
        assert_eq!(b.right(), 40);
        assert_eq!(b.bottom(), 60);
        assert_eq!(b.area(), 1200);
    }

    #[rstest]
    #[case::zero_width(BoundingBox::new(0, 0, 0, 10), true)]
    #[case::zero_height(BoundingBox::new(0, 0, 10, 0), true)]
    #[case::normal(BoundingBox::new(0, 0, 10, 10), false)]
    fn test_is_degenerate(#[case] b: BoundingBox, #[case] expected: bool) {
        assert_eq!(b.is_degenerate(), expected);
    }

    #[rstest]
    #[case::inside(BoundingBox::new(10, 10, 20, 20), true)]
    #[case::touching_edges(BoundingBox::new(80, 80, 20, 20), true)]
    #[case::past_right(BoundingBox::new(90, 10, 20, 20), false)]
    #[case::past_bottom(BoundingBox::new(10, 90, 20, 20), false)]
    #[case::origin_outside(BoundingBox::new(200, 200, 1, 1), false)]
    fn test_fits_within(#[case] b: BoundingBox, #[case] expected: bool) {
        assert_eq!(b.fits_within(100, 100), expected);
    }

    #[test]
    fn test_fits_within_does_not_overflow() {
        let b = BoundingBox::new(u32::MAX, 0, u32::MAX, 1);
        assert!(!b.fits_within(100, 100));
    }

    // ── IoU ──────────────────────────────────────────────────────────

    #[test]
    fn test_iou_identical() {
        let a = BoundingBox::new(10, 10, 100, 100);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = BoundingBox::new(0, 0, 50, 50);
        let b = BoundingBox::new(100, 100, 50, 50);
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50*100 = 5000, union 15000
        let a = BoundingBox::new(0, 0, 100, 100);
        let b = BoundingBox::new(50, 0, 100, 100);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_iou_touching_edges() {
        let a = BoundingBox::new(0, 0, 50, 50);
        let b = BoundingBox::new(50, 0, 50, 50);
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    // ── Conversions ──────────────────────────────────────────────────

    #[test]
    fn test_from_corners_clamps_to_frame() {
        let b = BoundingBox::from_corners_clamped(-10.0, -5.0, 50.0, 40.0, 100, 100).unwrap();
        assert_eq!(b, BoundingBox::new(0, 0, 50, 40));
    }

    #[test]
    fn test_from_corners_rounds() {
        let b = BoundingBox::from_corners_clamped(10.4, 10.6, 30.5, 31.2, 100, 100).unwrap();
        assert_eq!(b, BoundingBox::new(10, 11, 21, 20));
    }

    #[test]
    fn test_from_corners_fully_outside_is_none() {
        assert!(BoundingBox::from_corners_clamped(120.0, 0.0, 150.0, 30.0, 100, 100).is_none());
    }

    #[test]
    fn test_scale() {
        let b = BoundingBox::new(10, 20, 24, 24);
        assert_eq!(b.scale(1.5), BoundingBox::new(15, 30, 36, 36));
    }

    #[test]
    fn test_clamp_to_partially_outside() {
        let b = BoundingBox::new(90, 90, 20, 20);
        assert_eq!(b.clamp_to(100, 100), BoundingBox::new(90, 90, 10, 10));
    }

    #[test]
    fn test_clamp_to_fully_outside_collapses() {
        let b = BoundingBox::new(150, 150, 20, 20);
        assert!(b.clamp_to(100, 100).is_degenerate());
    }

    #[test]
    fn test_display() {
        assert_eq!(BoundingBox::new(1, 2, 3, 4).to_string(), "(1, 2, 3x4)");
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let json = serde_json::to_string(&BoundingBox::new(10, 10, 20, 20)).unwrap();
        assert_eq!(json, r#"{"x":10,"y":10,"width":20,"height":20}"#);
    }
}
