use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Domain interface for drawing the tracked regions onto a frame.
///
/// Implementations modify the frame in-place (`&mut Frame`) to avoid allocation.
pub trait FrameAnnotator: Send {
    fn annotate(
        &self,
        frame: &mut Frame,
        regions: &[BoundingBox],
    ) -> Result<(), Box<dyn std::error::Error>>;
}
