use thiserror::Error;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerInitError {
    #[error("cannot track degenerate box {0}")]
    Degenerate(BoundingBox),
    #[error("box {bbox} does not fit inside the {frame_width}x{frame_height} frame")]
    OutOfBounds {
        bbox: BoundingBox,
        frame_width: u32,
        frame_height: u32,
    },
}

/// Follows a single object from frame to frame.
///
/// A handle is initialized once, by its factory, and is never re-targeted.
/// `None` means the object was lost; the owner must not call `update` again
/// afterwards.
pub trait ObjectTracker: Send {
    fn update(&mut self, frame: &Frame) -> Option<BoundingBox>;
}

/// Builds tracker handles initialized on one frame and one box.
pub trait TrackerFactory: Send {
    fn create(
        &self,
        frame: &Frame,
        bbox: BoundingBox,
    ) -> Result<Box<dyn ObjectTracker>, TrackerInitError>;
}

/// Checks the shared preconditions of every tracker initialization.
pub fn check_init_box(frame: &Frame, bbox: BoundingBox) -> Result<(), TrackerInitError> {
    if bbox.is_degenerate() {
        return Err(TrackerInitError::Degenerate(bbox));
    }
    if !bbox.fits_within(frame.width(), frame.height()) {
        return Err(TrackerInitError::OutOfBounds {
            bbox,
            frame_width: frame.width(),
            frame_height: frame.height(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn frame() -> Frame {
        Frame::new(vec![0u8; 100 * 80 * 3], 100, 80, 3, 0)
    }

    #[test]
    fn test_box_inside_frame_is_accepted() {
        assert!(check_init_box(&frame(), BoundingBox::new(10, 10, 20, 20)).is_ok());
    }

    #[rstest]
    #[case::zero_width(BoundingBox::new(10, 10, 0, 20))]
    #[case::zero_height(BoundingBox::new(10, 10, 20, 0))]
    fn test_degenerate_box_is_rejected(#[case] bbox: BoundingBox) {
        assert_eq!(
            check_init_box(&frame(), bbox),
            Err(TrackerInitError::Degenerate(bbox))
        );
    }

    #[rstest]
    #[case::past_right(BoundingBox::new(90, 10, 20, 20))]
    #[case::past_bottom(BoundingBox::new(10, 70, 20, 20))]
    fn test_box_leaving_frame_is_rejected(#[case] bbox: BoundingBox) {
        assert!(matches!(
            check_init_box(&frame(), bbox),
            Err(TrackerInitError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_out_of_bounds_message_names_frame_size() {
        let err = check_init_box(&frame(), BoundingBox::new(90, 10, 20, 20)).unwrap_err();
        assert!(err.to_string().contains("100x80"));
    }
}
