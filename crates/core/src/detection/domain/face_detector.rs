use thiserror::Error;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("detector backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain interface for face detection.
///
/// Returns every face box found in the frame, possibly none. Implementations
/// may keep internal buffers or inference sessions, hence `&mut self`, but
/// results depend only on the frame content and the detector configuration.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectionError>;
}
