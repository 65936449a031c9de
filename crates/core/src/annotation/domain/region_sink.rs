use serde::Serialize;

use crate::shared::bounding_box::BoundingBox;

/// One reported region tagged with the track that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TrackedRegion {
    pub track: u32,
    #[serde(flatten)]
    pub bbox: BoundingBox,
}

/// Receives each processed frame's regions, in track creation order.
pub trait RegionSink: Send {
    fn write(
        &mut self,
        frame_index: usize,
        regions: &[TrackedRegion],
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Flushes buffered output. Called once after the last frame.
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
