use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

use super::object_tracker::ObjectTracker;

/// Per-controller track number, for logs and the region log only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u32);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackStatus {
    Active,
    Failed,
}

/// One followed face: its tracker handle and last confirmed box.
pub struct Track {
    id: TrackId,
    bbox: BoundingBox,
    status: TrackStatus,
    tracker: Box<dyn ObjectTracker>,
}

impl Track {
    /// Wraps a handle that was just initialized on `bbox`.
    pub fn new(id: TrackId, bbox: BoundingBox, tracker: Box<dyn ObjectTracker>) -> Self {
        Self {
            id,
            bbox,
            status: TrackStatus::Active,
            tracker,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TrackStatus::Active
    }

    /// Advances the handle by one frame. Returns whether the track survived.
    ///
    /// A failed track is terminal: its handle is not consulted again.
    pub fn update(&mut self, frame: &Frame) -> bool {
        if self.status == TrackStatus::Failed {
            return false;
        }
        match self.tracker.update(frame) {
            Some(bbox) => {
                self.bbox = bbox;
                true
            }
            None => {
                self.status = TrackStatus::Failed;
                false
            }
        }
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("bbox", &self.bbox)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
