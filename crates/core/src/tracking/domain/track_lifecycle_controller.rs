//! Per-frame detect-or-track decision and track bookkeeping.
//!
//! Detection runs only while no track is alive. Every detected face spawns a
//! tracker, every tracker is advanced once per frame, and lost tracks are
//! dropped before the frame's regions are reported. Identity is not carried
//! across a re-detection: a face found again after all tracks were lost gets
//! a brand-new track.
use thiserror::Error;

use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

use super::object_tracker::TrackerFactory;
use super::track::{Track, TrackId};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },
    #[error("face detection failed: {0}")]
    Detection(#[source] DetectionError),
}

impl From<DetectionError> for FrameError {
    fn from(e: DetectionError) -> Self {
        match e {
            DetectionError::InvalidFrame(reason) => FrameError::InvalidFrame { reason },
            other => FrameError::Detection(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// No live track; the next frame runs the detector.
    NeedsDetection,
    Tracking,
}

/// Running counters since the controller was built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub detection_runs: u64,
    pub tracks_created: u64,
    pub init_failures: u64,
    pub track_failures: u64,
    pub invalid_frames: u64,
}

/// Raster layout every frame of the stream must share.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct StreamGeometry {
    width: u32,
    height: u32,
    channels: u8,
}

impl StreamGeometry {
    fn of(frame: &Frame) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            channels: frame.channels(),
        }
    }
}

pub struct TrackLifecycleController {
    detector: Box<dyn FaceDetector>,
    tracker_factory: Box<dyn TrackerFactory>,
    tracks: Vec<Track>,
    geometry: Option<StreamGeometry>,
    last_regions: Vec<BoundingBox>,
    next_id: u32,
    frames_processed: u64,
    stats: ControllerStats,
}

impl TrackLifecycleController {
    pub fn new(detector: Box<dyn FaceDetector>, tracker_factory: Box<dyn TrackerFactory>) -> Self {
        Self {
            detector,
            tracker_factory,
            tracks: Vec::new(),
            geometry: None,
            last_regions: Vec::new(),
            next_id: 0,
            frames_processed: 0,
            stats: ControllerStats::default(),
        }
    }

    pub fn state(&self) -> ControllerState {
        if self.tracks.is_empty() {
            ControllerState::NeedsDetection
        } else {
            ControllerState::Tracking
        }
    }

    /// Live tracks in creation order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Regions returned by the last successfully processed frame.
    pub fn last_regions(&self) -> &[BoundingBox] {
        &self.last_regions
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    /// Runs one frame through detection (if needed) and tracking, returning
    /// the boxes of the surviving tracks in creation order.
    ///
    /// On error nothing but the error counters changes: the tracks, the
    /// stream geometry and `last_regions` are as they were before the call.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, FrameError> {
        let geometry = match self.check_frame(frame) {
            Ok(geometry) => geometry,
            Err(reason) => {
                self.stats.invalid_frames += 1;
                return Err(FrameError::InvalidFrame { reason });
            }
        };

        if self.state() == ControllerState::NeedsDetection {
            let boxes = match self.detector.detect(frame) {
                Ok(boxes) => boxes,
                Err(e) => {
                    let err = FrameError::from(e);
                    if matches!(err, FrameError::InvalidFrame { .. }) {
                        self.stats.invalid_frames += 1;
                    }
                    return Err(err);
                }
            };
            self.stats.detection_runs += 1;
            log::debug!("Frame {}: detector found {} faces", frame.index(), boxes.len());
            self.spawn_tracks(frame, boxes);
        }

        for track in &mut self.tracks {
            if !track.update(frame) {
                self.stats.track_failures += 1;
                log::debug!(
                    "Frame {}: lost track {} at {}",
                    frame.index(),
                    track.id(),
                    track.bbox()
                );
            }
        }
        self.tracks.retain(Track::is_active);

        let regions: Vec<BoundingBox> = self.tracks.iter().map(Track::bbox).collect();
        self.last_regions.clone_from(&regions);
        self.geometry.get_or_insert(geometry);
        self.frames_processed += 1;
        Ok(regions)
    }

    /// Well-formed and, once the stream is locked, the same layout as its
    /// first accepted frame.
    fn check_frame(&self, frame: &Frame) -> Result<StreamGeometry, String> {
        frame.check_well_formed()?;
        let geometry = StreamGeometry::of(frame);
        match self.geometry {
            Some(expected) if expected != geometry => Err(format!(
                "frame {} is {}x{}x{}, stream is {}x{}x{}",
                frame.index(),
                geometry.width,
                geometry.height,
                geometry.channels,
                expected.width,
                expected.height,
                expected.channels
            )),
            _ => Ok(geometry),
        }
    }

    fn spawn_tracks(&mut self, frame: &Frame, boxes: Vec<BoundingBox>) {
        for bbox in boxes {
            match self.tracker_factory.create(frame, bbox) {
                Ok(handle) => {
                    let id = TrackId(self.next_id);
                    self.next_id = self.next_id.wrapping_add(1);
                    self.stats.tracks_created += 1;
                    log::debug!("Frame {}: started track {id} at {bbox}", frame.index());
                    self.tracks.push(Track::new(id, bbox, handle));
                }
                Err(e) => {
                    self.stats.init_failures += 1;
                    log::debug!("Frame {}: skipped detection: {e}", frame.index());
                }
            }
        }
    }
}
