use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::annotation::domain::region_sink::RegionSink;
use crate::shared::video_metadata::VideoMetadata;
use crate::tracking::domain::track_lifecycle_controller::{
    ControllerStats, TrackLifecycleController,
};
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

use super::pipeline_logger::PipelineLogger;

/// Configuration for a pipeline execution run.
pub struct PipelineConfig {
    /// Called after each written frame with `(written, total)`. Returning
    /// `false` cancels the run with an error.
    pub on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
    /// Checked between frames; once set the run stops quietly.
    pub cancelled: Arc<AtomicBool>,
    pub logger: Box<dyn PipelineLogger>,
}

/// What a finished run did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub frames_written: usize,
    /// Frames the controller rejected as invalid; they are not encoded.
    pub frames_dropped: usize,
    pub stats: ControllerStats,
}

/// Abstracts how the read → track → annotate → write pipeline is executed.
///
/// This is a port (application-layer interface). Infrastructure provides
/// concrete implementations.
pub trait PipelineExecutor: Send {
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        reader: Box<dyn VideoReader>,
        writer: Box<dyn VideoWriter>,
        controller: TrackLifecycleController,
        annotator: Box<dyn FrameAnnotator>,
        region_sink: Option<Box<dyn RegionSink>>,
        metadata: &VideoMetadata,
        output_path: &Path,
        config: PipelineConfig,
    ) -> Result<PipelineReport, Box<dyn std::error::Error>>;
}
