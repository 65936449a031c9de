use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::annotation::domain::region_sink::RegionSink;
use crate::shared::video_metadata::VideoMetadata;
use crate::tracking::domain::track_lifecycle_controller::TrackLifecycleController;
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

use super::pipeline_executor::{PipelineConfig, PipelineExecutor, PipelineReport};
use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};

const ALREADY_EXECUTED: &str = "Pipeline already executed";

/// Runs a video through the track lifecycle controller and writes the
/// annotated result.
///
/// Wires domain components together and delegates execution to a
/// `PipelineExecutor`. This is a single-use struct: `execute` consumes
/// the owned components, so calling it twice will fail.
pub struct TrackFacesUseCase {
    reader: Option<Box<dyn VideoReader>>,
    writer: Option<Box<dyn VideoWriter>>,
    controller: Option<TrackLifecycleController>,
    annotator: Option<Box<dyn FrameAnnotator>>,
    region_sink: Option<Box<dyn RegionSink>>,
    executor: Box<dyn PipelineExecutor>,
    logger: Option<Box<dyn PipelineLogger>>,
    on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
    cancelled: Arc<AtomicBool>,
}

impl TrackFacesUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: Box<dyn VideoReader>,
        writer: Box<dyn VideoWriter>,
        controller: TrackLifecycleController,
        annotator: Box<dyn FrameAnnotator>,
        region_sink: Option<Box<dyn RegionSink>>,
        executor: Box<dyn PipelineExecutor>,
        logger: Option<Box<dyn PipelineLogger>>,
        on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
            controller: Some(controller),
            annotator: Some(annotator),
            region_sink,
            executor,
            logger: Some(logger.unwrap_or_else(|| Box::new(NullPipelineLogger))),
            on_progress,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn execute(
        &mut self,
        metadata: &VideoMetadata,
        output_path: &Path,
    ) -> Result<PipelineReport, Box<dyn std::error::Error>> {
        let config = PipelineConfig {
            on_progress: self.on_progress.take(),
            cancelled: self.cancelled.clone(),
            logger: self.logger.take().ok_or(ALREADY_EXECUTED)?,
        };

        let report = self.executor.execute(
            self.reader.take().ok_or(ALREADY_EXECUTED)?,
            self.writer.take().ok_or(ALREADY_EXECUTED)?,
            self.controller.take().ok_or(ALREADY_EXECUTED)?,
            self.annotator.take().ok_or(ALREADY_EXECUTED)?,
            self.region_sink.take(),
            metadata,
            output_path,
            config,
        )?;

        log::info!(
            "Tracked {} frames ({} dropped): {} detection runs, {} tracks created, {} lost",
            report.frames_written,
            report.frames_dropped,
            report.stats.detection_runs,
            report.stats.tracks_created,
            report.stats.track_failures
        );
        Ok(report)
    }
}
