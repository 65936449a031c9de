use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::annotation::domain::region_sink::{RegionSink, TrackedRegion};
use crate::pipeline::pipeline_executor::{PipelineConfig, PipelineExecutor, PipelineReport};
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::tracking::domain::track_lifecycle_controller::{
    FrameError, TrackLifecycleController,
};
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

type SendError = Box<dyn std::error::Error + Send + Sync>;

/// Executes the tracking pipeline with dedicated threads for decoding and
/// encoding.
///
/// Layout: `reader → main [track/annotate/log regions] → writer`
///
/// The controller is strictly sequential, so it stays on the calling thread;
/// only I/O is overlapped with it.
pub struct ThreadedPipelineExecutor {
    channel_capacity: usize,
}

impl ThreadedPipelineExecutor {
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for ThreadedPipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor for ThreadedPipelineExecutor {
    fn execute(
        &self,
        reader: Box<dyn VideoReader>,
        mut writer: Box<dyn VideoWriter>,
        mut controller: TrackLifecycleController,
        annotator: Box<dyn FrameAnnotator>,
        mut region_sink: Option<Box<dyn RegionSink>>,
        metadata: &VideoMetadata,
        output_path: &Path,
        mut config: PipelineConfig,
    ) -> Result<PipelineReport, Box<dyn std::error::Error>> {
        let cap = self.channel_capacity;

        writer.open(output_path, metadata)?;

        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Result<Frame, SendError>>(cap);
        let (write_tx, write_rx) = crossbeam_channel::bounded::<Frame>(cap);

        let reader_handle = spawn_reader(reader, frame_tx, config.cancelled.clone());
        let writer_handle = spawn_writer(writer, write_rx);

        let mut report = PipelineReport::default();
        let mut first_error = run_main_loop(
            frame_rx,
            &write_tx,
            &mut controller,
            &*annotator,
            region_sink.as_mut(),
            metadata.total_frames,
            &mut config,
            &mut report,
        );

        drop(write_tx);

        if let Some(sink) = region_sink.as_mut() {
            if let Err(e) = sink.close() {
                first_error.get_or_insert(e);
            }
        }

        report.stats = controller.stats();
        config.logger.summary();

        join_threads(reader_handle, writer_handle, first_error)?;
        Ok(report)
    }
}

fn spawn_reader(
    mut reader: Box<dyn VideoReader>,
    frame_tx: crossbeam_channel::Sender<Result<Frame, SendError>>,
    cancelled: std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> std::thread::JoinHandle<Box<dyn VideoReader>> {
    std::thread::spawn(move || {
        for frame_result in reader.frames() {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let mapped = frame_result.map_err(|e| -> SendError { e.to_string().into() });
            if frame_tx.send(mapped).is_err() {
                break;
            }
        }
        reader.close();
        reader
    })
}

fn spawn_writer(
    mut writer: Box<dyn VideoWriter>,
    write_rx: crossbeam_channel::Receiver<Frame>,
) -> std::thread::JoinHandle<Result<Box<dyn VideoWriter>, SendError>> {
    std::thread::spawn(move || {
        for frame in write_rx {
            writer
                .write(&frame)
                .map_err(|e| -> SendError { e.to_string().into() })?;
        }
        Ok(writer)
    })
}

/// Runs the main thread loop: receive decoded frames, advance the
/// controller, record and draw its regions, and send to the writer.
#[allow(clippy::too_many_arguments)]
fn run_main_loop(
    frame_rx: crossbeam_channel::Receiver<Result<Frame, SendError>>,
    write_tx: &crossbeam_channel::Sender<Frame>,
    controller: &mut TrackLifecycleController,
    annotator: &dyn FrameAnnotator,
    mut region_sink: Option<&mut Box<dyn RegionSink>>,
    total_frames: usize,
    config: &mut PipelineConfig,
    report: &mut PipelineReport,
) -> Option<Box<dyn std::error::Error>> {
    for frame_result in frame_rx {
        if config.cancelled.load(Ordering::Relaxed) {
            break;
        }

        let mut frame = match frame_result {
            Ok(frame) => frame,
            Err(e) => return Some(e.to_string().into()),
        };

        let detections_before = controller.stats().detection_runs;
        let created_before = controller.stats().tracks_created;
        let started = Instant::now();
        let regions = match controller.process_frame(&frame) {
            Ok(regions) => regions,
            Err(FrameError::InvalidFrame { reason }) => {
                log::warn!("Dropping frame {}: {reason}", frame.index());
                report.frames_dropped += 1;
                continue;
            }
            Err(e) => return Some(e.into()),
        };
        config.logger.timing("track", elapsed_ms(started));
        config.logger.metric("tracks", regions.len() as f64);
        if controller.stats().detection_runs > detections_before {
            let created = controller.stats().tracks_created - created_before;
            config.logger.metric("detections", created as f64);
        }

        if let Some(sink) = region_sink.as_mut() {
            let tagged: Vec<TrackedRegion> = controller
                .tracks()
                .iter()
                .map(|t| TrackedRegion {
                    track: t.id().0,
                    bbox: t.bbox(),
                })
                .collect();
            if let Err(e) = sink.write(frame.index(), &tagged) {
                return Some(e);
            }
        }

        let started = Instant::now();
        if let Err(e) = annotator.annotate(&mut frame, &regions) {
            return Some(e);
        }
        config.logger.timing("annotate", elapsed_ms(started));

        if write_tx.send(frame).is_err() {
            return Some("Writer channel closed unexpectedly".into());
        }

        report.frames_written += 1;
        config.logger.progress(report.frames_written, total_frames);

        if let Some(ref callback) = config.on_progress {
            if !callback(report.frames_written, total_frames) {
                return Some("Cancelled".into());
            }
        }
    }

    None
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Joins the I/O threads and coalesces the first error encountered.
fn join_threads(
    reader_handle: std::thread::JoinHandle<Box<dyn VideoReader>>,
    writer_handle: std::thread::JoinHandle<Result<Box<dyn VideoWriter>, SendError>>,
    mut first_error: Option<Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    fn set_if_none(slot: &mut Option<Box<dyn std::error::Error>>, err: Box<dyn std::error::Error>) {
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    match reader_handle.join() {
        Ok(mut r) => r.close(),
        Err(_) => set_if_none(&mut first_error, "Reader thread panicked".into()),
    }

    match writer_handle.join() {
        Ok(Ok(mut w)) => {
            if let Err(e) = w.close() {
                set_if_none(&mut first_error, e);
            }
        }
        Ok(Err(e)) => set_if_none(&mut first_error, e.to_string().into()),
        Err(_) => set_if_none(&mut first_error, "Writer thread panicked".into()),
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
