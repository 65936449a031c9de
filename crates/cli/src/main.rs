use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use face_track_core::annotation::domain::region_sink::RegionSink;
use face_track_core::annotation::infrastructure::json_region_sink::JsonRegionSink;
use face_track_core::annotation::infrastructure::rectangle_annotator::RectangleAnnotator;
use face_track_core::detection::domain::detection_config::DetectionConfig;
use face_track_core::detection::domain::face_detector::FaceDetector;
use face_track_core::detection::infrastructure::haar_cascade::HaarCascade;
use face_track_core::detection::infrastructure::haar_cascade_detector::HaarCascadeDetector;
use face_track_core::detection::infrastructure::onnx_face_detector::{
    OnnxFaceDetector, DEFAULT_CONFIDENCE,
};
use face_track_core::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
use face_track_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use face_track_core::pipeline::track_faces_use_case::TrackFacesUseCase;
use face_track_core::shared::constants::{
    DEFAULT_BOX_COLOR, DEFAULT_BOX_THICKNESS, HAAR_CASCADE_NAME, HAAR_CASCADE_URL,
    VIDEO_EXTENSIONS, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use face_track_core::shared::model_resolver;
use face_track_core::tracking::domain::track_lifecycle_controller::TrackLifecycleController;
use face_track_core::tracking::infrastructure::template_tracker::{
    TemplateTrackerConfig, TemplateTrackerFactory,
};
use face_track_core::video::domain::video_reader::VideoReader;
use face_track_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use face_track_core::video::infrastructure::ffmpeg_writer::FfmpegWriter;

/// Frames between progress log lines.
const PROGRESS_LOG_INTERVAL: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DetectorKind {
    /// OpenCV frontal-face Haar cascade.
    Haar,
    /// YOLO face model through ONNX Runtime.
    Onnx,
}

/// Detect faces, follow them with per-face trackers, and draw their boxes.
#[derive(Parser, Debug)]
#[command(name = "face-track")]
struct Cli {
    /// Input video file.
    input: PathBuf,

    /// Annotated output video file.
    output: PathBuf,

    /// Detection backend.
    #[arg(long, value_enum, default_value = "haar")]
    detector: DetectorKind,

    /// JSON file with `detection` and `tracker` settings; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pyramid downscale ratio between detection scales (> 1.0).
    #[arg(long)]
    scale_factor: Option<f64>,

    /// Overlapping raw detections needed to accept a face.
    #[arg(long)]
    min_neighbors: Option<u32>,

    /// Smallest face to detect, as WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_size)]
    min_size: Option<(u32, u32)>,

    /// Face confidence threshold for the ONNX detector (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f64,

    /// Haar cascade XML to use instead of the downloaded default.
    #[arg(long)]
    cascade: Option<PathBuf>,

    /// Tracker search reach around the last box, as a fraction of its size.
    #[arg(long)]
    search_margin: Option<f64>,

    /// Lowest template correlation that keeps a track alive (0.0-1.0).
    #[arg(long)]
    min_track_score: Option<f64>,

    /// Write per-frame regions as JSON lines to this file.
    #[arg(long)]
    regions: Option<PathBuf>,

    /// Box outline colour as R,G,B.
    #[arg(long, value_parser = parse_color)]
    box_color: Option<[u8; 3]>,

    /// Box outline thickness in pixels.
    #[arg(long, default_value_t = DEFAULT_BOX_THICKNESS)]
    box_thickness: u32,
}

/// Layout of the `--config` file. Missing sections keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FileConfig {
    detection: DetectionConfig,
    tracker: TemplateTrackerConfig,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let (detection, tracker) = resolve_settings(&cli)?;
    log::debug!("Detection settings: {detection:?}");
    log::debug!("Tracker settings: {tracker:?}");

    let detector = build_detector(&cli, detection)?;
    let factory = TemplateTrackerFactory::new(tracker)?;
    let controller = TrackLifecycleController::new(detector, Box::new(factory));
    let annotator = RectangleAnnotator::new(
        cli.box_color.unwrap_or(DEFAULT_BOX_COLOR),
        cli.box_thickness,
    )?;
    let region_sink: Option<Box<dyn RegionSink>> = match &cli.regions {
        Some(path) => Some(Box::new(JsonRegionSink::create(path)?)),
        None => None,
    };

    let mut reader: Box<dyn VideoReader> = Box::new(FfmpegReader::new());
    let metadata = reader.open(&cli.input)?;

    let total = metadata.total_frames;
    let progress: Box<dyn Fn(usize, usize) -> bool + Send> = Box::new(move |current, _| {
        eprint!("\rProcessing frame {current}/{total}");
        true
    });

    let mut use_case = TrackFacesUseCase::new(
        reader,
        Box::new(FfmpegWriter::new()),
        controller,
        Box::new(annotator),
        region_sink,
        Box::new(ThreadedPipelineExecutor::new()),
        Some(Box::new(StdoutPipelineLogger::new(PROGRESS_LOG_INTERVAL))),
        Some(progress),
        None,
    );
    let report = use_case.execute(&metadata, &cli.output)?;
    eprintln!();

    if report.frames_dropped > 0 {
        log::warn!("{} invalid frames were dropped", report.frames_dropped);
    }
    log::info!("Output written to {}", cli.output.display());
    if let Some(path) = &cli.regions {
        log::info!("Regions written to {}", path.display());
    }
    Ok(())
}

/// Merges the optional config file with command-line overrides and checks
/// the result.
fn resolve_settings(
    cli: &Cli,
) -> Result<(DetectionConfig, TemplateTrackerConfig), Box<dyn std::error::Error>> {
    let file = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => FileConfig::default(),
    };

    let mut detection = file.detection;
    if let Some(v) = cli.scale_factor {
        detection.scale_factor = v;
    }
    if let Some(v) = cli.min_neighbors {
        detection.min_neighbors = v;
    }
    if let Some(v) = cli.min_size {
        detection.min_size = v;
    }
    detection.validate()?;

    let mut tracker = file.tracker;
    if let Some(v) = cli.search_margin {
        tracker.search_margin = v;
    }
    if let Some(v) = cli.min_track_score {
        tracker.min_score = v;
    }
    tracker.validate()?;

    Ok((detection, tracker))
}

fn load_config_file(path: &Path) -> Result<FileConfig, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
    let config = serde_json::from_str(&text)
        .map_err(|e| format!("invalid config {}: {e}", path.display()))?;
    Ok(config)
}

fn build_detector(
    cli: &Cli,
    config: DetectionConfig,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    match cli.detector {
        DetectorKind::Haar => {
            let path = match &cli.cascade {
                Some(path) => path.clone(),
                None => {
                    log::info!("Resolving cascade: {HAAR_CASCADE_NAME}");
                    let path = model_resolver::resolve(
                        HAAR_CASCADE_NAME,
                        HAAR_CASCADE_URL,
                        None,
                        Some(Box::new(download_progress)),
                    )?;
                    eprintln!();
                    path
                }
            };
            let cascade = HaarCascade::load(&path)?;
            log::debug!(
                "Loaded cascade {}: {} stages, {} features",
                path.display(),
                cascade.stage_count(),
                cascade.feature_count()
            );
            Ok(Box::new(HaarCascadeDetector::new(cascade, config)?))
        }
        DetectorKind::Onnx => {
            log::info!("Resolving model: {YOLO_MODEL_NAME}");
            let model_path = model_resolver::resolve(
                YOLO_MODEL_NAME,
                YOLO_MODEL_URL,
                None,
                Some(Box::new(download_progress)),
            )?;
            eprintln!();
            Ok(Box::new(OnnxFaceDetector::new(
                &model_path,
                config,
                cli.confidence,
            )?))
        }
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if !has_video_extension(&cli.output) {
        return Err(format!(
            "Output must be a video file ({}), got {}",
            VIDEO_EXTENSIONS.join(", "),
            cli.output.display()
        )
        .into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if cli.cascade.is_some() && cli.detector != DetectorKind::Haar {
        return Err("--cascade only applies to the haar detector".into());
    }
    if let Some(path) = &cli.cascade {
        if !path.exists() {
            return Err(format!("Cascade file not found: {}", path.display()).into());
        }
    }
    Ok(())
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("bad width '{w}': {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("bad height '{h}': {e}"))?;
    Ok((w, h))
}

fn parse_color(s: &str) -> Result<[u8; 3], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(format!("expected R,G,B, got '{s}'"));
    };
    let channel = |v: &str| {
        v.parse::<u8>()
            .map_err(|e| format!("bad colour component '{v}': {e}"))
    };
    Ok([channel(*r)?, channel(*g)?, channel(*b)?])
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading detection model... {pct}%");
    } else {
        eprint!("\rDownloading detection model... {downloaded} bytes");
    }
}
