use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for pipeline orchestration events.
///
/// The executor reports per-frame stage timings (`track`, `annotate`) and
/// metrics (`tracks`, `detections`) here, so callers choose how much of it
/// reaches the user.
pub trait PipelineLogger: Send {
    /// Report frame-level progress.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record one sample of a named metric.
    fn metric(&mut self, name: &str, value: f64);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards every event. Used when the caller has its own progress display
/// and by tests.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
}

/// Running sum of one timing or metric series.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Series {
    total: f64,
    count: usize,
}

impl Series {
    fn push(&mut self, value: f64) {
        self.total += value;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Logs throttled progress through `log` and prints a per-stage summary at
/// info level when the run ends.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: BTreeMap<String, Series>,
    metrics: BTreeMap<String, Series>,
    start_time: Instant,
    frames: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    /// Mean duration of a stage in milliseconds, if it was ever timed.
    pub fn mean_timing(&self, stage: &str) -> Option<f64> {
        self.timings.get(stage).map(Series::mean)
    }

    /// Mean of a metric, if it was ever recorded.
    pub fn mean_metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(Series::mean)
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Pipeline summary ({} frames, {:.1}s total):",
            self.frames,
            elapsed_ms / 1000.0
        )];

        for (stage, series) in &self.timings {
            let pct = if elapsed_ms > 0.0 {
                series.total / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:12}: avg {:6.1}ms  total {:7.0}ms  ({pct:4.1}%)",
                series.mean(),
                series.total
            ));
        }
        for (name, series) in &self.metrics {
            lines.push(format!(
                "  {name}: avg {:.1} over {} samples",
                series.mean(),
                series.count
            ));
        }

        if self.frames > 0 && elapsed_ms > 0.0 {
            let fps = self.frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames = current;
        if current % self.throttle_frames != 0 && current != total {
            return;
        }
        if total > 0 {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Processed {current}/{total} frames ({pct:.1}%)");
        } else {
            // container without a frame count
            log::info!("Processed {current} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullPipelineLogger;
        logger.progress(1, 10);
        logger.timing("track", 5.0);
        logger.metric("tracks", 3.0);
        logger.summary();
    }

    #[test]
    fn test_timings_are_averaged_per_stage() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.timing("track", 20.0);
        logger.timing("track", 30.0);
        logger.timing("annotate", 5.0);

        assert_relative_eq!(logger.mean_timing("track").unwrap(), 25.0);
        assert_relative_eq!(logger.mean_timing("annotate").unwrap(), 5.0);
        assert!(logger.mean_timing("write").is_none());
    }

    #[test]
    fn test_metrics_are_averaged() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.metric("tracks", 1.0);
        logger.metric("tracks", 2.0);
        assert_relative_eq!(logger.mean_metric("tracks").unwrap(), 1.5);
    }

    #[test]
    fn test_summary_lists_stages_metrics_and_throughput() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.progress(10, 10);
        logger.timing("track", 10.0);
        logger.timing("annotate", 1.0);
        logger.metric("detections", 2.0);
        logger.metric("detections", 1.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.starts_with("Pipeline summary (10 frames"));
        assert!(summary.contains("track"));
        assert!(summary.contains("annotate"));
        assert!(summary.contains("detections: avg 1.5 over 2 samples"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_stages_are_listed_alphabetically() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.timing("track", 1.0);
        logger.timing("annotate", 1.0);
        let summary = logger.summary_string().unwrap();
        let annotate = summary.find("annotate").unwrap();
        let track = summary.find("track").unwrap();
        assert!(annotate < track);
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(StdoutPipelineLogger::new(10).summary_string().is_none());
    }

    #[test]
    fn test_progress_tracks_frame_count_without_total() {
        let mut logger = StdoutPipelineLogger::new(10);
        for i in 1..=25 {
            logger.progress(i, 0);
        }
        assert_eq!(logger.frames, 25);
    }

    #[test]
    fn test_zero_throttle_is_clamped() {
        assert_eq!(StdoutPipelineLogger::new(0).throttle_frames, 1);
        assert_eq!(StdoutPipelineLogger::default().throttle_frames, 100);
    }
}
