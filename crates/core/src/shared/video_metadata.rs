use std::path::PathBuf;

/// Stream-level properties reported by a [`VideoReader`](crate::video::domain::video_reader::VideoReader).
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}
