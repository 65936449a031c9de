pub const HAAR_CASCADE_NAME: &str = "haarcascade_frontalface_default.xml";
pub const HAAR_CASCADE_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Downscale ratio between consecutive detection pyramid levels.
pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;
/// Overlapping raw detections required to confirm a face.
pub const DEFAULT_MIN_NEIGHBORS: u32 = 5;
/// Smallest accepted face box, in pixels.
pub const DEFAULT_MIN_SIZE: (u32, u32) = (30, 30);

pub const DEFAULT_BOX_COLOR: [u8; 3] = [0, 255, 0];
pub const DEFAULT_BOX_THICKNESS: u32 = 2;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "m4v"];
