/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference and NMS post-processing. The
/// neighbour count each kept box absorbed during NMS plays the role of the
/// cascade's `min_neighbors`.
use std::path::Path;

use crate::detection::domain::detection_config::DetectionConfig;
use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

use super::execution_provider::preferred_execution_providers;
use super::math::bbox_iou;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for face detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxFaceDetector {
    session: ort::session::Session,
    config: DetectionConfig,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(
        model_path: &Path,
        config: DetectionConfig,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence must be in [0, 1], got {confidence}").into());
        }

        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // [N, C, H, W], square input
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::debug!(
            "ONNX face detector: input {input_size}px, scale factor {} unused by single-pass inference",
            config.scale_factor
        );

        Ok(Self {
            session,
            config,
            confidence,
            input_size,
        })
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectionError> {
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor).map_err(backend)?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(backend)?;
        if outputs.len() == 0 {
            return Err(backend("YOLO model produced no outputs"));
        }
        let tensor = outputs[0].try_extract_array::<f32>().map_err(backend)?;
        let shape = tensor.shape().to_vec();

        // [1, features, detections] (transposed) or [1, detections, features]
        if shape.len() != 3 {
            return Err(backend(format!("unexpected YOLO output shape: {shape:?}")));
        }
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if num_feats < 5 {
            return Ok(Vec::new());
        }

        let data = tensor
            .as_slice()
            .ok_or_else(|| backend("cannot get tensor slice"))?;
        let at = |i: usize, f: usize| -> f64 {
            if transposed {
                data[f * num_dets + i] as f64
            } else {
                data[i * num_feats + f] as f64
            }
        };

        let mut raw = Vec::new();
        for i in 0..num_dets {
            // [cx, cy, w, h, conf, keypoints...]
            let conf = at(i, 4);
            if conf < self.confidence {
                continue;
            }
            let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
            raw.push(RawDetection {
                x1: ((cx - w / 2.0) - pad_x as f64) / scale,
                y1: ((cy - h / 2.0) - pad_y as f64) / scale,
                x2: ((cx + w / 2.0) - pad_x as f64) / scale,
                y2: ((cy + h / 2.0) - pad_y as f64) / scale,
                confidence: conf,
            });
        }
        Ok(raw)
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectionError> {
        frame
            .check_well_formed()
            .map_err(DetectionError::InvalidFrame)?;

        let mut raw = self.infer(frame)?;
        let candidates = raw.len();
        let faces = select_faces(
            &mut raw,
            &self.config,
            frame.width(),
            frame.height(),
        );

        log::debug!(
            "Frame {}: {candidates} candidates above confidence, {} faces",
            frame.index(),
            faces.len()
        );
        Ok(faces)
    }
}

fn backend(e: impl std::fmt::Display) -> DetectionError {
    DetectionError::Backend(e.to_string().into())
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`. Gray frames are
/// replicated across the three input channels.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // 114/255 gray padding, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let gray_input = frame.channels() == 1;

    // Nearest-neighbor resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                let sc = if gray_input { 0 } else { c };
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, sc]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

impl RawDetection {
    fn corners(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// A detection that survived NMS and the overlapping candidates it absorbed.
#[derive(Clone, Debug)]
struct Kept {
    det: RawDetection,
    neighbors: u32,
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes and
/// count them against the box that suppressed them.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<Kept> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        let mut neighbors = 0;
        for j in (i + 1)..dets.len() {
            if suppressed[j] {
                continue;
            }
            if bbox_iou(&dets[i].corners(), &dets[j].corners()) > iou_thresh {
                suppressed[j] = true;
                neighbors += 1;
            }
        }
        keep.push(Kept {
            det: dets[i].clone(),
            neighbors,
        });
    }
    keep
}

/// NMS, neighbour and size filtering, then clipping to the frame.
fn select_faces(
    raw: &mut [RawDetection],
    config: &DetectionConfig,
    frame_width: u32,
    frame_height: u32,
) -> Vec<BoundingBox> {
    let (min_w, min_h) = config.min_size;
    nms(raw, NMS_IOU_THRESH)
        .into_iter()
        .filter(|k| k.neighbors >= config.min_neighbors)
        .filter_map(|k| {
            BoundingBox::from_corners_clamped(
                k.det.x1,
                k.det.y1,
                k.det.x2,
                k.det.y2,
                frame_width,
                frame_height,
            )
        })
        .filter(|b| b.width >= min_w && b.height >= min_h)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
