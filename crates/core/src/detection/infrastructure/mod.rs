pub mod execution_provider;
pub mod haar_cascade;
pub mod haar_cascade_detector;
pub mod math;
pub mod onnx_face_detector;
