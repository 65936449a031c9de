use ort::execution_providers::ExecutionProviderDispatch;

/// Hardware execution providers tried before ONNX Runtime's CPU fallback.
///
/// CoreML on macOS, DirectML on Windows, nothing extra elsewhere. A provider
/// that fails to register is skipped by `ort`, so the session still builds.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}
