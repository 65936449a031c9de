use thiserror::Error;

/// Rejected detector or tracker configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("scale factor must be greater than 1.0, got {0}")]
    ScaleFactor(f64),
    #[error("minimum size must be positive, got {0}x{1}")]
    MinSize(u32, u32),
    #[error("{name} must be in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },
}
