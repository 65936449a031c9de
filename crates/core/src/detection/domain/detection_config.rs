use serde::{Deserialize, Serialize};

use crate::shared::config_error::ConfigError;
use crate::shared::constants::{DEFAULT_MIN_NEIGHBORS, DEFAULT_MIN_SIZE, DEFAULT_SCALE_FACTOR};

/// Tuning knobs handed unchanged to the detector backend.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectionConfig {
    /// Downscale ratio between consecutive pyramid levels.
    pub scale_factor: f64,
    /// Overlapping raw hits a candidate needs to be reported.
    pub min_neighbors: u32,
    /// Smallest accepted face (width, height) in pixels.
    pub min_size: (u32, u32),
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(ConfigError::ScaleFactor(self.scale_factor));
        }
        if self.min_size.0 == 0 || self.min_size.1 == 0 {
            return Err(ConfigError::MinSize(self.min_size.0, self.min_size.1));
        }
        Ok(())
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: DEFAULT_MIN_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_match_frontal_face_tuning() {
        let config = DetectionConfig::default();
        assert_eq!(config.scale_factor, 1.1);
        assert_eq!(config.min_neighbors, 5);
        assert_eq!(config.min_size, (30, 30));
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::one(1.0)]
    #[case::below_one(0.9)]
    #[case::nan(f64::NAN)]
    #[case::infinite(f64::INFINITY)]
    fn test_rejects_bad_scale_factor(#[case] scale_factor: f64) {
        let config = DetectionConfig {
            scale_factor,
            ..DetectionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ScaleFactor(_))));
    }

    #[test]
    fn test_rejects_zero_min_size() {
        let config = DetectionConfig {
            min_size: (0, 30),
            ..DetectionConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MinSize(0, 30)));
    }

    #[test]
    fn test_zero_min_neighbors_is_valid() {
        let config = DetectionConfig {
            min_neighbors: 0,
            ..DetectionConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserializes_camel_case_with_defaults() {
        let config: DetectionConfig =
            serde_json::from_str(r#"{"scaleFactor": 1.2, "minSize": [40, 40]}"#).unwrap();
        assert_eq!(config.scale_factor, 1.2);
        assert_eq!(config.min_size, (40, 40));
        assert_eq!(config.min_neighbors, 5);
    }
}
