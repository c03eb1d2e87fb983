//! Feature normalization
//!
//! Maps raw interaction statistics into the input space the classifier was
//! trained on. The transforms are affine and deliberately unclamped; only the
//! final probability is clamped.

use crate::config::NormalizationConfig;
use crate::types::{FeatureVector, RawFeatures};

/// Normalizer for raw feature statistics
#[derive(Debug, Clone, Default)]
pub struct FeatureNormalizer {
    config: NormalizationConfig,
}

impl FeatureNormalizer {
    pub fn new(config: NormalizationConfig) -> Self {
        Self { config }
    }

    /// Normalize raw statistics into the 4-feature model input
    ///
    /// ```text
    /// typing_speed   = (speed - 5.0) / 1.5
    /// backspace      = ratio * 5
    /// touch_pressure = (pressure - 0.6) / 0.2
    /// session_length = (seconds - 60) / 60
    /// ```
    pub fn normalize(&self, raw: &RawFeatures) -> FeatureVector {
        let c = &self.config;
        FeatureVector {
            typing_speed: (raw.typing_speed - c.typing_speed_baseline) / c.typing_speed_scale,
            backspace_ratio: raw.backspace_ratio * c.backspace_scale,
            touch_pressure: (raw.touch_pressure - c.pressure_baseline) / c.pressure_scale,
            session_length: (raw.session_length_secs - c.session_length_baseline_secs)
                / c.session_length_scale_secs,
        }
    }

    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }
}
