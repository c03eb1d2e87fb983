//! Tunable constants for aggregation, normalization and scoring
//!
//! Every calibration constant used by the pipeline lives here with its unit.
//! All fields default to the calibrated values, so a partial JSON document
//! only needs to name the fields it overrides.

use crate::error::StressError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Platform key code for delete/backspace (Android `KEYCODE_DEL`)
pub const DEFAULT_BACKSPACE_KEY_CODE: u32 = 67;

/// Default history capacity (7 days at an hourly cadence)
pub const DEFAULT_HISTORY_CAPACITY: usize = 168;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub aggregator: AggregatorConfig,
    pub overlay: OverlayConfig,
    pub normalization: NormalizationConfig,
    pub heuristic: HeuristicWeights,
    pub thresholds: LevelThresholds,
    pub history: HistoryConfig,
    pub monitor: MonitorConfig,
}

/// Rolling-window and buffer-cap settings for the feature aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Key timestamps older than this are pruned (milliseconds)
    pub typing_window_ms: i64,
    /// Key code counted as a correction
    pub backspace_key_code: u32,
    /// Pressure buffer drops its oldest half once it exceeds this many samples
    pub pressure_buffer_cap: usize,
    /// Swipe velocity buffer drops its oldest half past this many samples
    pub velocity_buffer_cap: usize,
    /// Key-hold buffer drops its oldest half past this many samples
    pub hold_buffer_cap: usize,
    /// Pressure reported when no touch has been seen (0-1)
    pub neutral_pressure: f64,
    /// Accelerometer jitter events older than this are pruned (milliseconds)
    pub motion_window_ms: i64,
    /// Magnitude change between consecutive samples that counts as jitter (m/s²)
    pub agitation_threshold: f64,
    /// App-switch timestamps older than this are pruned (milliseconds)
    pub app_switch_window_ms: i64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            typing_window_ms: 60_000,
            backspace_key_code: DEFAULT_BACKSPACE_KEY_CODE,
            pressure_buffer_cap: 500,
            velocity_buffer_cap: 100,
            hold_buffer_cap: 500,
            neutral_pressure: 0.5,
            motion_window_ms: 60_000,
            agitation_threshold: 2.5,
            app_switch_window_ms: 60_000,
        }
    }
}

/// Freshness rules for externally supplied global metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Overlay is ignored once older than this (milliseconds)
    pub ttl_ms: i64,
    /// Scroll rate divided by this gives the pressure proxy before clamping to [0, 1]
    pub scroll_pressure_divisor: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            scroll_pressure_divisor: 5.0,
        }
    }
}

/// Affine transforms mapping raw statistics into the model's input space
///
/// Each component is computed as `(raw - baseline) / scale`, except the
/// backspace ratio which is `raw * backspace_scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Baseline typing speed (characters per second)
    pub typing_speed_baseline: f64,
    /// Typing speed spread (characters per second)
    pub typing_speed_scale: f64,
    /// Multiplier applied to the backspace ratio
    pub backspace_scale: f64,
    /// Baseline touch pressure (0-1)
    pub pressure_baseline: f64,
    /// Touch pressure spread
    pub pressure_scale: f64,
    /// Baseline session length (seconds)
    pub session_length_baseline_secs: f64,
    /// Session length spread (seconds)
    pub session_length_scale_secs: f64,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            typing_speed_baseline: 5.0,
            typing_speed_scale: 1.5,
            backspace_scale: 5.0,
            pressure_baseline: 0.6,
            pressure_scale: 0.2,
            session_length_baseline_secs: 60.0,
            session_length_scale_secs: 60.0,
        }
    }
}

/// Weights of the linear fallback used when no model is available
///
/// `prob = clamp(typing_speed*ts + backspace_ratio*br + touch_pressure*tp + session_length*sl + bias)`.
/// The session weight is signed; longer sessions lower the estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    pub typing_speed: f64,
    pub backspace_ratio: f64,
    pub touch_pressure: f64,
    pub session_length: f64,
    pub bias: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            typing_speed: 0.15,
            backspace_ratio: 0.4,
            touch_pressure: 0.25,
            session_length: -0.05,
            bias: 0.3,
        }
    }
}

/// Upper bounds (inclusive) of the LOW and MEDIUM buckets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            low_max: 0.30,
            medium_max: 0.65,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of readings retained
    pub capacity: usize,
    /// Mean-score change between history halves needed to report a trend
    pub trend_delta: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
            trend_delta: 10.0,
        }
    }
}

/// Polling intervals for the foreground and background timers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Display-only scoring interval (milliseconds)
    pub foreground_interval_ms: u64,
    /// Scoring interval that also appends to history (milliseconds)
    pub background_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            foreground_interval_ms: 5_000,
            background_interval_ms: 60 * 60 * 1_000,
        }
    }
}

impl StressConfig {
    /// Parse and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, StressError> {
        let config: StressConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self, StressError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, StressError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would make the pipeline divide by zero or never prune
    pub fn validate(&self) -> Result<(), StressError> {
        let agg = &self.aggregator;
        if agg.typing_window_ms <= 0 || agg.motion_window_ms <= 0 || agg.app_switch_window_ms <= 0 {
            return Err(StressError::InvalidConfig(
                "aggregator windows must be positive".to_string(),
            ));
        }
        if agg.pressure_buffer_cap < 2 || agg.velocity_buffer_cap < 2 || agg.hold_buffer_cap < 2 {
            return Err(StressError::InvalidConfig(
                "buffer caps must be at least 2".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&agg.neutral_pressure) {
            return Err(StressError::InvalidConfig(
                "neutral_pressure must be within [0, 1]".to_string(),
            ));
        }

        if self.overlay.ttl_ms <= 0 || self.overlay.scroll_pressure_divisor <= 0.0 {
            return Err(StressError::InvalidConfig(
                "overlay ttl and scroll divisor must be positive".to_string(),
            ));
        }

        let norm = &self.normalization;
        for (name, scale) in [
            ("typing_speed_scale", norm.typing_speed_scale),
            ("pressure_scale", norm.pressure_scale),
            ("session_length_scale_secs", norm.session_length_scale_secs),
        ] {
            if scale == 0.0 || !scale.is_finite() {
                return Err(StressError::InvalidConfig(format!(
                    "{name} must be finite and non-zero"
                )));
            }
        }

        let t = &self.thresholds;
        if !(0.0 <= t.low_max && t.low_max < t.medium_max && t.medium_max <= 1.0) {
            return Err(StressError::InvalidConfig(format!(
                "thresholds must satisfy 0 <= low_max < medium_max <= 1 (got {} / {})",
                t.low_max, t.medium_max
            )));
        }

        if self.history.capacity == 0 {
            return Err(StressError::InvalidConfig(
                "history capacity must be positive".to_string(),
            ));
        }
        if self.history.trend_delta < 0.0 {
            return Err(StressError::InvalidConfig(
                "trend_delta must not be negative".to_string(),
            ));
        }

        if self.monitor.foreground_interval_ms == 0 || self.monitor.background_interval_ms == 0 {
            return Err(StressError::InvalidConfig(
                "monitor intervals must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = StressConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history.capacity, 168);
        assert_eq!(config.aggregator.backspace_key_code, 67);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = StressConfig::from_json(r#"{"thresholds": {"low_max": 0.25}}"#).unwrap();
        assert_eq!(config.thresholds.low_max, 0.25);
        assert_eq!(config.thresholds.medium_max, 0.65);
        assert_eq!(config.normalization, NormalizationConfig::default());
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let result = StressConfig::from_json(r#"{"thresholds": {"low_max": 0.7, "medium_max": 0.5}}"#);
        assert!(matches!(result, Err(StressError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_scale() {
        let result = StressConfig::from_json(r#"{"normalization": {"pressure_scale": 0.0}}"#);
        assert!(matches!(result, Err(StressError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = StressConfig::from_json(r#"{"history": {"capacity": 0}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = StressConfig::default();
        let json = config.to_json_pretty().unwrap();
        let parsed = StressConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
