//! Core data types for calmtrace
//!
//! These types flow through the pipeline: raw input events feed the
//! aggregator, which produces feature vectors for the scorer, whose analyses
//! become persisted stress readings.

use crate::config::LevelThresholds;
use crate::error::StressError;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Three-level stress bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StressLevel {
    Low,
    Medium,
    High,
}

impl StressLevel {
    /// Bucket a probability. Boundary values belong to the lower bucket.
    pub fn from_probability(probability: f64, thresholds: &LevelThresholds) -> Self {
        if probability <= thresholds.low_max {
            StressLevel::Low
        } else if probability <= thresholds.medium_max {
            StressLevel::Medium
        } else {
            StressLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StressLevel::Low => "LOW",
            StressLevel::Medium => "MEDIUM",
            StressLevel::High => "HIGH",
        }
    }
}

/// Direction of the score trend across the history ring
///
/// Scores measure stress, so a falling score is `Improving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Improving,
    Stable,
    Worsening,
}

/// Normalized 4-feature model input
///
/// Components are roughly within (-2, 2) but are never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub typing_speed: f64,
    pub backspace_ratio: f64,
    pub touch_pressure: f64,
    pub session_length: f64,
}

impl FeatureVector {
    /// Number of components the model consumes
    pub const LEN: usize = 4;

    pub fn new(typing_speed: f64, backspace_ratio: f64, touch_pressure: f64, session_length: f64) -> Self {
        Self {
            typing_speed,
            backspace_ratio,
            touch_pressure,
            session_length,
        }
    }

    /// Build a vector from an ordered slice, rejecting the wrong arity
    pub fn from_slice(values: &[f64]) -> Result<Self, StressError> {
        match values {
            [ts, br, tp, sl] => Ok(Self::new(*ts, *br, *tp, *sl)),
            _ => Err(StressError::InvalidVector {
                expected: Self::LEN,
                actual: values.len(),
            }),
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [
            self.typing_speed,
            self.backspace_ratio,
            self.touch_pressure,
            self.session_length,
        ]
    }

    /// Single-precision input for the model
    pub fn to_f32_array(&self) -> [f32; 4] {
        self.to_array().map(|v| v as f32)
    }
}

/// Where the typing and pressure statistics of a vector came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSource {
    Local,
    Overlay,
}

/// Un-normalized statistics that produced a feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFeatures {
    /// Characters per second
    pub typing_speed: f64,
    /// Corrections per key press (0-1)
    pub backspace_ratio: f64,
    /// Touch pressure or its scroll-rate proxy (0-1)
    pub touch_pressure: f64,
    pub session_length_secs: f64,
    pub source: FeatureSource,
}

/// Point-in-time copy of every statistic the aggregator derives
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub typing_speed: f64,
    pub backspace_ratio: f64,
    pub mean_key_hold_ms: f64,
    pub average_touch_pressure: f64,
    pub touch_pressure_variance: f64,
    pub average_swipe_velocity: f64,
    pub session_length_secs: f64,
    pub agitation_per_minute: f64,
    pub app_switches_per_minute: f64,
    pub total_key_presses: u64,
}

/// Typing and scroll statistics published by a privileged observer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    /// Characters per second
    pub typing_speed: f64,
    /// Corrections per key press
    pub error_rate: f64,
    /// Scroll events per second
    pub scroll_rate: f64,
    pub last_update_ms: i64,
}

/// Which path produced a probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Model,
    Heuristic,
}

/// Result of one scoring cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressAnalysis {
    /// Stress probability (0-1)
    pub probability: f64,
    /// Display score (0-100)
    pub score: u8,
    pub level: StressLevel,
    pub source: PredictionSource,
}

/// Persisted history record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressReading {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub score: u8,
    pub level: StressLevel,
    pub typing_speed: f64,
    pub backspace_ratio: f64,
    pub touch_pressure: f64,
}

impl StressReading {
    /// Build a reading from an analysis and the raw statistics behind it
    pub fn from_analysis(timestamp: i64, analysis: &StressAnalysis, raw: &RawFeatures) -> Self {
        Self {
            timestamp,
            score: analysis.score,
            level: analysis.level,
            typing_speed: raw.typing_speed,
            backspace_ratio: raw.backspace_ratio,
            touch_pressure: raw.touch_pressure,
        }
    }
}

/// Screen position in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchPhase {
    Down,
    Move,
    Up,
}

impl TouchPhase {
    /// Map the C ABI phase code (0 = down, 1 = move, 2 = up)
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(TouchPhase::Down),
            1 => Some(TouchPhase::Move),
            2 => Some(TouchPhase::Up),
            _ => None,
        }
    }
}

/// Recorded platform event, as replayed by the pipeline and the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    KeyDown {
        timestamp_ms: i64,
        key_code: u32,
    },
    KeyUp {
        timestamp_ms: i64,
    },
    Touch {
        timestamp_ms: i64,
        phase: TouchPhase,
        x: f64,
        y: f64,
        #[serde(default)]
        pressure: f64,
    },
    Accelerometer {
        timestamp_ms: i64,
        x: f64,
        y: f64,
        z: f64,
    },
    AppSwitch {
        timestamp_ms: i64,
    },
    GlobalMetrics {
        timestamp_ms: i64,
        typing_speed: f64,
        error_rate: f64,
        scroll_rate: f64,
    },
    /// Run a scoring cycle and append the result to history
    Analyze {
        timestamp_ms: i64,
    },
    /// Manual mood log (score 0-100)
    Mood {
        timestamp_ms: i64,
        score: u8,
    },
}

impl InputEvent {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            InputEvent::KeyDown { timestamp_ms, .. }
            | InputEvent::KeyUp { timestamp_ms }
            | InputEvent::Touch { timestamp_ms, .. }
            | InputEvent::Accelerometer { timestamp_ms, .. }
            | InputEvent::AppSwitch { timestamp_ms }
            | InputEvent::GlobalMetrics { timestamp_ms, .. }
            | InputEvent::Analyze { timestamp_ms }
            | InputEvent::Mood { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}
