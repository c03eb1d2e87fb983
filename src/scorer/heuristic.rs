//! Deterministic fallback used when no model is available
//!
//! Formula:
//! ```text
//! prob = clamp(0.15*typing_speed + 0.4*backspace_ratio
//!            + 0.25*touch_pressure - 0.05*session_length + 0.3, 0, 1)
//! ```
//! Stored histories were scored with these exact weights, so the defaults
//! must not drift.

use crate::config::HeuristicWeights;
use crate::types::FeatureVector;

pub fn heuristic_probability(vector: &FeatureVector, weights: &HeuristicWeights) -> f64 {
    let linear = weights.typing_speed * vector.typing_speed
        + weights.backspace_ratio * vector.backspace_ratio
        + weights.touch_pressure * vector.touch_pressure
        + weights.session_length * vector.session_length
        + weights.bias;
    if linear.is_nan() {
        return 0.5;
    }
    linear.clamp(0.0, 1.0)
}
