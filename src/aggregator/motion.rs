//! Accelerometer agitation counter
//!
//! Counts abrupt changes in acceleration magnitude between consecutive
//! samples. The rate feeds the feature snapshot only; it is not part of the
//! model's input vector.

use crate::aggregator::buffer::TimeWindow;
use crate::aggregator::stats::per_minute;

#[derive(Debug, Clone)]
pub struct AgitationCounter {
    threshold: f64,
    last_magnitude: Option<f64>,
    jitter_events: TimeWindow,
}

impl AgitationCounter {
    pub fn new(threshold: f64, window_ms: i64) -> Self {
        Self {
            threshold,
            last_magnitude: None,
            jitter_events: TimeWindow::new(window_ms),
        }
    }

    /// Record a 3-axis sample (m/s²). Returns true when it counted as jitter.
    pub fn record(&mut self, x: f64, y: f64, z: f64, now_ms: i64) -> bool {
        let magnitude = (x * x + y * y + z * z).sqrt();
        if !magnitude.is_finite() {
            return false;
        }

        let jitter = matches!(self.last_magnitude, Some(prev) if (magnitude - prev).abs() > self.threshold);
        self.last_magnitude = Some(magnitude);

        if jitter {
            self.jitter_events.record(now_ms);
        } else {
            self.jitter_events.prune(now_ms);
        }
        jitter
    }

    /// Jitter events per minute over the trailing window
    pub fn per_minute(&self, now_ms: i64) -> f64 {
        per_minute(
            self.jitter_events.count_since(now_ms),
            self.jitter_events.span_ms(),
        )
    }

    pub fn clear(&mut self) {
        self.last_magnitude = None;
        self.jitter_events.clear();
    }
}
