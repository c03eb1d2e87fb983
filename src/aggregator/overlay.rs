//! Global-metric overlay
//!
//! A single-writer, multi-reader cell holding typing and scroll statistics
//! published by a privileged observer. Readers only see the metrics while
//! they are fresh (younger than the TTL) and carry a non-zero typing speed.

use crate::config::OverlayConfig;
use crate::types::GlobalMetrics;
use std::sync::{PoisonError, RwLock};

#[derive(Debug)]
pub struct GlobalMetricsOverlay {
    config: OverlayConfig,
    cell: RwLock<Option<GlobalMetrics>>,
}

impl Default for GlobalMetricsOverlay {
    fn default() -> Self {
        Self::new(OverlayConfig::default())
    }
}

impl GlobalMetricsOverlay {
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            config,
            cell: RwLock::new(None),
        }
    }

    /// Overwrite the overlay wholesale
    ///
    /// Non-finite or negative values, or an error rate above 1, are ignored and
    /// leave the previous metrics in place. Returns whether the update was kept.
    pub fn publish(&self, typing_speed: f64, error_rate: f64, scroll_rate: f64, now_ms: i64) -> bool {
        let well_formed = [typing_speed, error_rate, scroll_rate]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
            && error_rate <= 1.0;
        if !well_formed {
            log::debug!(
                "ignoring malformed global metrics: speed={typing_speed} error_rate={error_rate} scroll_rate={scroll_rate}"
            );
            return false;
        }

        let metrics = GlobalMetrics {
            typing_speed,
            error_rate,
            scroll_rate,
            last_update_ms: now_ms,
        };
        *self.cell.write().unwrap_or_else(PoisonError::into_inner) = Some(metrics);
        true
    }

    /// Latest published metrics regardless of freshness
    pub fn latest(&self) -> Option<GlobalMetrics> {
        *self.cell.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Metrics usable at `now_ms`, if any
    pub fn fresh(&self, now_ms: i64) -> Option<GlobalMetrics> {
        self.latest().filter(|m| self.is_fresh(m, now_ms) && Self::is_valid(m))
    }

    pub fn is_fresh(&self, metrics: &GlobalMetrics, now_ms: i64) -> bool {
        now_ms - metrics.last_update_ms < self.config.ttl_ms
    }

    /// Observers report zero speed when they saw no typing
    pub fn is_valid(metrics: &GlobalMetrics) -> bool {
        metrics.typing_speed > 0.0
    }

    /// Scroll rate mapped into the touch-pressure range
    pub fn pressure_proxy(&self, metrics: &GlobalMetrics) -> f64 {
        (metrics.scroll_rate / self.config.scroll_pressure_divisor).clamp(0.0, 1.0)
    }
}
