//! Feature aggregation
//!
//! Converts a stream of raw interaction events into bounded rolling
//! statistics and, on request, a normalized feature vector.
//!
//! `FeatureAggregator` is the single-owner state machine. `SharedAggregator`
//! wraps it behind one coarse mutex, together with the global-metric overlay,
//! so input callbacks, timers and the overlay publisher can run on different
//! threads.

pub mod buffer;
pub mod motion;
pub mod overlay;
pub mod stats;

use crate::aggregator::buffer::{SampleBuffer, TimeWindow};
use crate::aggregator::motion::AgitationCounter;
use crate::aggregator::overlay::GlobalMetricsOverlay;
use crate::config::{AggregatorConfig, StressConfig};
use crate::normalizer::FeatureNormalizer;
use crate::types::{
    FeatureSnapshot, FeatureSource, FeatureVector, GlobalMetrics, Point, RawFeatures, TouchPhase,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Raw statistics together with the vector they normalize to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedFeatures {
    pub raw: RawFeatures,
    pub vector: FeatureVector,
}

/// Rolling interaction statistics for one monitoring session
#[derive(Debug, Clone)]
pub struct FeatureAggregator {
    config: AggregatorConfig,
    key_timestamps: TimeWindow,
    total_key_presses: u64,
    error_count: u64,
    key_down_ms: Option<i64>,
    hold_durations: SampleBuffer,
    pressures: SampleBuffer,
    velocities: SampleBuffer,
    touch_start: Option<(i64, Point)>,
    motion: AgitationCounter,
    app_switches: TimeWindow,
    session_start_ms: i64,
}

impl FeatureAggregator {
    pub fn new(config: AggregatorConfig, now_ms: i64) -> Self {
        Self {
            key_timestamps: TimeWindow::new(config.typing_window_ms),
            total_key_presses: 0,
            error_count: 0,
            key_down_ms: None,
            hold_durations: SampleBuffer::new(config.hold_buffer_cap),
            pressures: SampleBuffer::new(config.pressure_buffer_cap),
            velocities: SampleBuffer::new(config.velocity_buffer_cap),
            touch_start: None,
            motion: AgitationCounter::new(config.agitation_threshold, config.motion_window_ms),
            app_switches: TimeWindow::new(config.app_switch_window_ms),
            session_start_ms: now_ms,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    pub fn record_key_down(&mut self, key_code: u32, now_ms: i64) {
        self.key_timestamps.record(now_ms);
        self.total_key_presses += 1;
        if key_code == self.config.backspace_key_code {
            self.error_count += 1;
        }
        self.key_down_ms = Some(now_ms);
    }

    /// Record a key release; ignored when no matching press is known
    pub fn record_key_up(&mut self, now_ms: i64) {
        if let Some(down_ms) = self.key_down_ms.take() {
            self.hold_durations.push((now_ms - down_ms) as f64);
        }
    }

    pub fn record_touch(&mut self, phase: TouchPhase, position: Point, pressure: f64, now_ms: i64) {
        match phase {
            TouchPhase::Down => self.record_touch_down(position, pressure, now_ms),
            TouchPhase::Move => self.record_touch_move(pressure),
            TouchPhase::Up => self.record_touch_up(position, now_ms),
        }
    }

    pub fn record_touch_down(&mut self, position: Point, pressure: f64, now_ms: i64) {
        self.touch_start = Some((now_ms, position));
        self.push_pressure(pressure);
    }

    pub fn record_touch_move(&mut self, pressure: f64) {
        self.push_pressure(pressure);
    }

    /// Finish a gesture; appends swipe velocity (px/s) when it took time
    pub fn record_touch_up(&mut self, position: Point, now_ms: i64) {
        let Some((start_ms, start)) = self.touch_start.take() else {
            return;
        };
        let duration_ms = now_ms - start_ms;
        if duration_ms > 0 {
            let velocity = start.distance_to(&position) / duration_ms as f64 * 1000.0;
            self.velocities.push(velocity);
        }
    }

    pub fn record_accelerometer(&mut self, x: f64, y: f64, z: f64, now_ms: i64) {
        self.motion.record(x, y, z, now_ms);
    }

    pub fn record_app_switch(&mut self, now_ms: i64) {
        self.app_switches.record(now_ms);
    }

    fn push_pressure(&mut self, pressure: f64) {
        if pressure.is_finite() {
            self.pressures.push(pressure);
        } else {
            log::debug!("dropping non-finite touch pressure");
        }
    }

    /// Restart the session clock without touching the buffers
    pub fn reset_session(&mut self, now_ms: i64) {
        self.session_start_ms = now_ms;
    }

    /// Drop every buffer and counter and restart the session clock
    pub fn clear(&mut self, now_ms: i64) {
        self.key_timestamps.clear();
        self.total_key_presses = 0;
        self.error_count = 0;
        self.key_down_ms = None;
        self.hold_durations.clear();
        self.pressures.clear();
        self.velocities.clear();
        self.touch_start = None;
        self.motion.clear();
        self.app_switches.clear();
        self.session_start_ms = now_ms;
    }

    // ------------------------------------------------------------------
    // Derived statistics
    // ------------------------------------------------------------------

    /// Key presses per second inside the typing window
    pub fn typing_speed(&self) -> f64 {
        stats::typing_speed(self.key_timestamps.timestamps())
    }

    pub fn backspace_ratio(&self) -> f64 {
        stats::backspace_ratio(self.error_count, self.total_key_presses)
    }

    pub fn mean_key_hold_ms(&self) -> f64 {
        stats::mean(self.hold_durations.iter()).unwrap_or(0.0)
    }

    /// Mean touch pressure, neutral when no touch was seen
    pub fn average_touch_pressure(&self) -> f64 {
        stats::mean(self.pressures.iter()).unwrap_or(self.config.neutral_pressure)
    }

    pub fn touch_pressure_variance(&self) -> f64 {
        stats::variance(self.pressures.iter())
    }

    pub fn average_swipe_velocity(&self) -> f64 {
        stats::mean(self.velocities.iter()).unwrap_or(0.0)
    }

    pub fn session_length_secs(&self, now_ms: i64) -> f64 {
        (now_ms - self.session_start_ms) as f64 / 1000.0
    }

    pub fn agitation_per_minute(&self, now_ms: i64) -> f64 {
        self.motion.per_minute(now_ms)
    }

    pub fn app_switches_per_minute(&self, now_ms: i64) -> f64 {
        stats::per_minute(
            self.app_switches.count_since(now_ms),
            self.app_switches.span_ms(),
        )
    }

    pub fn total_key_presses(&self) -> u64 {
        self.total_key_presses
    }

    pub fn hold_sample_count(&self) -> usize {
        self.hold_durations.len()
    }

    pub fn pressure_sample_count(&self) -> usize {
        self.pressures.len()
    }

    pub fn velocity_sample_count(&self) -> usize {
        self.velocities.len()
    }

    pub fn snapshot(&self, now_ms: i64) -> FeatureSnapshot {
        FeatureSnapshot {
            typing_speed: self.typing_speed(),
            backspace_ratio: self.backspace_ratio(),
            mean_key_hold_ms: self.mean_key_hold_ms(),
            average_touch_pressure: self.average_touch_pressure(),
            touch_pressure_variance: self.touch_pressure_variance(),
            average_swipe_velocity: self.average_swipe_velocity(),
            session_length_secs: self.session_length_secs(now_ms),
            agitation_per_minute: self.agitation_per_minute(now_ms),
            app_switches_per_minute: self.app_switches_per_minute(now_ms),
            total_key_presses: self.total_key_presses,
        }
    }

    /// Pick the statistics that feed the model
    ///
    /// Fresh overlay metrics supersede local typing speed, error rate and
    /// pressure (via the scroll-rate proxy). Session length is always local.
    pub fn raw_features(
        &self,
        now_ms: i64,
        overlay: Option<(&GlobalMetrics, &GlobalMetricsOverlay)>,
    ) -> RawFeatures {
        let session_length_secs = self.session_length_secs(now_ms);
        match overlay {
            Some((metrics, cell)) => RawFeatures {
                typing_speed: metrics.typing_speed,
                backspace_ratio: metrics.error_rate,
                touch_pressure: cell.pressure_proxy(metrics),
                session_length_secs,
                source: FeatureSource::Overlay,
            },
            None => RawFeatures {
                typing_speed: self.typing_speed(),
                backspace_ratio: self.backspace_ratio(),
                touch_pressure: self.average_touch_pressure(),
                session_length_secs,
                source: FeatureSource::Local,
            },
        }
    }
}

/// Thread-safe aggregator handle
///
/// Clones share the same state. Every mutation takes the aggregator lock;
/// reads copy what they need and never mutate.
#[derive(Debug, Clone)]
pub struct SharedAggregator {
    state: Arc<Mutex<FeatureAggregator>>,
    overlay: Arc<GlobalMetricsOverlay>,
    normalizer: FeatureNormalizer,
}

impl SharedAggregator {
    pub fn new(config: &StressConfig, now_ms: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(FeatureAggregator::new(
                config.aggregator.clone(),
                now_ms,
            ))),
            overlay: Arc::new(GlobalMetricsOverlay::new(config.overlay.clone())),
            normalizer: FeatureNormalizer::new(config.normalization.clone()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeatureAggregator> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_key_down(&self, key_code: u32, now_ms: i64) {
        self.lock().record_key_down(key_code, now_ms);
    }

    pub fn record_key_up(&self, now_ms: i64) {
        self.lock().record_key_up(now_ms);
    }

    pub fn record_touch(&self, phase: TouchPhase, position: Point, pressure: f64, now_ms: i64) {
        self.lock().record_touch(phase, position, pressure, now_ms);
    }

    pub fn record_accelerometer(&self, x: f64, y: f64, z: f64, now_ms: i64) {
        self.lock().record_accelerometer(x, y, z, now_ms);
    }

    pub fn record_app_switch(&self, now_ms: i64) {
        self.lock().record_app_switch(now_ms);
    }

    /// Publish global metrics; returns false when the input was malformed
    pub fn set_global_metrics(&self, typing_speed: f64, error_rate: f64, scroll_rate: f64, now_ms: i64) -> bool {
        self.overlay.publish(typing_speed, error_rate, scroll_rate, now_ms)
    }

    pub fn snapshot(&self, now_ms: i64) -> FeatureSnapshot {
        self.lock().snapshot(now_ms)
    }

    /// Raw statistics and the normalized vector at `now_ms`
    pub fn extract(&self, now_ms: i64) -> ExtractedFeatures {
        let fresh = self.overlay.fresh(now_ms);
        let raw = self
            .lock()
            .raw_features(now_ms, fresh.as_ref().map(|m| (m, self.overlay.as_ref())));
        ExtractedFeatures {
            raw,
            vector: self.normalizer.normalize(&raw),
        }
    }

    pub fn feature_vector(&self, now_ms: i64) -> FeatureVector {
        self.extract(now_ms).vector
    }

    pub fn reset_session(&self, now_ms: i64) {
        self.lock().reset_session(now_ms);
    }

    /// Clear local buffers; the overlay belongs to its publisher and is kept
    pub fn clear(&self, now_ms: i64) {
        self.lock().clear(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const BACKSPACE: u32 = 67;
    const LETTER_A: u32 = 29;

    fn aggregator() -> FeatureAggregator {
        FeatureAggregator::new(AggregatorConfig::default(), 0)
    }

    #[test]
    fn test_empty_aggregator_is_neutral() {
        let agg = aggregator();
        assert_eq!(agg.typing_speed(), 0.0);
        assert_eq!(agg.backspace_ratio(), 0.0);
        assert_eq!(agg.mean_key_hold_ms(), 0.0);
        assert_eq!(agg.average_touch_pressure(), 0.5);
        assert_eq!(agg.touch_pressure_variance(), 0.0);
        assert_eq!(agg.average_swipe_velocity(), 0.0);
    }

    #[test]
    fn test_typing_speed_over_window() {
        let mut agg = aggregator();
        // 11 presses, 100ms apart: span 1000ms
        for i in 0..11 {
            agg.record_key_down(LETTER_A, 1_000 + i * 100);
        }
        assert!((agg.typing_speed() - 11.0).abs() < 1e-9);

        // a single press is not enough for a rate
        let mut single = aggregator();
        single.record_key_down(LETTER_A, 5_000);
        assert_eq!(single.typing_speed(), 0.0);
    }

    #[test]
    fn test_stale_key_timestamps_are_pruned() {
        let mut agg = aggregator();
        agg.record_key_down(LETTER_A, 0);
        agg.record_key_down(LETTER_A, 1_000);
        agg.record_key_down(LETTER_A, 70_000);
        agg.record_key_down(LETTER_A, 70_500);
        // only the two recent presses remain in the window: 2 / 500ms
        assert!((agg.typing_speed() - 4.0).abs() < 1e-9);
        // counters are not windowed
        assert_eq!(agg.total_key_presses(), 4);
    }

    #[test]
    fn test_backspace_ratio_counts_delete_key() {
        let mut agg = aggregator();
        for (i, code) in [LETTER_A, LETTER_A, BACKSPACE, LETTER_A].iter().enumerate() {
            agg.record_key_down(*code, i as i64 * 100);
        }
        assert_eq!(agg.backspace_ratio(), 0.25);
    }

    #[test]
    fn test_backspace_ratio_within_unit_interval() {
        let mut agg = aggregator();
        for i in 0..200 {
            let code = if i % 3 == 0 { BACKSPACE } else { LETTER_A };
            agg.record_key_down(code, i * 37);
            let ratio = agg.backspace_ratio();
            assert!((0.0..=1.0).contains(&ratio));
        }
    }

    #[test]
    fn test_key_hold_durations() {
        let mut agg = aggregator();
        agg.record_key_down(LETTER_A, 1_000);
        agg.record_key_up(1_080);
        agg.record_key_down(LETTER_A, 2_000);
        agg.record_key_up(2_120);
        // release without a press is ignored
        agg.record_key_up(3_000);
        assert_eq!(agg.hold_sample_count(), 2);
        assert_eq!(agg.mean_key_hold_ms(), 100.0);
    }

    #[test]
    fn test_hold_buffer_is_capped() {
        let mut agg = aggregator();
        for i in 0..2_000 {
            agg.record_key_down(LETTER_A, i * 10);
            agg.record_key_up(i * 10 + 5);
        }
        assert!(agg.hold_sample_count() <= 500);
    }

    #[test]
    fn test_touch_pressure_statistics() {
        let mut agg = aggregator();
        agg.record_touch_down(Point::new(0.0, 0.0), 0.4, 0);
        agg.record_touch_move(0.6);
        agg.record_touch_move(0.8);
        assert!((agg.average_touch_pressure() - 0.6).abs() < 1e-12);
        // ((0.2)^2 + 0 + (0.2)^2) / 3
        assert!((agg.touch_pressure_variance() - 0.08 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_swipe_velocity() {
        let mut agg = aggregator();
        agg.record_touch_down(Point::new(0.0, 0.0), 0.5, 1_000);
        agg.record_touch_up(Point::new(300.0, 400.0), 1_500);
        // 500px in 500ms
        assert_eq!(agg.average_swipe_velocity(), 1_000.0);

        // zero-duration gestures add no velocity sample
        agg.record_touch_down(Point::new(0.0, 0.0), 0.5, 2_000);
        agg.record_touch_up(Point::new(10.0, 0.0), 2_000);
        assert_eq!(agg.velocity_sample_count(), 1);
    }

    #[test]
    fn test_touch_buffers_are_capped() {
        let mut agg = aggregator();
        for i in 0..1_000 {
            let t = i * 10;
            agg.record_touch_down(Point::new(0.0, 0.0), 0.5, t);
            agg.record_touch_up(Point::new(5.0, 0.0), t + 5);
        }
        assert!(agg.pressure_sample_count() <= 500);
        assert!(agg.velocity_sample_count() <= 100);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut agg = aggregator();
        agg.record_key_down(BACKSPACE, 0);
        agg.record_key_down(LETTER_A, 100);
        agg.record_touch_down(Point::new(0.0, 0.0), 0.9, 100);
        agg.record_app_switch(100);

        agg.clear(10_000);
        assert_eq!(agg.total_key_presses(), 0);
        assert_eq!(agg.backspace_ratio(), 0.0);
        assert_eq!(agg.average_touch_pressure(), 0.5);
        assert_eq!(agg.session_length_secs(10_000), 0.0);
        assert_eq!(agg.app_switches_per_minute(10_000), 0.0);
    }

    #[test]
    fn test_session_length() {
        let mut agg = aggregator();
        assert_eq!(agg.session_length_secs(90_000), 90.0);
        agg.reset_session(60_000);
        assert_eq!(agg.session_length_secs(90_000), 30.0);
    }

    #[test]
    fn test_local_feature_vector() {
        let shared = SharedAggregator::new(&StressConfig::default(), 0);
        // empty buffers, 60s into the session
        let extracted = shared.extract(60_000);
        assert_eq!(extracted.raw.source, FeatureSource::Local);
        assert!((extracted.vector.typing_speed + 5.0 / 1.5).abs() < 1e-12);
        assert_eq!(extracted.vector.backspace_ratio, 0.0);
        assert!((extracted.vector.touch_pressure + 0.5).abs() < 1e-9);
        assert_eq!(extracted.vector.session_length, 0.0);
    }

    #[test]
    fn test_fresh_overlay_supersedes_local() {
        let shared = SharedAggregator::new(&StressConfig::default(), 0);
        shared.record_key_down(LETTER_A, 1_000);
        shared.record_key_down(LETTER_A, 1_100);
        assert!(shared.set_global_metrics(6.5, 0.2, 4.0, 10_000));

        let extracted = shared.extract(20_000);
        assert_eq!(extracted.raw.source, FeatureSource::Overlay);
        assert_eq!(extracted.raw.typing_speed, 6.5);
        assert_eq!(extracted.raw.backspace_ratio, 0.2);
        assert!((extracted.raw.touch_pressure - 0.8).abs() < 1e-12);
        assert!((extracted.vector.typing_speed - 1.0).abs() < 1e-12);

        // after the TTL the local statistics are used again
        let stale = shared.extract(70_000);
        assert_eq!(stale.raw.source, FeatureSource::Local);
        assert!((stale.raw.typing_speed - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_speed_overlay_is_ignored() {
        let shared = SharedAggregator::new(&StressConfig::default(), 0);
        shared.set_global_metrics(0.0, 0.5, 4.0, 1_000);
        assert_eq!(shared.extract(2_000).raw.source, FeatureSource::Local);
    }

    #[test]
    fn test_reads_do_not_mutate() {
        let shared = SharedAggregator::new(&StressConfig::default(), 0);
        for i in 0..10 {
            shared.record_key_down(LETTER_A, i * 100);
        }
        let first = shared.extract(5_000);
        let second = shared.extract(5_000);
        assert_eq!(first, second);
        assert_eq!(shared.snapshot(5_000), shared.snapshot(5_000));
    }

    #[test]
    fn test_concurrent_recording_loses_nothing() {
        let shared = SharedAggregator::new(&StressConfig::default(), 0);
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        shared.record_key_down(LETTER_A, worker * 1_000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.snapshot(10_000).total_key_presses, 2_000);
    }
}
