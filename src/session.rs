//! Monitoring session
//!
//! A session owns one aggregator, one scorer and one history ring. Recording
//! is gated on an atomic active flag so that stopping takes effect
//! immediately for every thread feeding events, and a scoring cycle that
//! completes after `stop()` has its result discarded.

use crate::aggregator::{ExtractedFeatures, SharedAggregator};
use crate::config::StressConfig;
use crate::error::StressError;
use crate::history::{HistoryRing, HistorySummary, KeyValueStore, SharedHistory};
use crate::scorer::StressScorer;
use crate::types::{
    FeatureSnapshot, Point, RawFeatures, StressAnalysis, StressReading, TouchPhase,
};
use chrono::{DateTime, TimeZone};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Stateful stress monitor for one user session
#[derive(Debug)]
pub struct MonitoringSession {
    id: Uuid,
    config: StressConfig,
    aggregator: SharedAggregator,
    scorer: StressScorer,
    history: SharedHistory,
    active: AtomicBool,
}

impl MonitoringSession {
    /// Create a session; it starts active with the session clock at `now_ms`
    pub fn new(config: StressConfig, scorer: StressScorer, now_ms: i64) -> Self {
        let aggregator = SharedAggregator::new(&config, now_ms);
        let history = SharedHistory::new(HistoryRing::new(config.history.clone()));
        Self {
            id: Uuid::new_v4(),
            config,
            aggregator,
            scorer,
            history,
            active: AtomicBool::new(true),
        }
    }

    /// Session with the heuristic scorer and default configuration
    pub fn with_defaults(now_ms: i64) -> Self {
        let config = StressConfig::default();
        let scorer = StressScorer::heuristic_only(&config);
        Self::new(config, scorer, now_ms)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    pub fn scorer(&self) -> &StressScorer {
        &self.scorer
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    pub fn aggregator(&self) -> &SharedAggregator {
        &self.aggregator
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn start(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            log::info!("stress monitoring resumed (session {})", self.id);
        }
    }

    /// Stop recording; once this returns no background reading is appended
    pub fn stop(&self) {
        // flipped under the history lock so an in-flight append either lands
        // before this returns or sees the session stopped
        let _ring = self.history.lock();
        if self.active.swap(false, Ordering::SeqCst) {
            log::info!("stress monitoring stopped (session {})", self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Recording (no-ops while stopped)
    // ------------------------------------------------------------------

    pub fn record_key_down(&self, key_code: u32, now_ms: i64) {
        if self.is_active() {
            self.aggregator.record_key_down(key_code, now_ms);
        }
    }

    pub fn record_key_up(&self, now_ms: i64) {
        if self.is_active() {
            self.aggregator.record_key_up(now_ms);
        }
    }

    pub fn record_touch(&self, phase: TouchPhase, position: Point, pressure: f64, now_ms: i64) {
        if self.is_active() {
            self.aggregator.record_touch(phase, position, pressure, now_ms);
        }
    }

    pub fn record_accelerometer(&self, x: f64, y: f64, z: f64, now_ms: i64) {
        if self.is_active() {
            self.aggregator.record_accelerometer(x, y, z, now_ms);
        }
    }

    pub fn record_app_switch(&self, now_ms: i64) {
        if self.is_active() {
            self.aggregator.record_app_switch(now_ms);
        }
    }

    /// Publish overlay metrics; returns false when ignored
    pub fn set_global_metrics(&self, typing_speed: f64, error_rate: f64, scroll_rate: f64, now_ms: i64) -> bool {
        self.is_active()
            && self
                .aggregator
                .set_global_metrics(typing_speed, error_rate, scroll_rate, now_ms)
    }

    // ------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------

    pub fn snapshot(&self, now_ms: i64) -> FeatureSnapshot {
        self.aggregator.snapshot(now_ms)
    }

    fn score(&self, now_ms: i64) -> Option<(ExtractedFeatures, StressAnalysis)> {
        if !self.is_active() {
            return None;
        }
        let features = self.aggregator.extract(now_ms);
        let analysis = self.scorer.analyze(&features.vector);
        // stop() may have raced the scoring cycle
        if !self.is_active() {
            log::debug!("discarding analysis computed after stop");
            return None;
        }
        Some((features, analysis))
    }

    /// Run one scoring cycle without touching history
    pub fn analyze(&self, now_ms: i64) -> Option<StressAnalysis> {
        self.score(now_ms).map(|(_, analysis)| analysis)
    }

    /// Run one scoring cycle and append the result to history
    pub fn record_reading(&self, now_ms: i64) -> Option<StressReading> {
        self.record_evaluation(now_ms)
            .map(|(features, analysis)| StressReading::from_analysis(now_ms, &analysis, &features.raw))
    }

    /// Like [`record_reading`](Self::record_reading), but hands back the
    /// features and analysis behind the stored reading
    pub fn record_evaluation(&self, now_ms: i64) -> Option<(ExtractedFeatures, StressAnalysis)> {
        let (features, analysis) = self.score(now_ms)?;
        let mut ring = self.history.lock();
        if !self.is_active() {
            log::debug!("discarding reading computed after stop");
            return None;
        }
        ring.append(StressReading::from_analysis(now_ms, &analysis, &features.raw));
        Some((features, analysis))
    }

    /// Features and analysis at `now_ms` without touching history
    pub fn evaluate(&self, now_ms: i64) -> Option<(ExtractedFeatures, StressAnalysis)> {
        self.score(now_ms)
    }

    /// Append a self-reported mood score (0-100, clamped)
    ///
    /// The raw fields carry the current interaction statistics so the
    /// reading lines up with sensed readings.
    pub fn log_mood(&self, score: u8, now_ms: i64) -> StressReading {
        let score = score.min(100);
        let raw: RawFeatures = self.aggregator.extract(now_ms).raw;
        let reading = StressReading {
            timestamp: now_ms,
            score,
            level: self.scorer.classify(f64::from(score) / 100.0),
            typing_speed: raw.typing_speed,
            backspace_ratio: raw.backspace_ratio,
            touch_pressure: raw.touch_pressure,
        };
        self.history.append(reading);
        reading
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn history_summary_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> HistorySummary {
        self.history.summary_at(now)
    }

    /// Replace the in-memory history with what the store holds
    pub fn load_history(&self, store: &dyn KeyValueStore) {
        let ring = HistoryRing::load(store, self.config.history.clone());
        log::debug!("loaded {} stress readings", ring.len());
        self.history.replace(ring);
    }

    pub fn save_history(&self, store: &mut dyn KeyValueStore) -> Result<(), StressError> {
        self.history.snapshot().save(store)
    }

    /// Drop aggregated samples and restart the session clock
    pub fn clear(&self, now_ms: i64) {
        self.aggregator.clear(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryStore;
    use crate::config::LevelThresholds;
    use crate::types::{FeatureSource, PredictionSource, StressLevel};
    use chrono::Utc;
    use std::sync::Arc;
    use std::thread;

    const LETTER_A: u32 = 29;

    fn session() -> MonitoringSession {
        MonitoringSession::with_defaults(0)
    }

    #[test]
    fn test_new_session_is_active() {
        let session = session();
        assert!(session.is_active());
        assert_ne!(session.id(), MonitoringSession::with_defaults(0).id());
    }

    #[test]
    fn test_analyze_uses_heuristic() {
        let session = session();
        let analysis = session.analyze(60_000).unwrap();
        assert_eq!(analysis.source, PredictionSource::Heuristic);
        assert!((0.0..=1.0).contains(&analysis.probability));
        assert!(analysis.score <= 100);
        // analyze alone never persists
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_stopped_session_ignores_input() {
        let session = session();
        session.stop();
        for i in 0..20 {
            session.record_key_down(LETTER_A, i * 100);
        }
        session.record_touch(TouchPhase::Down, Point::new(0.0, 0.0), 0.9, 500);
        assert!(!session.set_global_metrics(5.0, 0.1, 2.0, 500));

        assert_eq!(session.snapshot(5_000).total_key_presses, 0);
        assert_eq!(session.analyze(5_000), None);
        assert_eq!(session.record_reading(5_000), None);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_restart_resumes_recording() {
        let session = session();
        session.stop();
        session.record_key_down(LETTER_A, 100);
        session.start();
        session.record_key_down(LETTER_A, 200);
        assert_eq!(session.snapshot(1_000).total_key_presses, 1);
        assert!(session.analyze(1_000).is_some());
    }

    #[test]
    fn test_record_reading_stores_raw_values() {
        let session = session();
        for i in 0..11 {
            session.record_key_down(LETTER_A, 1_000 + i * 100);
        }
        session.record_touch(TouchPhase::Down, Point::new(0.0, 0.0), 0.7, 2_000);

        let reading = session.record_reading(60_000).unwrap();
        assert_eq!(reading.timestamp, 60_000);
        assert!((reading.typing_speed - 11.0).abs() < 1e-9);
        assert_eq!(reading.backspace_ratio, 0.0);
        assert!((reading.touch_pressure - 0.7).abs() < 1e-12);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_overlay_reading_reports_overlay_values() {
        let session = session();
        assert!(session.set_global_metrics(7.0, 0.3, 2.5, 10_000));
        let features = session.aggregator().extract(20_000);
        assert_eq!(features.raw.source, FeatureSource::Overlay);

        let reading = session.record_reading(20_000).unwrap();
        assert_eq!(reading.typing_speed, 7.0);
        assert_eq!(reading.backspace_ratio, 0.3);
        assert!((reading.touch_pressure - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_log_mood() {
        let session = session();
        let calm = session.log_mood(20, 1_000);
        assert_eq!(calm.level, StressLevel::Low);
        let tense = session.log_mood(250, 2_000);
        assert_eq!(tense.score, 100);
        assert_eq!(tense.level, StressLevel::High);
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_log_mood_uses_scorer_thresholds() {
        let mut scorer_config = StressConfig::default();
        scorer_config.thresholds = LevelThresholds {
            low_max: 0.5,
            medium_max: 0.8,
        };
        let session = MonitoringSession::new(
            StressConfig::default(),
            StressScorer::heuristic_only(&scorer_config),
            0,
        );
        assert_eq!(session.log_mood(40, 1_000).level, StressLevel::Low);
        assert_eq!(session.log_mood(70, 2_000).level, StressLevel::Medium);
    }

    #[test]
    fn test_history_persists_through_store() {
        let mut store = MemoryStore::new();
        let first = session();
        first.log_mood(40, 1_000);
        first.log_mood(60, 2_000);
        first.save_history(&mut store).unwrap();

        let second = session();
        second.load_history(&store);
        assert_eq!(second.history().snapshot(), first.history().snapshot());

        let now = Utc.with_ymd_and_hms(1970, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(second.history_summary_at(&now).today_average_score, 50);
    }

    #[test]
    fn test_clear_restarts_session_clock() {
        let session = session();
        session.record_key_down(LETTER_A, 100);
        session.clear(30_000);
        let snapshot = session.snapshot(45_000);
        assert_eq!(snapshot.total_key_presses, 0);
        assert_eq!(snapshot.session_length_secs, 15.0);
    }

    #[test]
    fn test_stop_from_another_thread() {
        let session = Arc::new(session());
        let stopper = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.stop())
        };
        stopper.join().unwrap();
        assert!(!session.is_active());
        assert_eq!(session.analyze(1_000), None);
    }

    #[test]
    fn test_no_reading_lands_after_stop_returns() {
        let session = Arc::new(session());
        let recorder = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                let mut now = 1_000;
                while session.record_reading(now).is_some() {
                    now += 1_000;
                }
            })
        };
        thread::sleep(std::time::Duration::from_millis(5));
        session.stop();
        let len_at_stop = session.history().len();
        recorder.join().unwrap();
        assert_eq!(session.history().len(), len_at_stop);
    }
}
