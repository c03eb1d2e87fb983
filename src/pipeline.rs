//! Event replay
//!
//! Feeds a recorded stream of [`InputEvent`]s through a fresh monitoring
//! session. Used by the CLI, the demo and tests to reproduce a scoring run
//! offline.
//!
//! Input is either a JSON array of events or newline-delimited JSON (one
//! event per line, blank lines ignored).

use crate::config::StressConfig;
use crate::error::StressError;
use crate::history::{HistoryRing, HistorySummary};
use crate::scorer::StressScorer;
use crate::session::MonitoringSession;
use crate::types::{FeatureVector, InputEvent, Point, RawFeatures, StressAnalysis, StressReading};
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// One scoring cycle produced during replay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayAnalysis {
    pub timestamp_ms: i64,
    #[serde(flatten)]
    pub analysis: StressAnalysis,
    pub features: RawFeatures,
    pub vector: FeatureVector,
}

/// Parse a JSON array or NDJSON event stream
pub fn parse_events(input: &str) -> Result<Vec<InputEvent>, StressError> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| StressError::ParseError(format!("line {}: {e}", i + 1)))
        })
        .collect()
}

/// Replay a recorded event stream (stateless, one-shot)
///
/// Returns a JSON array of analyses, one per `analyze` event. A stream
/// without any `analyze` event yields a single analysis taken at the final
/// event's timestamp.
///
/// # Example
/// ```ignore
/// let analyses_json = events_to_analyses(events_json)?;
/// ```
pub fn events_to_analyses(events_json: String) -> Result<String, StressError> {
    let events = parse_events(&events_json)?;
    let mut processor = ReplayProcessor::default();
    let mut analyses = processor.process_all(&events)?;

    if analyses.is_empty() {
        if let Some(last) = events.last() {
            analyses.extend(processor.analyze_at(last.timestamp_ms()));
        }
    }
    Ok(serde_json::to_string(&analyses)?)
}

/// Stateful replay over one monitoring session
///
/// The session clock starts at the first event's timestamp. Events must be
/// in non-decreasing timestamp order.
pub struct ReplayProcessor {
    config: StressConfig,
    scorer: StressScorer,
    session: Option<MonitoringSession>,
    seed_history: Option<HistoryRing>,
    last_timestamp_ms: Option<i64>,
}

impl Default for ReplayProcessor {
    fn default() -> Self {
        let config = StressConfig::default();
        let scorer = StressScorer::heuristic_only(&config);
        Self::new(config, scorer)
    }
}

impl ReplayProcessor {
    pub fn new(config: StressConfig, scorer: StressScorer) -> Self {
        Self {
            config,
            scorer,
            session: None,
            seed_history: None,
            last_timestamp_ms: None,
        }
    }

    /// Seed the history ring before replaying (e.g. from a store)
    pub fn with_history(mut self, ring: HistoryRing) -> Self {
        self.seed_history = Some(ring);
        self
    }

    fn session_at(&mut self, now_ms: i64) -> &MonitoringSession {
        let Self {
            config,
            scorer,
            session,
            seed_history,
            ..
        } = self;
        session.get_or_insert_with(|| {
            let session = MonitoringSession::new(config.clone(), scorer.clone(), now_ms);
            if let Some(ring) = seed_history.take() {
                session.history().replace(ring);
            }
            session
        })
    }

    /// Apply one event; `analyze` events return the resulting analysis
    pub fn process(&mut self, event: &InputEvent) -> Result<Option<ReplayAnalysis>, StressError> {
        let now_ms = event.timestamp_ms();
        if let Some(previous) = self.last_timestamp_ms {
            if now_ms < previous {
                return Err(StressError::InvalidEvent(format!(
                    "event at {now_ms} precedes previous event at {previous}"
                )));
            }
        }
        self.last_timestamp_ms = Some(now_ms);

        let session = self.session_at(now_ms);
        match *event {
            InputEvent::KeyDown { key_code, .. } => session.record_key_down(key_code, now_ms),
            InputEvent::KeyUp { .. } => session.record_key_up(now_ms),
            InputEvent::Touch {
                phase, x, y, pressure, ..
            } => session.record_touch(phase, Point::new(x, y), pressure, now_ms),
            InputEvent::Accelerometer { x, y, z, .. } => session.record_accelerometer(x, y, z, now_ms),
            InputEvent::AppSwitch { .. } => session.record_app_switch(now_ms),
            InputEvent::GlobalMetrics {
                typing_speed,
                error_rate,
                scroll_rate,
                ..
            } => {
                if !session.set_global_metrics(typing_speed, error_rate, scroll_rate, now_ms) {
                    log::debug!("replay: global metrics at {now_ms} ignored");
                }
            }
            InputEvent::Mood { score, .. } => {
                session.log_mood(score, now_ms);
            }
            InputEvent::Analyze { .. } => {
                return Ok(session
                    .record_evaluation(now_ms)
                    .map(|(features, analysis)| ReplayAnalysis {
                        timestamp_ms: now_ms,
                        analysis,
                        features: features.raw,
                        vector: features.vector,
                    }));
            }
        }
        Ok(None)
    }

    /// Apply a batch of events, collecting the analyses they produce
    pub fn process_all(&mut self, events: &[InputEvent]) -> Result<Vec<ReplayAnalysis>, StressError> {
        let mut analyses = Vec::new();
        for event in events {
            if let Some(analysis) = self.process(event)? {
                analyses.push(analysis);
            }
        }
        Ok(analyses)
    }

    /// Score the current state without appending to history
    pub fn analyze_at(&mut self, now_ms: i64) -> Option<ReplayAnalysis> {
        let (features, analysis) = self.session_at(now_ms).evaluate(now_ms)?;
        Some(ReplayAnalysis {
            timestamp_ms: now_ms,
            analysis,
            features: features.raw,
            vector: features.vector,
        })
    }

    pub fn session(&self) -> Option<&MonitoringSession> {
        self.session.as_ref()
    }

    /// Readings appended so far, oldest first
    pub fn readings(&self) -> Vec<StressReading> {
        self.session
            .as_ref()
            .map(|s| s.history().snapshot().readings().copied().collect())
            .unwrap_or_default()
    }

    pub fn history_summary_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> HistorySummary {
        match &self.session {
            Some(session) => session.history_summary_at(now),
            None => HistoryRing::new(self.config.history.clone()).summary_at(now),
        }
    }

    /// Forget the session and its history
    pub fn reset(&mut self) {
        self.session = None;
        self.last_timestamp_ms = None;
    }
}
