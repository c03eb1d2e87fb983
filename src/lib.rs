//! calmtrace - On-device stress scoring from interaction signals
//!
//! Typing cadence, touch pressure, app switching and accelerometer jitter are
//! aggregated into rolling statistics, normalized into a 4-feature vector and
//! scored by a small learned model or a deterministic fallback formula. Scores
//! are kept in a capped history ring that yields today's average, hourly
//! buckets and a trend.
//!
//! ## Modules
//!
//! - **Aggregator**: bounded rolling buffers and the global-metric overlay
//! - **Scorer**: model inference with heuristic fallback, level and score mapping
//! - **History**: capped reading log, aggregates and persistence
//! - **Session**: one aggregator, scorer and history behind an active flag
//! - **Scheduler**: foreground and background polling timers (`runtime` feature)
//! - **Pipeline**: replay of recorded event streams

pub mod aggregator;
pub mod config;
pub mod error;
pub mod history;
pub mod normalizer;
pub mod pipeline;
#[cfg(feature = "runtime")]
pub mod scheduler;
pub mod scorer;
pub mod session;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregator::{FeatureAggregator, SharedAggregator};
pub use config::StressConfig;
pub use error::StressError;
pub use history::{HistoryRing, HistorySummary, SharedHistory};
pub use pipeline::{events_to_analyses, ReplayProcessor};
pub use scorer::{score_from_probability, StressScorer};
pub use session::MonitoringSession;
pub use types::{FeatureVector, InputEvent, StressAnalysis, StressLevel, StressReading, TrendDirection};

#[cfg(feature = "runtime")]
pub use scheduler::{spawn_monitor, MonitorHandle, MonitorUpdate};

/// Library version
pub const CALMTRACE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by diagnostics
pub const PRODUCER_NAME: &str = "calmtrace";
