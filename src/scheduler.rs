//! Polling timers for a monitoring session
//!
//! Two tokio tasks drive one [`MonitoringSession`]:
//! - foreground polling: a display-only analysis every few seconds
//! - background recalculation: an analysis appended to history every hour
//!
//! Both share one cancellation token; [`MonitorHandle::shutdown`] stops the
//! session first so that any cycle already in flight discards its result.

use crate::config::MonitorConfig;
use crate::session::MonitoringSession;
use crate::types::{now_millis, StressAnalysis, StressReading};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Result published by one of the timers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorUpdate {
    Foreground(StressAnalysis),
    Background(StressReading),
}

/// Running timers; drop without `shutdown` leaves them running until the
/// receiver goes away
pub struct MonitorHandle {
    session: Arc<MonitoringSession>,
    cancel_token: CancellationToken,
    foreground: JoinHandle<()>,
    background: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }

    /// Stop recording, cancel both timers and wait for them to exit
    pub async fn shutdown(self) {
        self.session.stop();
        self.cancel_token.cancel();

        for (name, handle) in [("foreground", self.foreground), ("background", self.background)] {
            if let Err(e) = handle.await {
                log::warn!("{name} monitor task failed to join: {e}");
            }
        }
        log::info!("stress monitor shut down (session {})", self.session.id());
    }
}

/// Start the foreground and background timers for `session`
///
/// Must be called from within a tokio runtime.
pub fn spawn_monitor(
    session: Arc<MonitoringSession>,
    config: &MonitorConfig,
    updates_tx: UnboundedSender<MonitorUpdate>,
) -> MonitorHandle {
    let cancel_token = CancellationToken::new();

    let foreground = tokio::spawn(foreground_loop(
        Arc::clone(&session),
        Duration::from_millis(config.foreground_interval_ms.max(1)),
        updates_tx.clone(),
        cancel_token.clone(),
    ));
    let background = tokio::spawn(background_loop(
        Arc::clone(&session),
        Duration::from_millis(config.background_interval_ms.max(1)),
        updates_tx,
        cancel_token.clone(),
    ));

    log::info!(
        "stress monitor started (session {}, foreground {}ms, background {}ms)",
        session.id(),
        config.foreground_interval_ms,
        config.background_interval_ms
    );

    MonitorHandle {
        session,
        cancel_token,
        foreground,
        background,
    }
}

async fn foreground_loop(
    session: Arc<MonitoringSession>,
    period: Duration,
    updates_tx: UnboundedSender<MonitorUpdate>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(analysis) = session.analyze(now_millis()) else {
                    continue;
                };
                if cancel_token.is_cancelled() {
                    break;
                }
                if updates_tx.send(MonitorUpdate::Foreground(analysis)).is_err() {
                    log::debug!("foreground receiver dropped; stopping");
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log::debug!("foreground monitor shutting down");
                break;
            }
        }
    }
}

async fn background_loop(
    session: Arc<MonitoringSession>,
    period: Duration,
    updates_tx: UnboundedSender<MonitorUpdate>,
    cancel_token: CancellationToken,
) {
    // first recalculation one full period after start
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if cancel_token.is_cancelled() {
                    break;
                }
                let Some(reading) = session.record_reading(now_millis()) else {
                    continue;
                };
                log::debug!("background stress reading: score {}", reading.score);
                if updates_tx.send(MonitorUpdate::Background(reading)).is_err() {
                    log::debug!("background receiver dropped; stopping");
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log::debug!("background monitor shutting down");
                break;
            }
        }
    }
}
