//! Stress reading history
//!
//! A capped FIFO log of past readings plus the aggregates derived from it:
//! today's average, hourly buckets and the trend direction. The ring is
//! persisted as a JSON array of reading records under a single store key.

pub mod store;

use crate::config::HistoryConfig;
use crate::error::StressError;
use crate::types::{StressReading, TrendDirection};
use chrono::{DateTime, Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use store::{FileStore, KeyValueStore, MemoryStore, HISTORY_KEY};

const MAX_SCORE: u8 = 100;

/// Aggregates for insight consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub reading_count: usize,
    pub latest: Option<StressReading>,
    pub today_average_score: u32,
    /// `(local hour, mean score)` sorted by hour
    pub hourly_averages: Vec<(u32, f64)>,
    pub trend: TrendDirection,
}

/// Append-only capped log of stress readings
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRing {
    readings: VecDeque<StressReading>,
    capacity: usize,
    trend_delta: f64,
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl HistoryRing {
    pub fn new(config: HistoryConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity + 1),
            capacity,
            trend_delta: config.trend_delta,
        }
    }

    /// Append a reading, evicting the oldest entries once over capacity
    pub fn append(&mut self, reading: StressReading) {
        self.readings.push_back(reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Readings oldest first
    pub fn readings(&self) -> impl Iterator<Item = &StressReading> {
        self.readings.iter()
    }

    pub fn latest(&self) -> Option<&StressReading> {
        self.readings.back()
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Readings taken since local midnight of `now`'s day
    pub fn today_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<StressReading> {
        let start_ms = start_of_day_ms(now);
        self.readings
            .iter()
            .filter(|r| r.timestamp >= start_ms)
            .copied()
            .collect()
    }

    pub fn today(&self) -> Vec<StressReading> {
        self.today_at(&Local::now())
    }

    /// Floor of the mean of today's scores, 0 without readings
    pub fn today_average_score_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> u32 {
        let today = self.today_at(now);
        if today.is_empty() {
            return 0;
        }
        let total: u32 = today.iter().map(|r| u32::from(r.score)).sum();
        total / today.len() as u32
    }

    pub fn today_average_score(&self) -> u32 {
        self.today_average_score_at(&Local::now())
    }

    /// Mean score per local hour of today, sorted by hour
    pub fn hourly_averages_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<(u32, f64)> {
        let tz = now.timezone();
        let mut buckets: BTreeMap<u32, (u32, u32)> = BTreeMap::new();
        for reading in self.today_at(now) {
            let Some(local) = tz.timestamp_millis_opt(reading.timestamp).single() else {
                continue;
            };
            let bucket = buckets.entry(local.hour()).or_insert((0, 0));
            bucket.0 += u32::from(reading.score);
            bucket.1 += 1;
        }
        buckets
            .into_iter()
            .map(|(hour, (sum, count))| (hour, f64::from(sum) / f64::from(count)))
            .collect()
    }

    pub fn hourly_averages(&self) -> Vec<(u32, f64)> {
        self.hourly_averages_at(&Local::now())
    }

    /// Compare the mean score of the newer half of the history against the
    /// older half
    ///
    /// A drop of more than `trend_delta` is `Improving` (lower score means
    /// less stress), a rise of more than `trend_delta` is `Worsening`.
    pub fn trend(&self) -> TrendDirection {
        if self.readings.len() < 2 {
            return TrendDirection::Stable;
        }
        let mid = self.readings.len() / 2;
        let older = mean_score(self.readings.range(..mid));
        let newer = mean_score(self.readings.range(mid..));
        let delta = newer - older;

        if delta < -self.trend_delta {
            TrendDirection::Improving
        } else if delta > self.trend_delta {
            TrendDirection::Worsening
        } else {
            TrendDirection::Stable
        }
    }

    pub fn summary_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> HistorySummary {
        HistorySummary {
            reading_count: self.len(),
            latest: self.latest().copied(),
            today_average_score: self.today_average_score_at(now),
            hourly_averages: self.hourly_averages_at(now),
            trend: self.trend(),
        }
    }

    pub fn summary(&self) -> HistorySummary {
        self.summary_at(&Local::now())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize as an ordered array of reading records
    pub fn to_json(&self) -> Result<String, StressError> {
        Ok(serde_json::to_string(&self.readings)?)
    }

    /// Strict load; over-capacity input keeps the newest readings
    ///
    /// A record scored above 100 fails the whole load.
    pub fn try_from_json(json: &str, config: HistoryConfig) -> Result<Self, StressError> {
        let readings: Vec<StressReading> = serde_json::from_str(json)?;
        if let Some((index, bad)) = readings
            .iter()
            .enumerate()
            .find(|(_, r)| r.score > MAX_SCORE)
        {
            return Err(StressError::ParseError(format!(
                "record {index}: score {} is out of range",
                bad.score
            )));
        }
        let mut ring = Self::new(config);
        for reading in readings {
            ring.append(reading);
        }
        Ok(ring)
    }

    /// Load that treats malformed input as an empty history
    pub fn from_json_lenient(json: &str, config: HistoryConfig) -> Self {
        match Self::try_from_json(json, config.clone()) {
            Ok(ring) => ring,
            Err(e) => {
                log::warn!("discarding unreadable stress history: {e}");
                Self::new(config)
            }
        }
    }

    /// Load from a store; absent or corrupt data yields an empty ring
    pub fn load(store: &dyn KeyValueStore, config: HistoryConfig) -> Self {
        match store.get(HISTORY_KEY) {
            Ok(Some(json)) => Self::from_json_lenient(&json, config),
            Ok(None) => Self::new(config),
            Err(e) => {
                log::warn!("stress history store unreadable: {e}");
                Self::new(config)
            }
        }
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<(), StressError> {
        store.put(HISTORY_KEY, self.to_json()?)
    }
}

fn mean_score<'a>(readings: impl Iterator<Item = &'a StressReading>) -> f64 {
    let (sum, count) = readings.fold((0u64, 0u64), |(sum, count), r| {
        (sum + u64::from(r.score), count + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

/// Milliseconds at local midnight of `now`'s day
fn start_of_day_ms<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let midnight = now.date_naive().and_hms_opt(0, 0, 0);
    midnight
        .and_then(|m| now.timezone().from_local_datetime(&m).earliest())
        .map(|dt| dt.timestamp_millis())
        // midnight skipped by a DST jump: fall back to 24h before now
        .unwrap_or_else(|| now.timestamp_millis() - 86_400_000)
}

/// Thread-safe history handle; clones share the same ring
#[derive(Debug, Clone, Default)]
pub struct SharedHistory {
    inner: Arc<Mutex<HistoryRing>>,
}

impl SharedHistory {
    pub fn new(ring: HistoryRing) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ring)),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HistoryRing> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, reading: StressReading) {
        self.lock().append(reading);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current ring
    pub fn snapshot(&self) -> HistoryRing {
        self.lock().clone()
    }

    pub fn replace(&self, ring: HistoryRing) {
        *self.lock() = ring;
    }

    pub fn trend(&self) -> TrendDirection {
        self.lock().trend()
    }

    pub fn summary_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> HistorySummary {
        self.lock().summary_at(now)
    }

    pub fn to_json(&self) -> Result<String, StressError> {
        self.lock().to_json()
    }
}
