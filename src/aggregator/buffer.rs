//! Bounded sample buffers
//!
//! Two retention policies are used by the aggregator: count-capped buffers that
//! drop their oldest half once over capacity, and time windows that drop
//! entries older than a fixed span.

use std::collections::VecDeque;

/// Scalar buffer that discards its oldest half once it grows past `cap`
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<f64>,
    cap: usize,
}

impl SampleBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap + 1),
            cap,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.samples.push_back(value);
        if self.samples.len() > self.cap {
            let drop = self.samples.len() / 2;
            self.samples.drain(..drop);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, f64> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Event timestamps retained for a trailing time span
#[derive(Debug, Clone)]
pub struct TimeWindow {
    timestamps: VecDeque<i64>,
    span_ms: i64,
}

impl TimeWindow {
    pub fn new(span_ms: i64) -> Self {
        Self {
            timestamps: VecDeque::new(),
            span_ms,
        }
    }

    /// Append `now_ms` and prune entries older than the span
    pub fn record(&mut self, now_ms: i64) {
        self.timestamps.push_back(now_ms);
        self.prune(now_ms);
    }

    pub fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.span_ms;
        while let Some(&oldest) = self.timestamps.front() {
            if oldest < cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Entries no older than the span as seen from `now_ms`, without pruning
    pub fn count_since(&self, now_ms: i64) -> usize {
        let cutoff = now_ms - self.span_ms;
        self.timestamps.iter().filter(|&&t| t >= cutoff).count()
    }

    pub fn timestamps(&self) -> &VecDeque<i64> {
        &self.timestamps
    }

    pub fn span_ms(&self) -> i64 {
        self.span_ms
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_drops_oldest_half() {
        let mut buffer = SampleBuffer::new(4);
        for i in 0..5 {
            buffer.push(i as f64);
        }
        // 5 entries exceed the cap of 4, so the oldest 2 are dropped
        let kept: Vec<f64> = buffer.iter().copied().collect();
        assert_eq!(kept, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sample_buffer_never_exceeds_cap() {
        let mut buffer = SampleBuffer::new(500);
        for i in 0..10_000 {
            buffer.push(i as f64);
            assert!(buffer.len() <= 500);
        }
        // newest sample always survives truncation
        assert_eq!(buffer.iter().last().copied(), Some(9_999.0));
    }

    #[test]
    fn test_time_window_prunes_by_age() {
        let mut window = TimeWindow::new(60_000);
        window.record(0);
        window.record(30_000);
        window.record(60_000);
        assert_eq!(window.len(), 3);

        window.record(90_001);
        // 0 and 30_000 are older than 90_001 - 60_000
        assert_eq!(window.timestamps().iter().copied().collect::<Vec<_>>(), vec![60_000, 90_001]);
    }

    #[test]
    fn test_count_since_does_not_mutate() {
        let mut window = TimeWindow::new(1_000);
        window.record(0);
        window.record(500);
        assert_eq!(window.count_since(1_200), 1);
        assert_eq!(window.len(), 2);
    }
}
