//! Pure statistics over aggregator buffers

use std::collections::VecDeque;

/// Key presses per second across the retained timestamps
///
/// Formula: `count / (last - first) * 1000`. Returns 0 with fewer than two
/// timestamps or a non-positive span.
pub fn typing_speed(timestamps: &VecDeque<i64>) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }
    let (Some(first), Some(last)) = (timestamps.front(), timestamps.back()) else {
        return 0.0;
    };
    let span_ms = last - first;
    if span_ms <= 0 {
        return 0.0;
    }
    timestamps.len() as f64 / span_ms as f64 * 1000.0
}

/// Corrections per key press, 0 when nothing was pressed
pub fn backspace_ratio(errors: u64, presses: u64) -> f64 {
    if presses == 0 {
        return 0.0;
    }
    errors as f64 / presses as f64
}

/// Arithmetic mean, `None` for an empty input
pub fn mean<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Population variance, 0 with fewer than two samples
pub fn variance<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let n = iter.clone().count();
    if n < 2 {
        return 0.0;
    }
    let mean = iter.clone().sum::<f64>() / n as f64;
    iter.map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64
}

/// Events per minute given a count observed over `window_ms`
pub fn per_minute(count: usize, window_ms: i64) -> f64 {
    if window_ms <= 0 {
        return 0.0;
    }
    count as f64 / (window_ms as f64 / 60_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typing_speed_evenly_spaced() {
        // n presses spaced 200ms apart: span = (n-1)*200
        for n in 2..20i64 {
            let timestamps: VecDeque<i64> = (0..n).map(|i| 1_000 + i * 200).collect();
            let expected = n as f64 / ((n - 1) * 200) as f64 * 1000.0;
            assert!((typing_speed(&timestamps) - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_typing_speed_degenerate() {
        assert_eq!(typing_speed(&VecDeque::new()), 0.0);
        assert_eq!(typing_speed(&VecDeque::from(vec![5])), 0.0);
        // zero span
        assert_eq!(typing_speed(&VecDeque::from(vec![5, 5, 5])), 0.0);
    }

    #[test]
    fn test_backspace_ratio() {
        assert_eq!(backspace_ratio(0, 0), 0.0);
        assert_eq!(backspace_ratio(1, 4), 0.25);
        assert_eq!(backspace_ratio(4, 4), 1.0);
    }

    #[test]
    fn test_mean_and_variance() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(values.iter()), Some(5.0));
        assert!((variance(values.iter()) - 4.0).abs() < 1e-12);

        assert_eq!(mean(std::iter::empty::<&f64>()), None);
        assert_eq!(variance([3.0].iter()), 0.0);
    }

    #[test]
    fn test_per_minute() {
        assert_eq!(per_minute(10, 60_000), 10.0);
        assert_eq!(per_minute(10, 30_000), 20.0);
        assert_eq!(per_minute(10, 0), 0.0);
    }
}
