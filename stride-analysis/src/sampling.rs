//! Sampling rate estimation from sample arrival times

use std::time::Instant;

/// Rate assumed when there is not enough arrival history (Hz)
pub const DEFAULT_SAMPLING_RATE_HZ: f64 = 50.0;

/// Estimate the sampling rate (Hz) from ordered arrival timestamps
///
/// Averages the consecutive arrival deltas and inverts the mean. Returns `None`
/// with fewer than two timestamps or when the timestamps do not advance.
pub fn estimate_sampling_rate<'a, I>(timestamps: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a Instant>,
{
    let mut iter = timestamps.into_iter();
    let mut previous = *iter.next()?;
    let mut total = 0.0f64;
    let mut count = 0usize;

    for &current in iter {
        total += current.saturating_duration_since(previous).as_secs_f64();
        count += 1;
        previous = current;
    }

    if count == 0 {
        return None;
    }

    let mean_delta = total / count as f64;
    if mean_delta > 0.0 {
        Some(1.0 / mean_delta)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stamps(offsets_ms: &[u64]) -> Vec<Instant> {
        let base = Instant::now();
        offsets_ms
            .iter()
            .map(|&ms| base + Duration::from_millis(ms))
            .collect()
    }

    #[test]
    fn test_needs_two_timestamps() {
        let empty: Vec<Instant> = Vec::new();
        assert_eq!(estimate_sampling_rate(&empty), None);
        assert_eq!(estimate_sampling_rate(&stamps(&[0])), None);
    }

    #[test]
    fn test_regular_arrivals() {
        let ts = stamps(&[0, 20, 40, 60, 80]);
        let rate = estimate_sampling_rate(&ts).unwrap();
        assert!((rate - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_irregular_arrivals_use_mean_delta() {
        // Deltas 10ms and 30ms average to 20ms
        let ts = stamps(&[0, 10, 40]);
        let rate = estimate_sampling_rate(&ts).unwrap();
        assert!((rate - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_stalled_clock_is_absent() {
        let ts = stamps(&[5, 5, 5]);
        assert_eq!(estimate_sampling_rate(&ts), None);
    }
}
