//! Stride peak detection and stride rate estimation

/// Fewer filtered samples than this never yield a stride rate
pub const MIN_STRIDE_SAMPLES: usize = 10;
/// Minimum filtered height for a peak to count as a footfall
pub const MIN_PEAK_HEIGHT: f64 = 6.0;
/// Minimum separation between accepted peaks, in samples
pub const MIN_PEAK_DISTANCE: usize = 5;
/// Number of most recent peaks used for the stride period
pub const PEAKS_CONSIDERED: usize = 5;
/// Plausibility floor for stride rate (strides/minute)
pub const DEFAULT_STRIDE_FLOOR: f32 = 30.0;
/// Stricter floor used by the live pipeline to reject standing still
pub const LIVE_STRIDE_FLOOR: f32 = 50.0;

/// Finds footfall peaks in a filtered magnitude signal
#[derive(Debug, Clone)]
pub struct PeakDetector {
    min_height: f64,
    min_distance: usize,
    stride_floor: f32,
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PeakDetector {
    pub fn new() -> Self {
        Self::with_floor(DEFAULT_STRIDE_FLOOR)
    }

    /// Detector rejecting rates below `stride_floor` strides/minute
    pub fn with_floor(stride_floor: f32) -> Self {
        Self {
            min_height: MIN_PEAK_HEIGHT,
            min_distance: MIN_PEAK_DISTANCE,
            stride_floor,
        }
    }

    pub fn stride_floor(&self) -> f32 {
        self.stride_floor
    }

    /// Indices of accepted peaks, in ascending order
    pub fn find_peaks(&self, signal: &[f64]) -> Vec<usize> {
        let candidates: Vec<usize> = local_maxima(signal)
            .into_iter()
            .filter(|&i| signal[i] >= self.min_height)
            .collect();
        select_by_distance(&candidates, signal, self.min_distance)
    }

    /// Stride rate (strides/minute) from the most recent peaks
    ///
    /// `None` when the signal is too short, fewer than two peaks are found, or
    /// the rate falls below the plausibility floor.
    pub fn stride_rate(&self, filtered: &[f64], sampling_rate: f64) -> Option<f32> {
        if filtered.len() < MIN_STRIDE_SAMPLES || !(sampling_rate > 0.0) {
            return None;
        }

        let peaks = self.find_peaks(filtered);
        if peaks.len() < 2 {
            return None;
        }

        let recent = &peaks[peaks.len().saturating_sub(PEAKS_CONSIDERED)..];
        let intervals = recent.len() - 1;
        let mean_period = recent
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 / sampling_rate)
            .sum::<f64>()
            / intervals as f64;

        if mean_period <= 0.0 {
            return None;
        }

        let rate = (60.0 / mean_period) as f32;
        if rate < self.stride_floor {
            None
        } else {
            Some(rate)
        }
    }
}

/// Strict local maxima; a flat top counts once, at its middle sample
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }

    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    peaks
}

/// Drop peaks closer than `distance` to a higher one
fn select_by_distance(peaks: &[usize], x: &[f64], distance: usize) -> Vec<usize> {
    if peaks.len() < 2 || distance <= 1 {
        return peaks.to_vec();
    }

    let mut keep = vec![true; peaks.len()];
    let mut by_height: Vec<usize> = (0..peaks.len()).collect();
    by_height.sort_by(|&a, &b| x[peaks[b]].total_cmp(&x[peaks[a]]));

    for &j in &by_height {
        if !keep[j] {
            continue;
        }

        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }

        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, kept)| kept.then_some(p))
        .collect()
}
