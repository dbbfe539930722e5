//! Heart-rate baseline: resting rate, warmed rate and workout target

use stride_analysis::RingWindow;

/// Resting heart rate assumed until one is measured (bpm)
pub const DEFAULT_RESTING_HR: f32 = 60.0;
/// Heart rate after warming up (bpm)
pub const DEFAULT_WARMED_HR: f32 = 120.0;
/// Heart-rate samples averaged into the resting rate
pub const RESTING_WINDOW: usize = 5;
/// Target sits this many deltas above resting
const TARGET_FACTOR: f32 = 1.5;

/// Resting/warmed heart rates and the derived workout target
///
/// `delta` and `target_hr` are always derived from the `resting_hr` stored
/// alongside them; build new values with [`HrBaseline::with_resting`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HrBaseline {
    resting_hr: f32,
    warmed_hr: f32,
    delta: f32,
    target_hr: f32,
}

impl Default for HrBaseline {
    fn default() -> Self {
        Self::new(DEFAULT_RESTING_HR, DEFAULT_WARMED_HR)
    }
}

impl HrBaseline {
    pub fn new(resting_hr: f32, warmed_hr: f32) -> Self {
        let delta = warmed_hr - resting_hr;
        Self {
            resting_hr,
            warmed_hr,
            delta,
            target_hr: resting_hr + TARGET_FACTOR * delta,
        }
    }

    /// Same warmed rate, new resting rate
    pub fn with_resting(&self, resting_hr: f32) -> Self {
        Self::new(resting_hr, self.warmed_hr)
    }

    pub fn resting_hr(&self) -> f32 {
        self.resting_hr
    }

    pub fn warmed_hr(&self) -> f32 {
        self.warmed_hr
    }

    pub fn delta(&self) -> f32 {
        self.delta
    }

    pub fn target_hr(&self) -> f32 {
        self.target_hr
    }
}

/// Trailing window of heart-rate samples collected while resting
#[derive(Debug, Clone)]
pub struct RestingHrTracker {
    window: RingWindow<u32>,
}

impl Default for RestingHrTracker {
    fn default() -> Self {
        Self::new(RESTING_WINDOW)
    }
}

impl RestingHrTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: RingWindow::new(capacity),
        }
    }

    /// Record a sample and return the resting rate over what has been collected
    pub fn push(&mut self, bpm: u32) -> f32 {
        self.window.push(bpm);
        self.mean().unwrap_or(bpm as f32)
    }

    /// Mean of the collected samples, divided by how many there are
    pub fn mean(&self) -> Option<f32> {
        if self.window.is_empty() {
            return None;
        }
        let sum: u64 = self.window.iter().map(|&bpm| bpm as u64).sum();
        Some(sum as f32 / self.window.len() as f32)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Start a fresh collection (on entering Resting)
    pub fn clear(&mut self) {
        self.window.clear();
    }
}
