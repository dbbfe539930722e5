//! Cadence aggregation over raw stride-rate observations

/// Number of raw observations averaged into one cadence value
pub const CADENCE_WINDOW: usize = 20;

/// Averages raw stride-rate observations into a cadence, once per window
///
/// Absent observations count as zero, so a run of failed detections pulls the
/// cadence toward zero instead of being skipped. Between emissions the last
/// emitted value is held.
#[derive(Debug, Clone)]
pub struct CadenceAggregator {
    window: usize,
    pending: Vec<f32>,
    current: Option<f32>,
    emitted: u64,
}

impl Default for CadenceAggregator {
    fn default() -> Self {
        Self::new(CADENCE_WINDOW)
    }
}

impl CadenceAggregator {
    /// Aggregator emitting every `window` observations (minimum 1)
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            pending: Vec::with_capacity(window),
            current: None,
            emitted: 0,
        }
    }

    /// Record one observation; returns the new cadence when one is emitted
    pub fn push(&mut self, observation: Option<f32>) -> Option<f32> {
        self.pending.push(observation.unwrap_or(0.0));
        if self.pending.len() < self.window {
            return None;
        }

        let recent = &self.pending[self.pending.len() - self.window..];
        let cadence = recent.iter().sum::<f32>() / self.window as f32;
        self.pending.clear();
        self.current = Some(cadence);
        self.emitted += 1;
        Some(cadence)
    }

    /// Last emitted cadence (steps/minute)
    pub fn current(&self) -> Option<f32> {
        self.current
    }

    /// Observations collected since the last emission
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of cadence values emitted so far
    pub fn emissions(&self) -> u64 {
        self.emitted
    }
}
