//! Playback speed from mode, cadence, heart rate and track tempo

use crate::baseline::HrBaseline;
use crate::mode::Mode;

/// Smallest speed ever published
pub const MIN_SPEED: f32 = 0.1;
/// Steps/minute added or removed to nudge the runner
pub const CADENCE_NUDGE: f32 = 5.0;
/// Workout stops nudging faster at this cadence
pub const WORKOUT_CADENCE_CEILING: f32 = 180.0;

/// Bounds applied to every published playback speed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedLimits {
    pub min: f32,
    pub max: Option<f32>,
}

impl Default for SpeedLimits {
    fn default() -> Self {
        Self {
            min: MIN_SPEED,
            max: None,
        }
    }
}

impl SpeedLimits {
    /// Limits with an optional ceiling; a floor at or below zero is raised to `MIN_SPEED`
    pub fn new(min: f32, max: Option<f32>) -> Self {
        let min = if min.is_finite() && min > 0.0 {
            min
        } else {
            MIN_SPEED
        };
        let max = max.filter(|m| m.is_finite() && *m >= min);
        Self { min, max }
    }

    /// Clamp a speed into range; non-finite speeds are dropped
    pub fn apply(&self, speed: f32) -> Option<f32> {
        if !speed.is_finite() {
            return None;
        }
        let speed = speed.max(self.min);
        Some(match self.max {
            Some(max) => speed.min(max),
            None => speed,
        })
    }
}

/// Maps the current readings to a playback speed
#[derive(Debug, Clone, Default)]
pub struct SpeedController {
    limits: SpeedLimits,
}

impl SpeedController {
    pub fn new(limits: SpeedLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> SpeedLimits {
        self.limits
    }

    /// Unclamped speed for the mode
    ///
    /// `None` in Resting, or when cadence or track tempo is missing or not
    /// positive. An unknown heart rate makes every heart-rate condition false.
    pub fn raw_speed(
        mode: Mode,
        cadence: Option<f32>,
        heart_rate: Option<u32>,
        baseline: &HrBaseline,
        track_bpm: Option<f32>,
    ) -> Option<f32> {
        let cadence = cadence.filter(|c| c.is_finite() && *c > 0.0)?;
        let bpm = track_bpm.filter(|b| b.is_finite() && *b > 0.0)?;
        let hr = heart_rate.map(|hr| hr as f32);

        let steps = match mode {
            Mode::Resting => return None,
            Mode::Warmup => cadence,
            Mode::Workout => {
                let below_target = hr.is_some_and(|hr| hr < baseline.target_hr());
                if below_target && cadence < WORKOUT_CADENCE_CEILING {
                    cadence + CADENCE_NUDGE
                } else {
                    cadence
                }
            }
            Mode::SlowDown => {
                if hr.is_some_and(|hr| hr > baseline.resting_hr()) {
                    cadence - CADENCE_NUDGE
                } else {
                    cadence
                }
            }
        };

        Some(steps / bpm)
    }

    /// Speed to publish, clamped into the configured limits
    pub fn target_speed(
        &self,
        mode: Mode,
        cadence: Option<f32>,
        heart_rate: Option<u32>,
        baseline: &HrBaseline,
        track_bpm: Option<f32>,
    ) -> Option<f32> {
        Self::raw_speed(mode, cadence, heart_rate, baseline, track_bpm)
            .and_then(|speed| self.limits.apply(speed))
    }
}
