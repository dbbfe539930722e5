//! State shared between the sensor consumers, the renderer and the operator

use crate::baseline::HrBaseline;
use crate::mode::Mode;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// `f32` stored as its bit pattern in an `AtomicU32`
#[derive(Debug)]
pub struct AtomicF32 {
    storage: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            storage: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn load(&self, ordering: Ordering) -> f32 {
        f32::from_bits(self.storage.load(ordering))
    }

    pub fn store(&self, value: f32, ordering: Ordering) {
        self.storage.store(value.to_bits(), ordering);
    }
}

/// Cross-thread control values
///
/// Floats are lock-free so the render loop never waits. Cadence and track
/// tempo use NaN for "absent", heart rate uses 0. The baseline sits behind a
/// lock because its three derived values must change together; the renderer
/// never touches it.
#[derive(Debug)]
pub struct ControlState {
    speed: AtomicF32,
    cadence: AtomicF32,
    track_bpm: AtomicF32,
    heart_rate: AtomicU32,
    mode: AtomicU8,
    baseline: RwLock<HrBaseline>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(HrBaseline::default())
    }
}

impl ControlState {
    pub fn new(baseline: HrBaseline) -> Self {
        Self {
            speed: AtomicF32::new(1.0),
            cadence: AtomicF32::new(f32::NAN),
            track_bpm: AtomicF32::new(f32::NAN),
            heart_rate: AtomicU32::new(0),
            mode: AtomicU8::new(Mode::default().as_u8()),
            baseline: RwLock::new(baseline),
        }
    }

    /// Current playback speed multiplier (always > 0)
    pub fn speed(&self) -> f32 {
        self.speed.load(Ordering::Relaxed)
    }

    /// Publish a new speed; non-positive or non-finite values are ignored
    pub fn set_speed(&self, speed: f32) -> bool {
        if !(speed.is_finite() && speed > 0.0) {
            tracing::warn!(speed, "refusing to publish invalid playback speed");
            return false;
        }
        self.speed.store(speed, Ordering::Relaxed);
        true
    }

    pub fn cadence(&self) -> Option<f32> {
        let cadence = self.cadence.load(Ordering::Relaxed);
        (!cadence.is_nan()).then_some(cadence)
    }

    pub fn set_cadence(&self, cadence: Option<f32>) {
        self.cadence
            .store(cadence.unwrap_or(f32::NAN), Ordering::Relaxed);
    }

    pub fn track_bpm(&self) -> Option<f32> {
        let bpm = self.track_bpm.load(Ordering::Relaxed);
        (!bpm.is_nan()).then_some(bpm)
    }

    pub fn set_track_bpm(&self, bpm: Option<f32>) {
        self.track_bpm.store(bpm.unwrap_or(f32::NAN), Ordering::Relaxed);
    }

    /// Latest heart rate, `None` until the first sample arrives
    pub fn heart_rate(&self) -> Option<u32> {
        match self.heart_rate.load(Ordering::Relaxed) {
            0 => None,
            bpm => Some(bpm),
        }
    }

    pub fn set_heart_rate(&self, bpm: u32) {
        self.heart_rate.store(bpm, Ordering::Relaxed);
    }

    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Switch mode, returning the previous one
    pub fn set_mode(&self, mode: Mode) -> Mode {
        let previous = self.mode.swap(mode.as_u8(), Ordering::AcqRel);
        Mode::from_u8(previous).unwrap_or_default()
    }

    pub fn baseline(&self) -> HrBaseline {
        *self.baseline.read()
    }

    /// Replace the resting rate; delta and target are rederived under the same lock
    pub fn set_resting_hr(&self, resting_hr: f32) -> HrBaseline {
        let mut baseline = self.baseline.write();
        *baseline = baseline.with_resting(resting_hr);
        *baseline
    }

    /// Point-in-time copy of every value, for status display
    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            mode: self.mode(),
            speed: self.speed(),
            cadence: self.cadence(),
            heart_rate: self.heart_rate(),
            baseline: self.baseline(),
            track_bpm: self.track_bpm(),
        }
    }
}

/// Copy of the control state at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSnapshot {
    pub mode: Mode,
    pub speed: f32,
    pub cadence: Option<f32>,
    pub heart_rate: Option<u32>,
    pub baseline: HrBaseline,
    pub track_bpm: Option<f32>,
}

impl fmt::Display for ControlSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode:        {}", self.mode)?;
        writeln!(f, "Speed:       {:.2}x", self.speed)?;
        match self.track_bpm {
            Some(bpm) => writeln!(f, "Song BPM:    {:.1}", bpm)?,
            None => writeln!(f, "Song BPM:    -")?,
        }
        match self.cadence {
            Some(cadence) => writeln!(f, "Cadence:     {:.1}", cadence)?,
            None => writeln!(f, "Cadence:     -")?,
        }
        writeln!(f, "Resting HR:  {:.0}", self.baseline.resting_hr())?;
        writeln!(f, "Warmed HR:   {:.0}", self.baseline.warmed_hr())?;
        writeln!(f, "Target HR:   {:.0}", self.baseline.target_hr())?;
        match self.heart_rate {
            Some(hr) => write!(f, "Current HR:  {}", hr),
            None => write!(f, "Current HR:  -"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_atomic_f32_round_trips_bits() {
        let value = AtomicF32::new(1.25);
        assert_eq!(value.load(Ordering::Relaxed), 1.25);
        value.store(-0.5, Ordering::Relaxed);
        assert_eq!(value.load(Ordering::Relaxed), -0.5);
    }

    #[test]
    fn test_defaults() {
        let state = ControlState::default();
        assert_eq!(state.speed(), 1.0);
        assert_eq!(state.cadence(), None);
        assert_eq!(state.track_bpm(), None);
        assert_eq!(state.heart_rate(), None);
        assert_eq!(state.mode(), Mode::Warmup);
    }

    #[test]
    fn test_speed_stays_positive() {
        let state = ControlState::default();
        assert!(state.set_speed(1.3));
        assert!(!state.set_speed(0.0));
        assert!(!state.set_speed(-1.0));
        assert!(!state.set_speed(f32::NAN));
        assert_eq!(state.speed(), 1.3);
    }

    #[test]
    fn test_absent_values() {
        let state = ControlState::default();
        state.set_cadence(Some(150.0));
        assert_eq!(state.cadence(), Some(150.0));
        state.set_cadence(None);
        assert_eq!(state.cadence(), None);

        state.set_track_bpm(Some(128.0));
        assert_eq!(state.track_bpm(), Some(128.0));

        state.set_heart_rate(72);
        assert_eq!(state.heart_rate(), Some(72));
    }

    #[test]
    fn test_set_mode_returns_previous() {
        let state = ControlState::default();
        assert_eq!(state.set_mode(Mode::Resting), Mode::Warmup);
        assert_eq!(state.set_mode(Mode::SlowDown), Mode::Resting);
        assert_eq!(state.mode(), Mode::SlowDown);
    }

    #[test]
    fn test_resting_update_rederives_target() {
        let state = ControlState::default();
        let baseline = state.set_resting_hr(70.0);
        assert_eq!(baseline.target_hr(), 145.0);
        assert_eq!(state.baseline(), baseline);
    }

    #[test]
    fn test_concurrent_readers_see_valid_speed() {
        let state = Arc::new(ControlState::default());
        let writer = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for i in 1..=1000 {
                    state.set_speed(i as f32 / 100.0);
                }
            })
        };
        for _ in 0..1000 {
            let speed = state.speed();
            assert!(speed > 0.0 && speed <= 10.0);
        }
        writer.join().unwrap();
        assert_eq!(state.speed(), 10.0);
    }

    #[test]
    fn test_snapshot_display() {
        let state = ControlState::default();
        state.set_track_bpm(Some(120.0));
        let text = state.snapshot().to_string();
        assert!(text.contains("Mode:        Warmup"));
        assert!(text.contains("Song BPM:    120.0"));
        assert!(text.contains("Cadence:     -"));
        assert!(text.contains("Target HR:   150"));
    }
}
