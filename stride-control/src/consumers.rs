//! Sensor consumer loops
//!
//! Each consumer owns its history, drains one channel and publishes into the
//! shared [`ControlState`]. Both loops wake at least once per poll interval so
//! they notice the shutdown flag even when the sensor goes quiet.

use crate::baseline::RestingHrTracker;
use crate::controller::SpeedController;
use crate::mode::Mode;
use crate::state::ControlState;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stride_analysis::{AccelerometerSample, CadencePipeline};

/// Default receive timeout for the consumer loops
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One heart-rate reading, stamped when it arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartRateSample {
    pub bpm: u32,
    pub arrival: Instant,
}

impl HeartRateSample {
    pub fn new(bpm: u32, arrival: Instant) -> Self {
        Self { bpm, arrival }
    }
}

/// Counters reported when a consumer loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub samples: u64,
    pub gaps: u64,
}

/// Drain `rx` until shutdown or disconnect, handing each item to `handle`
fn drain<T>(
    name: &str,
    rx: &Receiver<T>,
    shutdown: &AtomicBool,
    poll: Duration,
    mut handle: impl FnMut(T),
) -> ConsumerStats {
    let mut stats = ConsumerStats::default();

    while !shutdown.load(Ordering::Relaxed) {
        match rx.recv_timeout(poll) {
            Ok(item) => {
                handle(item);
                stats.samples += 1;
            }
            Err(RecvTimeoutError::Timeout) => {
                stats.gaps += 1;
                tracing::trace!("{} sensor gap", name);
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("{} channel closed", name);
                break;
            }
        }
    }

    tracing::info!(
        samples = stats.samples,
        gaps = stats.gaps,
        "{} consumer stopped",
        name
    );
    stats
}

/// Accelerometer samples → cadence → playback speed
pub struct AccelerometerConsumer {
    pipeline: CadencePipeline,
    controller: SpeedController,
    state: Arc<ControlState>,
}

impl AccelerometerConsumer {
    pub fn new(
        pipeline: CadencePipeline,
        controller: SpeedController,
        state: Arc<ControlState>,
    ) -> Self {
        Self {
            pipeline,
            controller,
            state,
        }
    }

    /// Process one sample; returns the speed published, if any
    ///
    /// Speed is re-evaluated on every sample against the held cadence, so
    /// mode, track and heart-rate changes apply on the next sample.
    pub fn handle(&mut self, sample: AccelerometerSample) -> Option<f32> {
        if let Some(cadence) = self.pipeline.push(sample).cadence {
            self.state.set_cadence(Some(cadence));
        }
        let cadence = self.pipeline.cadence()?;

        let previous = self.state.speed();
        let mode = self.state.mode();
        let speed = self.controller.target_speed(
            mode,
            Some(cadence),
            self.state.heart_rate(),
            &self.state.baseline(),
            self.state.track_bpm(),
        )?;

        if self.state.set_speed(speed) {
            if speed != previous {
                tracing::debug!(%mode, cadence, speed, "playback speed updated");
            }
            Some(speed)
        } else {
            None
        }
    }

    pub fn run(
        mut self,
        rx: Receiver<AccelerometerSample>,
        shutdown: Arc<AtomicBool>,
        poll: Duration,
    ) -> ConsumerStats {
        tracing::info!("accelerometer consumer started");
        drain("accelerometer", &rx, &shutdown, poll, |sample| {
            self.handle(sample);
        })
    }
}

/// Heart-rate samples → current heart rate and resting baseline
pub struct HeartRateConsumer {
    tracker: RestingHrTracker,
    state: Arc<ControlState>,
    last_mode: Option<Mode>,
}

impl HeartRateConsumer {
    pub fn new(state: Arc<ControlState>) -> Self {
        Self {
            tracker: RestingHrTracker::default(),
            state,
            last_mode: None,
        }
    }

    /// Process one sample; while resting, the baseline follows the trailing mean
    pub fn handle(&mut self, sample: HeartRateSample) {
        self.state.set_heart_rate(sample.bpm);

        let mode = self.state.mode();
        if mode == Mode::Resting {
            if self.last_mode != Some(Mode::Resting) {
                self.tracker.clear();
            }
            let resting = self.tracker.push(sample.bpm);
            let baseline = self.state.set_resting_hr(resting);
            tracing::debug!(
                resting = baseline.resting_hr(),
                target = baseline.target_hr(),
                "resting heart rate updated"
            );
        }
        self.last_mode = Some(mode);
    }

    pub fn run(
        mut self,
        rx: Receiver<HeartRateSample>,
        shutdown: Arc<AtomicBool>,
        poll: Duration,
    ) -> ConsumerStats {
        tracing::info!("heart-rate consumer started");
        drain("heart-rate", &rx, &shutdown, poll, |sample| self.handle(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::HrBaseline;
    use crossbeam_channel::unbounded;
    use std::f64::consts::PI;
    use std::thread;

    fn running_samples(count: usize) -> Vec<AccelerometerSample> {
        let base = Instant::now();
        (0..count)
            .map(|i| {
                let t = i as f64 / 50.0;
                let z = 9.8 + 8.0 * (2.0 * PI * 2.0 * t).sin();
                AccelerometerSample::new(
                    0.0,
                    0.0,
                    z as f32,
                    base + Duration::from_millis(20 * i as u64),
                )
            })
            .collect()
    }

    /// Consumer at 120 BPM whose first 200 samples have produced a cadence
    fn warmed_up(
        state: &Arc<ControlState>,
    ) -> (AccelerometerConsumer, std::vec::IntoIter<AccelerometerSample>) {
        state.set_track_bpm(Some(120.0));
        let mut consumer = AccelerometerConsumer::new(
            CadencePipeline::default(),
            SpeedController::default(),
            Arc::clone(state),
        );
        let mut samples = running_samples(219).into_iter();
        for sample in samples.by_ref().take(200) {
            consumer.handle(sample);
        }
        (consumer, samples)
    }

    #[test]
    fn test_mode_change_applies_on_next_sample() {
        let state = Arc::new(ControlState::default());
        state.set_heart_rate(100);
        let (mut consumer, mut samples) = warmed_up(&state);

        let cadence = state.cadence().unwrap();
        assert!((state.speed() - cadence / 120.0).abs() < 1e-5);

        state.set_mode(Mode::SlowDown);
        let speed = consumer.handle(samples.next().unwrap());

        // No new cadence is emitted before the 220th sample
        assert_eq!(state.cadence(), Some(cadence));
        let expected = (cadence - 5.0) / 120.0;
        assert!((speed.unwrap() - expected).abs() < 1e-5);
        assert!((state.speed() - expected).abs() < 1e-5);
    }

    #[test]
    fn test_track_change_applies_on_next_sample() {
        let state = Arc::new(ControlState::default());
        let (mut consumer, mut samples) = warmed_up(&state);
        let cadence = state.cadence().unwrap();

        state.set_track_bpm(Some(150.0));
        consumer.handle(samples.next().unwrap());
        assert!((state.speed() - cadence / 150.0).abs() < 1e-5);
    }

    #[test]
    fn test_workout_follows_heart_rate_across_target() {
        let state = Arc::new(ControlState::default());
        state.set_mode(Mode::Workout);
        let mut heart = HeartRateConsumer::new(Arc::clone(&state));
        heart.handle(HeartRateSample::new(140, Instant::now()));
        let (mut consumer, mut samples) = warmed_up(&state);

        let cadence = state.cadence().unwrap();
        let target = state.baseline().target_hr();
        assert!((target - 150.0).abs() < 1e-4);

        // Below target: nudge up
        assert!((state.speed() - (cadence + 5.0) / 120.0).abs() < 1e-5);

        heart.handle(HeartRateSample::new(160, Instant::now()));
        consumer.handle(samples.next().unwrap());
        assert!((state.speed() - cadence / 120.0).abs() < 1e-5);

        heart.handle(HeartRateSample::new(140, Instant::now()));
        consumer.handle(samples.next().unwrap());
        assert!((state.speed() - (cadence + 5.0) / 120.0).abs() < 1e-5);
        assert_eq!(state.cadence(), Some(cadence));
    }

    #[test]
    fn test_slowdown_follows_heart_rate_across_resting() {
        let state = Arc::new(ControlState::default());
        state.set_mode(Mode::SlowDown);
        let mut heart = HeartRateConsumer::new(Arc::clone(&state));
        heart.handle(HeartRateSample::new(100, Instant::now()));
        let (mut consumer, mut samples) = warmed_up(&state);

        let cadence = state.cadence().unwrap();
        assert!((state.speed() - (cadence - 5.0) / 120.0).abs() < 1e-5);

        heart.handle(HeartRateSample::new(55, Instant::now()));
        consumer.handle(samples.next().unwrap());
        assert!((state.speed() - cadence / 120.0).abs() < 1e-5);

        heart.handle(HeartRateSample::new(90, Instant::now()));
        consumer.handle(samples.next().unwrap());
        assert!((state.speed() - (cadence - 5.0) / 120.0).abs() < 1e-5);
    }

    #[test]
    fn test_resting_updates_baseline() {
        let state = Arc::new(ControlState::default());
        state.set_mode(Mode::Resting);
        let mut consumer = HeartRateConsumer::new(Arc::clone(&state));

        for bpm in [58, 60, 62, 61, 59] {
            consumer.handle(HeartRateSample::new(bpm, Instant::now()));
        }

        let baseline = state.baseline();
        assert!((baseline.resting_hr() - 60.0).abs() < 1e-6);
        assert!((baseline.target_hr() - 150.0).abs() < 1e-4);
        assert_eq!(state.heart_rate(), Some(59));
    }

    #[test]
    fn test_baseline_frozen_outside_resting() {
        let state = Arc::new(ControlState::new(HrBaseline::new(65.0, 120.0)));
        let mut consumer = HeartRateConsumer::new(Arc::clone(&state));

        consumer.handle(HeartRateSample::new(140, Instant::now()));
        assert_eq!(state.baseline().resting_hr(), 65.0);
        assert_eq!(state.heart_rate(), Some(140));
    }

    #[test]
    fn test_reentering_resting_starts_fresh() {
        let state = Arc::new(ControlState::default());
        let mut consumer = HeartRateConsumer::new(Arc::clone(&state));

        state.set_mode(Mode::Resting);
        consumer.handle(HeartRateSample::new(100, Instant::now()));
        state.set_mode(Mode::Warmup);
        consumer.handle(HeartRateSample::new(120, Instant::now()));
        state.set_mode(Mode::Resting);
        consumer.handle(HeartRateSample::new(70, Instant::now()));

        assert_eq!(state.baseline().resting_hr(), 70.0);
    }

    #[test]
    fn test_accelerometer_publishes_speed() {
        let state = Arc::new(ControlState::default());
        state.set_track_bpm(Some(120.0));
        let mut consumer = AccelerometerConsumer::new(
            CadencePipeline::default(),
            SpeedController::default(),
            Arc::clone(&state),
        );

        let mut published = Vec::new();
        for sample in running_samples(200) {
            if let Some(speed) = consumer.handle(sample) {
                published.push(speed);
            }
        }

        let last = *published.last().unwrap();
        assert!((last - 1.0).abs() < 0.05, "speed = {}", last);
        assert_eq!(state.speed(), last);
        assert!(state.cadence().is_some());
    }

    #[test]
    fn test_no_track_keeps_speed() {
        let state = Arc::new(ControlState::default());
        let mut consumer = AccelerometerConsumer::new(
            CadencePipeline::default(),
            SpeedController::default(),
            Arc::clone(&state),
        );
        for sample in running_samples(100) {
            assert_eq!(consumer.handle(sample), None);
        }
        assert_eq!(state.speed(), 1.0);
        assert!(state.cadence().is_some());
    }

    #[test]
    fn test_run_exits_on_disconnect() {
        let state = Arc::new(ControlState::default());
        state.set_mode(Mode::Resting);
        let (tx, rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let consumer = HeartRateConsumer::new(Arc::clone(&state));
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || consumer.run(rx, shutdown, Duration::from_millis(5)))
        };

        for bpm in [70, 72, 74] {
            tx.send(HeartRateSample::new(bpm, Instant::now())).unwrap();
        }
        drop(tx);

        let stats = handle.join().unwrap();
        assert_eq!(stats.samples, 3);
        assert_eq!(state.baseline().resting_hr(), 72.0);
    }

    #[test]
    fn test_run_exits_on_shutdown() {
        let state = Arc::new(ControlState::default());
        let (_tx, rx) = unbounded::<AccelerometerSample>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let consumer = AccelerometerConsumer::new(
                CadencePipeline::default(),
                SpeedController::default(),
                state,
            );
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || consumer.run(rx, shutdown, Duration::from_millis(5)))
        };

        thread::sleep(Duration::from_millis(30));
        shutdown.store(true, Ordering::Relaxed);
        let stats = handle.join().unwrap();
        assert_eq!(stats.samples, 0);
        assert!(stats.gaps > 0);
    }
}
