//! Training control for stride
//!
//! Combines cadence, heart rate and the operator's training mode into a
//! playback speed, and holds the state shared by every thread.

mod baseline;
mod consumers;
mod controller;
mod mode;
mod state;

pub use baseline::{
    HrBaseline, RestingHrTracker, DEFAULT_RESTING_HR, DEFAULT_WARMED_HR, RESTING_WINDOW,
};
pub use consumers::{
    AccelerometerConsumer, ConsumerStats, HeartRateConsumer, HeartRateSample,
    DEFAULT_POLL_INTERVAL,
};
pub use controller::{
    SpeedController, SpeedLimits, CADENCE_NUDGE, MIN_SPEED, WORKOUT_CADENCE_CEILING,
};
pub use mode::{Mode, UnknownMode};
pub use state::{AtomicF32, ControlSnapshot, ControlState};
