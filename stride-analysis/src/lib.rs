//! Signal analysis for stride
//!
//! Turns raw wearable motion into a running cadence and measures the tempo
//! of a loaded track:
//! - Sampling: arrival-time based sampling rate estimation
//! - Filter: zero-phase Butterworth low-pass
//! - Peaks: stride peak detection and stride rate
//! - Cadence: moving aggregation of stride-rate observations
//! - Pipeline: the per-sample chain of all of the above
//! - Tempo: offline BPM analysis of a decoded track

mod cadence;
mod filter;
mod peaks;
mod pipeline;
mod sample;
mod sampling;
mod tempo;
mod window;

pub use cadence::{CadenceAggregator, CADENCE_WINDOW};
pub use filter::{ButterworthLowPass, FilterError};
pub use peaks::{
    PeakDetector, DEFAULT_STRIDE_FLOOR, LIVE_STRIDE_FLOOR, MIN_PEAK_DISTANCE, MIN_PEAK_HEIGHT,
    MIN_STRIDE_SAMPLES, PEAKS_CONSIDERED,
};
pub use pipeline::{CadencePipeline, PipelineConfig, PipelineOutput};
pub use sample::{AccelerometerSample, StrideRateObservation, GRAVITY};
pub use sampling::{estimate_sampling_rate, DEFAULT_SAMPLING_RATE_HZ};
pub use tempo::{TempoAnalyzer, TempoEstimate};
pub use window::RingWindow;
