//! Per-sample cadence pipeline: sampling rate → low-pass → peaks → cadence

use crate::cadence::{CadenceAggregator, CADENCE_WINDOW};
use crate::filter::ButterworthLowPass;
use crate::peaks::{PeakDetector, LIVE_STRIDE_FLOOR, MIN_STRIDE_SAMPLES};
use crate::sample::{AccelerometerSample, StrideRateObservation};
use crate::sampling::{estimate_sampling_rate, DEFAULT_SAMPLING_RATE_HZ};
use crate::window::RingWindow;
use std::time::Instant;

/// Tuning for the cadence pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Samples (and arrival times) kept for filtering
    pub window_capacity: usize,
    /// Low-pass cutoff (Hz)
    pub cutoff_hz: f64,
    /// Butterworth order
    pub filter_order: usize,
    /// Rate used until arrival times give an estimate (Hz)
    pub default_sampling_rate: f64,
    /// Stride rates below this are rejected (strides/minute)
    pub stride_floor: f32,
    /// Raw observations per cadence value
    pub cadence_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_capacity: 100,
            cutoff_hz: 3.0,
            filter_order: 3,
            default_sampling_rate: DEFAULT_SAMPLING_RATE_HZ,
            stride_floor: LIVE_STRIDE_FLOOR,
            cadence_window: CADENCE_WINDOW,
        }
    }
}

/// Result of pushing one sample through the pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOutput {
    /// Raw stride rate measured on this sample
    pub observation: StrideRateObservation,
    /// Newly emitted cadence, only on the sample that completes a window
    pub cadence: Option<f32>,
    /// Sampling rate the filter was designed for (Hz)
    pub sampling_rate: f64,
}

/// Cadence estimation from a live accelerometer stream
///
/// Owned by the accelerometer consumer; nothing in here is shared.
pub struct CadencePipeline {
    config: PipelineConfig,
    samples: RingWindow<AccelerometerSample>,
    timestamps: RingWindow<Instant>,
    detector: PeakDetector,
    aggregator: CadenceAggregator,
    /// Reused buffer for gravity-free magnitudes
    magnitudes: Vec<f64>,
}

impl Default for CadencePipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl CadencePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            samples: RingWindow::new(config.window_capacity),
            timestamps: RingWindow::new(config.window_capacity),
            detector: PeakDetector::with_floor(config.stride_floor),
            aggregator: CadenceAggregator::new(config.cadence_window),
            magnitudes: Vec::with_capacity(config.window_capacity),
            config,
        }
    }

    /// Feed one sample and measure the stride rate over the current window
    pub fn push(&mut self, sample: AccelerometerSample) -> PipelineOutput {
        self.timestamps.push(sample.arrival);
        self.samples.push(sample);

        let sampling_rate = estimate_sampling_rate(self.timestamps.iter())
            .unwrap_or(self.config.default_sampling_rate);

        let rate = self.measure(sampling_rate);
        let cadence = self.aggregator.push(rate);

        if let Some(cadence) = cadence {
            tracing::debug!(cadence, sampling_rate, "cadence updated");
        }

        PipelineOutput {
            observation: StrideRateObservation {
                rate,
                timestamp: sample.arrival,
            },
            cadence,
            sampling_rate,
        }
    }

    /// Stride rate over the retained window, if one can be measured
    fn measure(&mut self, sampling_rate: f64) -> Option<f32> {
        if self.samples.len() < MIN_STRIDE_SAMPLES {
            return None;
        }

        let filter = match ButterworthLowPass::design(
            self.config.filter_order,
            self.config.cutoff_hz,
            sampling_rate,
        ) {
            Ok(filter) => filter,
            Err(e) => {
                tracing::debug!("skipping stride estimate: {}", e);
                return None;
            }
        };

        self.magnitudes.clear();
        self.magnitudes
            .extend(self.samples.iter().map(AccelerometerSample::dynamic_magnitude));

        let filtered = filter.filtfilt(&self.magnitudes);
        self.detector.stride_rate(&filtered, sampling_rate)
    }

    /// Last emitted cadence (steps/minute)
    pub fn cadence(&self) -> Option<f32> {
        self.aggregator.current()
    }

    /// Samples currently retained
    pub fn window_len(&self) -> usize {
        self.samples.len()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
