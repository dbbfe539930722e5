//! Audio output devices
//!
//! The renderer writes mono chunks into an [`AudioSink`]. The cpal sink
//! feeds a lock-free ring buffer that the device callback drains, so a write
//! only ever blocks the render thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a write may make no progress before the device counts as failed
const STALL_TIMEOUT: Duration = Duration::from_secs(2);
/// Back-off while the ring buffer is full
const WRITE_BACKOFF: Duration = Duration::from_millis(2);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("no audio output device found")]
    NoDevice,
    #[error("audio device error: {0}")]
    Device(String),
    #[error("audio output stalled")]
    Stalled,
}

/// Destination for rendered mono samples
pub trait AudioSink {
    /// Device sample rate (Hz)
    fn sample_rate(&self) -> u32;

    /// Queue samples for output, blocking until they are accepted
    fn write(&mut self, samples: &[f32]) -> Result<(), RenderError>;

    /// Wait until queued samples have been played
    fn finish(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Opens a sink on the render thread
///
/// Device streams are often tied to the thread that created them, so the
/// renderer receives a factory rather than an open sink.
pub trait SinkFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioSink>, RenderError>;
}

/// Default cpal output device
#[derive(Debug, Clone)]
pub struct CpalSinkFactory {
    /// Ring buffer length in milliseconds
    buffer_ms: u32,
}

impl Default for CpalSinkFactory {
    fn default() -> Self {
        Self { buffer_ms: 250 }
    }
}

impl CpalSinkFactory {
    /// Sample rate of the default output device (tracks are resampled to it)
    pub fn sample_rate(&self) -> Result<u32, RenderError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(RenderError::NoDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| RenderError::Device(format!("failed to get audio config: {}", e)))?;
        Ok(config.sample_rate().0)
    }
}

impl SinkFactory for CpalSinkFactory {
    fn open(&self) -> Result<Box<dyn AudioSink>, RenderError> {
        Ok(Box::new(CpalSink::open(self.buffer_ms)?))
    }
}

/// cpal output stream fed through a ring buffer
pub struct CpalSink {
    _stream: cpal::Stream,
    producer: HeapProd<f32>,
    error: Arc<Mutex<Option<String>>>,
    sample_rate: u32,
}

impl CpalSink {
    fn open(buffer_ms: u32) -> Result<Self, RenderError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(RenderError::NoDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| RenderError::Device(format!("failed to get audio config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let capacity = (sample_rate as usize * buffer_ms as usize / 1000).max(1024);

        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let error = Arc::new(Mutex::new(None));
        let error_for_callback = error.clone();

        let mut consumer: HeapCons<f32> = consumer;
        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Mono source fanned out to every device channel; silence on underrun
                    for frame in data.chunks_mut(channels.max(1)) {
                        let sample = consumer.try_pop().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                move |err| {
                    tracing::error!("audio stream error: {}", err);
                    *error_for_callback.lock() = Some(err.to_string());
                },
                None,
            )
            .map_err(|e| RenderError::Device(format!("failed to create audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| RenderError::Device(format!("failed to start audio: {}", e)))?;

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate,
            channels,
            "audio output opened"
        );

        Ok(Self {
            _stream: stream,
            producer,
            error,
            sample_rate,
        })
    }

    fn check_stream(&self) -> Result<(), RenderError> {
        match self.error.lock().as_ref() {
            Some(message) => Err(RenderError::Device(message.clone())),
            None => Ok(()),
        }
    }
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), RenderError> {
        let mut rest = samples;
        let mut last_progress = Instant::now();

        while !rest.is_empty() {
            self.check_stream()?;

            let pushed = self.producer.push_slice(rest);
            rest = &rest[pushed..];

            if pushed > 0 {
                last_progress = Instant::now();
            } else if last_progress.elapsed() > STALL_TIMEOUT {
                return Err(RenderError::Stalled);
            } else {
                thread::sleep(WRITE_BACKOFF);
            }
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        let mut last_len = self.producer.occupied_len();
        let mut last_progress = Instant::now();

        while last_len > 0 {
            self.check_stream()?;
            thread::sleep(WRITE_BACKOFF);

            let len = self.producer.occupied_len();
            if len < last_len {
                last_progress = Instant::now();
            } else if last_progress.elapsed() > STALL_TIMEOUT {
                return Err(RenderError::Stalled);
            }
            last_len = len;
        }

        Ok(())
    }
}
