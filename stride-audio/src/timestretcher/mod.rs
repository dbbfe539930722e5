//! Pitch-independent time-stretching
//!
//! The renderer stretches one chunk at a time, so a stretcher only has to
//! turn a buffer into a buffer of `round(len / speed)` samples.
//!
//! ```rust,ignore
//! use stride_audio::timestretcher::{PhaseVocoder, TimeStretch};
//!
//! let mut vocoder = PhaseVocoder::default();
//! let faster = vocoder.stretch(&chunk, 1.2); // shorter, same pitch
//! ```

mod phase;
mod stft;

pub use phase::PhaseVocoder;
pub use stft::{FftSize, Frame, Stft};

/// Changes duration without changing pitch
pub trait TimeStretch: Send {
    /// Stretch `input` to play `speed` times faster
    ///
    /// The result has exactly [`stretched_len`]`(input.len(), speed)` samples.
    fn stretch(&mut self, input: &[f32], speed: f32) -> Vec<f32>;
}

/// Output length of a chunk of `len` samples played at `speed`
pub fn stretched_len(len: usize, speed: f32) -> usize {
    if !(speed.is_finite() && speed > 0.0) {
        return len;
    }
    (len as f64 / speed as f64).round() as usize
}
