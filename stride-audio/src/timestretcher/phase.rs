//! Phase vocoder for pitch-preserving time-stretching
//!
//! Each call stretches one self-contained buffer: analysis frames are read at
//! a fractional step of `speed`, magnitudes are interpolated between the two
//! neighbouring frames and phases are advanced by each bin's measured
//! instantaneous frequency.

use super::stft::{FftSize, Frame, Stft};
use super::{stretched_len, TimeStretch};
use rustfft::num_complex::Complex;
use std::f32::consts::PI;

const TWO_PI: f32 = 2.0 * PI;

pub struct PhaseVocoder {
    stft: Stft,
    /// Expected phase advance per hop for each bin
    omega: Vec<f32>,
    /// Phase accumulator, one per bin
    phase_accum: Vec<f32>,
}

impl Default for PhaseVocoder {
    fn default() -> Self {
        Self::new(FftSize::default())
    }
}

impl PhaseVocoder {
    pub fn new(fft_size: FftSize) -> Self {
        let stft = Stft::new(fft_size);
        let num_bins = stft.num_bins();
        let hop = stft.hop_size() as f32;
        let size = stft.size() as f32;

        // omega[k] = 2 * pi * k * hop / size
        let omega = (0..num_bins)
            .map(|k| TWO_PI * k as f32 * hop / size)
            .collect();

        Self {
            stft,
            omega,
            phase_accum: vec![0.0; num_bins],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.stft.size()
    }

    /// Resample the frame sequence at a step of `rate`, keeping phase coherent
    fn stretch_frames(&mut self, frames: &[Frame], rate: f32) -> Vec<Frame> {
        let num_bins = self.omega.len();
        let silent = vec![Complex::default(); num_bins];

        for (acc, bin) in self.phase_accum.iter_mut().zip(&frames[0]) {
            *acc = bin.arg();
        }

        let steps = (frames.len() as f32 / rate).ceil() as usize;
        let mut out = Vec::with_capacity(steps);

        for step in 0..steps {
            let t = step as f32 * rate;
            let index = t.floor() as usize;
            if index >= frames.len() {
                break;
            }
            let alpha = t - index as f32;
            let current = &frames[index];
            let next = frames.get(index + 1).unwrap_or(&silent);

            let mut frame = Vec::with_capacity(num_bins);
            for k in 0..num_bins {
                let mag = (1.0 - alpha) * current[k].norm() + alpha * next[k].norm();
                frame.push(Complex::from_polar(mag, self.phase_accum[k]));

                let deviation = Self::wrap_phase(next[k].arg() - current[k].arg() - self.omega[k]);
                self.phase_accum[k] += self.omega[k] + deviation;
            }
            out.push(frame);
        }

        out
    }

    /// Wrap phase to [-π, π]
    #[inline(always)]
    fn wrap_phase(phase: f32) -> f32 {
        phase - TWO_PI * ((phase + PI) / TWO_PI).floor()
    }
}

impl TimeStretch for PhaseVocoder {
    fn stretch(&mut self, input: &[f32], speed: f32) -> Vec<f32> {
        let target = stretched_len(input.len(), speed);
        if input.is_empty() || target == 0 {
            return Vec::new();
        }
        if target == input.len() {
            return input.to_vec();
        }

        let frames = self.stft.analyze(input);
        let stretched = self.stretch_frames(&frames, speed);
        self.stft.synthesize(&stretched, target)
    }
}
