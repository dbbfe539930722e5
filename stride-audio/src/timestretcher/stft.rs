//! Short-time Fourier transform over whole buffers
//!
//! Frames are centered: the signal is zero-padded by half a frame on each
//! side, so frame `t` is centered on sample `t * hop`. Synthesis is windowed
//! overlap-add normalized by the summed squared window, which reconstructs
//! the input exactly when the frames are left untouched.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// FFT size options for time-stretching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftSize {
    /// 512 samples - short chunks, coarse frequency resolution
    Small = 512,
    /// 1024 samples - balanced (recommended)
    #[default]
    Medium = 1024,
    /// 2048 samples - finer frequency resolution, smears transients
    Large = 2048,
}

impl FftSize {
    #[inline]
    pub fn as_usize(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn hop_size(self) -> usize {
        // 75% overlap
        self.as_usize() / 4
    }
}

/// One analysis frame: bins `0..=size/2`
pub type Frame = Vec<Complex<f32>>;

/// Forward/inverse STFT with a Hann window
pub struct Stft {
    size: usize,
    hop: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl Stft {
    pub fn new(fft_size: FftSize) -> Self {
        let size = fft_size.as_usize();
        let mut planner = FftPlanner::new();

        // Periodic Hann
        let window = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
            .collect();

        Self {
            size,
            hop: fft_size.hop_size(),
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
            window,
            buffer: vec![Complex::default(); size],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn hop_size(&self) -> usize {
        self.hop
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Frames produced for a signal of `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.hop
    }

    /// Centered STFT of `signal`
    pub fn analyze(&mut self, signal: &[f32]) -> Vec<Frame> {
        let half = self.size / 2;
        let frames = self.frame_count(signal.len());
        let mut out = Vec::with_capacity(frames);

        for t in 0..frames {
            // Frame t covers padded samples [t*hop, t*hop + size)
            let start = (t * self.hop) as isize - half as isize;
            for (i, slot) in self.buffer.iter_mut().enumerate() {
                let idx = start + i as isize;
                let sample = if idx >= 0 && (idx as usize) < signal.len() {
                    signal[idx as usize]
                } else {
                    0.0
                };
                *slot = Complex::new(sample * self.window[i], 0.0);
            }
            self.forward.process(&mut self.buffer);
            out.push(self.buffer[..self.num_bins()].to_vec());
        }

        out
    }

    /// Overlap-add resynthesis, trimmed or zero-padded to `length` samples
    pub fn synthesize(&mut self, frames: &[Frame], length: usize) -> Vec<f32> {
        let half = self.size / 2;
        let bins = self.num_bins();
        let padded_len = self.size + self.hop * frames.len().saturating_sub(1);
        let mut signal = vec![0.0f32; padded_len];
        let mut window_sum = vec![0.0f32; padded_len];
        let scale = 1.0 / self.size as f32;

        for (t, frame) in frames.iter().enumerate() {
            // Rebuild the full Hermitian spectrum
            for k in 0..self.size {
                self.buffer[k] = if k < bins {
                    frame.get(k).copied().unwrap_or_default()
                } else {
                    frame
                        .get(self.size - k)
                        .copied()
                        .unwrap_or_default()
                        .conj()
                };
            }
            self.inverse.process(&mut self.buffer);

            let offset = t * self.hop;
            for i in 0..self.size {
                let w = self.window[i];
                signal[offset + i] += self.buffer[i].re * scale * w;
                window_sum[offset + i] += w * w;
            }
        }

        for (s, &w) in signal.iter_mut().zip(&window_sum) {
            if w > 1e-10 {
                *s /= w;
            }
        }

        let mut out: Vec<f32> = signal.into_iter().skip(half).take(length).collect();
        out.resize(length, 0.0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let stft = Stft::new(FftSize::Medium);
        assert_eq!(stft.size(), 1024);
        assert_eq!(stft.hop_size(), 256);
        assert_eq!(stft.num_bins(), 513);
        assert_eq!(stft.frame_count(0), 1);
        assert_eq!(stft.frame_count(1000), 4);
    }

    #[test]
    fn test_unmodified_frames_reconstruct_input() {
        let mut stft = Stft::new(FftSize::Small);
        let input: Vec<f32> = (0..3000)
            .map(|i| {
                let t = i as f32 / 8000.0;
                0.5 * (2.0 * PI * 440.0 * t).sin() + 0.2 * (2.0 * PI * 1250.0 * t).sin()
            })
            .collect();

        let frames = stft.analyze(&input);
        let output = stft.synthesize(&frames, input.len());

        assert_eq!(output.len(), input.len());
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_synthesis_pads_to_length() {
        let mut stft = Stft::new(FftSize::Small);
        let frames = stft.analyze(&[0.25; 10]);
        let output = stft.synthesize(&frames, 700);
        assert_eq!(output.len(), 700);
        assert!((output[5] - 0.25).abs() < 1e-3);
        assert_eq!(output[699], 0.0);
    }
}
