//! Track tempo estimation
//!
//! Spectral flux gives an onset strength envelope; autocorrelation of that
//! envelope gives the beat period.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Shortest audio accepted, in seconds
const MIN_DURATION_SECS: usize = 4;
/// Fewest onset frames the autocorrelation needs
const MIN_ONSET_FRAMES: usize = 500;
/// Tempo search range (BPM)
const MIN_BPM: f32 = 60.0;
const MAX_BPM: f32 = 200.0;

/// Estimated tempo of a track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEstimate {
    /// Beats per minute
    pub bpm: f32,
    /// Autocorrelation strength at the chosen period (0.0 - 1.0)
    pub confidence: f32,
}

/// Onset-autocorrelation tempo analyzer
pub struct TempoAnalyzer {
    sample_rate: u32,
    hop_size: usize,
    fft_size: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
}

impl TempoAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        let fft_size = 2048;
        let hop_size = 512;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let window: Vec<f32> = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Self {
            sample_rate,
            hop_size,
            fft_size,
            fft,
            window,
        }
    }

    fn frames_per_second(&self) -> f32 {
        self.sample_rate as f32 / self.hop_size as f32
    }

    /// Estimate the tempo of mono audio
    ///
    /// Returns None for audio shorter than a few seconds or without a
    /// periodic onset pattern.
    pub fn analyze(&self, mono: &[f32]) -> Option<TempoEstimate> {
        if self.sample_rate == 0 || mono.len() < self.sample_rate as usize * MIN_DURATION_SECS {
            return None;
        }

        let onsets = self.onset_envelope(mono);
        if onsets.len() < MIN_ONSET_FRAMES {
            tracing::debug!(frames = onsets.len(), "too few onset frames for tempo");
            return None;
        }

        let estimate = self.autocorrelate(&onsets)?;
        tracing::debug!(bpm = estimate.bpm, confidence = estimate.confidence, "tempo estimated");
        Some(estimate)
    }

    /// Half-wave rectified spectral flux per hop, normalized to a peak of 1
    fn onset_envelope(&self, mono: &[f32]) -> Vec<f32> {
        let bins = self.fft_size / 2;
        let mut envelope = Vec::with_capacity(mono.len() / self.hop_size);
        let mut previous: Option<Vec<f32>> = None;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.fft_size];

        let mut start = 0;
        while start + self.fft_size <= mono.len() {
            for ((slot, &s), &w) in buffer
                .iter_mut()
                .zip(&mono[start..start + self.fft_size])
                .zip(&self.window)
            {
                *slot = Complex::new(s * w, 0.0);
            }
            self.fft.process(&mut buffer);

            let spectrum: Vec<f32> = buffer[..bins].iter().map(|c| c.norm()).collect();
            if let Some(prev) = &previous {
                let flux: f32 = spectrum
                    .iter()
                    .zip(prev)
                    .map(|(curr, prev)| (curr - prev).max(0.0))
                    .sum();
                envelope.push(flux);
            }

            previous = Some(spectrum);
            start += self.hop_size;
        }

        let max = envelope.iter().copied().fold(0.0f32, f32::max);
        if max > 0.0 {
            envelope.iter_mut().for_each(|v| *v /= max);
        }
        envelope
    }

    fn correlation_at_lag(envelope: &[f32], lag: usize) -> f32 {
        if lag == 0 || lag >= envelope.len() / 2 {
            return 0.0;
        }

        let (mut correlation, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
        for i in 0..envelope.len() - lag {
            correlation += envelope[i] * envelope[i + lag];
            norm_a += envelope[i] * envelope[i];
            norm_b += envelope[i + lag] * envelope[i + lag];
        }

        let norm = (norm_a * norm_b).sqrt();
        if norm > 0.0 {
            correlation / norm
        } else {
            0.0
        }
    }

    fn autocorrelate(&self, envelope: &[f32]) -> Option<TempoEstimate> {
        let fps = self.frames_per_second();
        let min_lag = ((fps * 60.0 / MAX_BPM) as usize).max(1);
        let max_lag = (fps * 60.0 / MIN_BPM) as usize;

        // About ten seconds is plenty
        let analysis = &envelope[..envelope.len().min(max_lag * 8)];
        let upper = max_lag.min(analysis.len() / 2);

        let correlations: Vec<(usize, f32)> = (min_lag..upper)
            .map(|lag| (lag, Self::correlation_at_lag(analysis, lag)))
            .collect();
        let &(best_lag, best) = correlations
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))?;
        if best <= 0.0 {
            return None;
        }

        // Parabolic refinement between neighbouring lags
        let before = Self::correlation_at_lag(analysis, best_lag - 1);
        let after = Self::correlation_at_lag(analysis, best_lag + 1);
        let curvature = before - 2.0 * best + after;
        let offset = if curvature < 0.0 {
            (0.5 * (before - after) / curvature).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let lag = best_lag as f32 + offset;

        let raw_bpm = 60.0 * fps / lag;
        let bpm = self.disambiguate_octave(analysis, raw_bpm);

        Some(TempoEstimate {
            bpm,
            confidence: best.clamp(0.0, 1.0),
        })
    }

    /// Pick between octave-related tempi (e.g. 80 vs 160)
    fn disambiguate_octave(&self, envelope: &[f32], raw_bpm: f32) -> f32 {
        let fps = self.frames_per_second();
        let lag_for = |bpm: f32| (fps * 60.0 / bpm).round() as usize;

        if raw_bpm < 65.0 {
            return raw_bpm * 2.0;
        }
        if raw_bpm > 185.0 {
            return raw_bpm / 2.0;
        }

        if (65.0..=95.0).contains(&raw_bpm) {
            let doubled = raw_bpm * 2.0;
            let base_corr = Self::correlation_at_lag(envelope, lag_for(raw_bpm));
            let doubled_corr = Self::correlation_at_lag(envelope, lag_for(doubled));
            if (120.0..=180.0).contains(&doubled) && doubled_corr / base_corr.max(0.001) > 0.7 {
                return doubled;
            }
        }

        if (170.0..=185.0).contains(&raw_bpm) {
            let halved = raw_bpm / 2.0;
            let base_corr = Self::correlation_at_lag(envelope, lag_for(raw_bpm));
            let halved_corr = Self::correlation_at_lag(envelope, lag_for(halved));
            if halved_corr > base_corr * 1.2 {
                return halved;
            }
        }

        raw_bpm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decaying 1 kHz blips on every beat
    fn click_track(bpm: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
        let len = (seconds * sample_rate as f32) as usize;
        let beat = (60.0 / bpm * sample_rate as f32) as usize;
        let click_len = sample_rate as usize / 50;
        let mut out = vec![0.0f32; len];
        let mut start = 0;
        while start < len {
            for i in 0..click_len.min(len - start) {
                let t = i as f32 / sample_rate as f32;
                out[start + i] = (2.0 * PI * 1000.0 * t).sin() * (-t * 200.0).exp();
            }
            start += beat;
        }
        out
    }

    #[test]
    fn test_click_track_tempo() {
        let analyzer = TempoAnalyzer::new(44100);
        let estimate = analyzer.analyze(&click_track(120.0, 10.0, 44100)).unwrap();
        assert!((estimate.bpm - 120.0).abs() < 3.0, "bpm = {}", estimate.bpm);
        assert!(estimate.confidence > 0.3);
    }

    #[test]
    fn test_short_audio_is_rejected() {
        let analyzer = TempoAnalyzer::new(44100);
        assert!(analyzer.analyze(&click_track(120.0, 2.0, 44100)).is_none());
    }

    #[test]
    fn test_silence_has_no_tempo() {
        let analyzer = TempoAnalyzer::new(44100);
        assert!(analyzer.analyze(&vec![0.0; 44100 * 8]).is_none());
    }
}
