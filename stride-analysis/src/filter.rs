//! Zero-phase Butterworth low-pass filter
//!
//! Coefficients come from the analog Butterworth prototype, prewarped and
//! mapped through the bilinear transform. Filtering runs forward then backward
//! over the whole buffer so peak positions are not delayed.

use rustfft::num_complex::Complex;
use std::f64::consts::PI;
use thiserror::Error;

/// Errors raised while designing a filter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("filter order must be at least 1")]
    InvalidOrder,
    #[error("invalid sampling rate: {0} Hz")]
    InvalidSampleRate(f64),
    #[error("cutoff {cutoff} Hz must lie strictly between 0 and Nyquist ({nyquist} Hz)")]
    CutoffOutOfRange { cutoff: f64, nyquist: f64 },
}

/// Digital Butterworth low-pass in transfer-function form
#[derive(Debug, Clone)]
pub struct ButterworthLowPass {
    /// Numerator coefficients
    b: Vec<f64>,
    /// Denominator coefficients, `a[0] == 1`
    a: Vec<f64>,
}

impl ButterworthLowPass {
    /// Design a low-pass of the given order for a cutoff and sampling rate (Hz)
    pub fn design(order: usize, cutoff_hz: f64, sample_rate_hz: f64) -> Result<Self, FilterError> {
        if order == 0 {
            return Err(FilterError::InvalidOrder);
        }
        if !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
            return Err(FilterError::InvalidSampleRate(sample_rate_hz));
        }

        let nyquist = 0.5 * sample_rate_hz;
        let wn = cutoff_hz / nyquist;
        if !(wn > 0.0 && wn < 1.0) {
            return Err(FilterError::CutoffOutOfRange {
                cutoff: cutoff_hz,
                nyquist,
            });
        }

        // Work at a normalized rate of 2, so Nyquist is 1 and 2*fs is 4
        let fs2 = 4.0;
        let warped = fs2 * (PI * wn / 2.0).tan();

        // Analog prototype poles on the left half of the unit circle, scaled to the cutoff
        let n = order as f64;
        let analog_poles: Vec<Complex<f64>> = (0..order)
            .map(|k| {
                let m = 2.0 * k as f64 - n + 1.0;
                -Complex::from_polar(1.0, PI * m / (2.0 * n)) * warped
            })
            .collect();

        let fs2c = Complex::new(fs2, 0.0);
        let digital_poles: Vec<Complex<f64>> = analog_poles
            .iter()
            .map(|&p| (fs2c + p) / (fs2c - p))
            .collect();
        let denominator_gain = analog_poles
            .iter()
            .fold(Complex::new(1.0, 0.0), |acc, &p| acc * (fs2c - p));
        let gain = warped.powi(order as i32) / denominator_gain.re;

        // All zeros of the digital low-pass sit at z = -1
        let zeros = vec![Complex::new(-1.0, 0.0); order];

        let b = poly(&zeros).into_iter().map(|c| c.re * gain).collect();
        let a = poly(&digital_poles).into_iter().map(|c| c.re).collect();

        Ok(Self { b, a })
    }

    pub fn numerator(&self) -> &[f64] {
        &self.b
    }

    pub fn denominator(&self) -> &[f64] {
        &self.a
    }

    pub fn order(&self) -> usize {
        self.a.len() - 1
    }

    /// Samples of odd extension added on each side before filtering
    fn pad_len(&self) -> usize {
        3 * self.a.len().max(self.b.len())
    }

    /// Forward-backward filtering; the output has the same length as the input
    pub fn filtfilt(&self, input: &[f64]) -> Vec<f64> {
        let len = input.len();
        if len == 0 {
            return Vec::new();
        }

        let pad = self.pad_len().min(len - 1);
        let extended = odd_extend(input, pad);
        let zi = self.steady_state();

        let x0 = extended[0];
        let mut forward = self.lfilter(&extended, zi.iter().map(|z| z * x0).collect());
        forward.reverse();

        let y0 = forward[0];
        let mut backward = self.lfilter(&forward, zi.iter().map(|z| z * y0).collect());
        backward.reverse();

        backward[pad..pad + len].to_vec()
    }

    /// Single causal pass (transposed direct form II)
    fn lfilter(&self, input: &[f64], mut state: Vec<f64>) -> Vec<f64> {
        let n = self.a.len();
        let mut output = Vec::with_capacity(input.len());

        for &x in input {
            let y = self.b[0] * x + state[0];
            for i in 0..n - 2 {
                state[i] = self.b[i + 1] * x + state[i + 1] - self.a[i + 1] * y;
            }
            state[n - 2] = self.b[n - 1] * x - self.a[n - 1] * y;
            output.push(y);
        }

        output
    }

    /// Filter state reached after a long unit-step input
    ///
    /// Scaling it by the first sample starts a pass in steady state, which
    /// removes the start-up transient for slowly varying input.
    fn steady_state(&self) -> Vec<f64> {
        let n = self.a.len();
        let dc_gain = self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>();

        let mut zi = vec![0.0; n - 1];
        let mut carry = 0.0;
        for i in (0..n - 1).rev() {
            carry += self.b[i + 1] - self.a[i + 1] * dc_gain;
            zi[i] = carry;
        }
        zi
    }
}

/// Monic polynomial coefficients (highest power first) with the given roots
fn poly(roots: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut coeffs = vec![Complex::new(1.0, 0.0)];
    for &root in roots {
        let mut next = coeffs.clone();
        next.push(Complex::new(0.0, 0.0));
        for i in 1..next.len() {
            next[i] -= root * coeffs[i - 1];
        }
        coeffs = next;
    }
    coeffs
}

/// Reflect the signal through its end points (odd extension)
fn odd_extend(input: &[f64], pad: usize) -> Vec<f64> {
    let len = input.len();
    let first = input[0];
    let last = input[len - 1];

    let mut out = Vec::with_capacity(len + 2 * pad);
    out.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
    out.extend_from_slice(input);
    out.extend((1..=pad).map(|i| 2.0 * last - input[len - 1 - i]));
    out
}
