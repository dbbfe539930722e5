//! Wire formats of the two sensors

use std::time::Instant;
use stride_analysis::AccelerometerSample;
use stride_control::HeartRateSample;
use thiserror::Error;

/// Plausible heart rates (bpm)
pub const HEART_RATE_RANGE: std::ops::RangeInclusive<u32> = 20..=250;

/// Malformed sensor input; the sample is dropped
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("not UTF-8")]
    Encoding,
    #[error("expected 3 comma-separated values, got {0}")]
    FieldCount(usize),
    #[error("invalid number: {0:?}")]
    Number(String),
    #[error("no heart rate in line")]
    NoDigits,
    #[error("heart rate {0} out of range")]
    OutOfRange(u32),
}

/// Parse an `x,y,z` accelerometer datagram
pub fn parse_accelerometer(
    payload: &[u8],
    arrival: Instant,
) -> Result<AccelerometerSample, SampleError> {
    let text = std::str::from_utf8(payload).map_err(|_| SampleError::Encoding)?;
    let fields: Vec<&str> = text.trim().split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(SampleError::FieldCount(fields.len()));
    }

    let mut axes = [0.0f32; 3];
    for (axis, field) in axes.iter_mut().zip(&fields) {
        *axis = field
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| SampleError::Number(field.to_string()))?;
    }

    Ok(AccelerometerSample::new(axes[0], axes[1], axes[2], arrival))
}

/// Parse a heart-rate line: the first run of digits is the rate
pub fn parse_heart_rate(line: &str, arrival: Instant) -> Result<HeartRateSample, SampleError> {
    let digits: String = line
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return Err(SampleError::NoDigits);
    }

    // Saturate absurdly long digit runs so they fail the range check
    let bpm = digits.parse::<u32>().unwrap_or(u32::MAX);
    if !HEART_RATE_RANGE.contains(&bpm) {
        return Err(SampleError::OutOfRange(bpm));
    }

    Ok(HeartRateSample::new(bpm, arrival))
}
