//! Sensor sample types shared by the cadence pipeline

use std::time::Instant;

/// Standard gravity subtracted from the acceleration magnitude (m/s²)
pub const GRAVITY: f64 = 9.8;

/// One 3-axis accelerometer reading, stamped when it arrived
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerometerSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub arrival: Instant,
}

impl AccelerometerSample {
    pub fn new(x: f32, y: f32, z: f32, arrival: Instant) -> Self {
        Self { x, y, z, arrival }
    }

    /// Euclidean norm of the acceleration vector
    pub fn magnitude(&self) -> f64 {
        let (x, y, z) = (self.x as f64, self.y as f64, self.z as f64);
        (x * x + y * y + z * z).sqrt()
    }

    /// Magnitude with gravity removed, the signal fed to the stride filter
    pub fn dynamic_magnitude(&self) -> f64 {
        self.magnitude() - GRAVITY
    }
}

/// Stride rate measured after one sample
///
/// `rate` is `None` when there was not enough history or the detected rate was
/// implausible. That is distinct from a measured rate of zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrideRateObservation {
    pub rate: Option<f32>,
    pub timestamp: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude() {
        let sample = AccelerometerSample::new(3.0, 4.0, 0.0, Instant::now());
        assert!((sample.magnitude() - 5.0).abs() < 1e-9);
        assert!((sample.dynamic_magnitude() - (5.0 - GRAVITY)).abs() < 1e-9);
    }

    #[test]
    fn test_at_rest_is_near_zero() {
        let sample = AccelerometerSample::new(0.0, 0.0, 9.8, Instant::now());
        assert!(sample.dynamic_magnitude().abs() < 1e-6);
    }
}
