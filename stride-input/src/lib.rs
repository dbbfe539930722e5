//! Input handling for stride
//!
//! - Sensors: accelerometer datagram and heart-rate line formats
//! - Ingress: threads turning sockets and devices into typed samples
//! - Commands: operator command parsing

mod commands;
mod ingress;
mod sensors;

pub use commands::{Command, CommandError, HELP};
pub use ingress::{AccelerometerListener, HeartRateReader, IngressStats};
pub use sensors::{parse_accelerometer, parse_heart_rate, SampleError, HEART_RATE_RANGE};
