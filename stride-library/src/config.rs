//! Simple configuration persistence for stride
//!
//! A `key=value` text file holding sensor endpoints, heart-rate defaults and
//! render tuning. Command-line flags override whatever is loaded here.

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_ACCEL_LISTEN: &str = "0.0.0.0:12345";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("line {line}: expected key=value")]
    MissingSeparator { line: usize },
    #[error("line {line}: invalid value for {key}: {value:?}")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// UDP address accelerometer datagrams arrive on
    pub accel_listen: SocketAddr,
    /// Serial/RFCOMM device streaming heart-rate lines
    pub heart_rate_device: Option<PathBuf>,
    /// Heart rate after warming up (bpm)
    pub warmed_hr: f32,
    /// Resting heart rate until one is measured (bpm)
    pub resting_hr: f32,
    /// Stride rates below this are rejected (strides/minute)
    pub stride_floor: f32,
    /// Playback speed floor
    pub min_speed: f32,
    /// Optional playback speed ceiling
    pub max_speed: Option<f32>,
    /// Render chunk length (ms)
    pub chunk_ms: u32,
    /// Sensor receive timeout (ms)
    pub poll_ms: u64,
    /// Track loaded on the previous run
    pub last_track: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accel_listen: SocketAddr::from(([0, 0, 0, 0], 12345)),
            heart_rate_device: None,
            warmed_hr: 120.0,
            resting_hr: 60.0,
            stride_floor: stride_analysis::LIVE_STRIDE_FLOOR,
            min_speed: 0.1,
            max_speed: None,
            chunk_ms: 100,
            poll_ms: 100,
            last_track: None,
        }
    }
}

impl Config {
    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.serialize();
        fs::write(path, content)
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stride")
            .join("config.txt")
    }

    /// Lenient parse: bad lines are logged and skipped
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();
        for (index, line) in content.lines().enumerate() {
            if let Err(e) = config.apply_line(index + 1, line) {
                tracing::warn!("ignoring config entry: {}", e);
            }
        }
        config
    }

    /// Strict parse: the first bad line is an error
    pub fn parse_strict(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (index, line) in content.lines().enumerate() {
            config.apply_line(index + 1, line)?;
        }
        Ok(config)
    }

    fn apply_line(&mut self, line_no: usize, line: &str) -> Result<(), ConfigError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let (key, value) = line
            .split_once('=')
            .ok_or(ConfigError::MissingSeparator { line: line_no })?;
        let key = key.trim();
        let value = value.trim();

        let invalid = || ConfigError::InvalidValue {
            line: line_no,
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "accel_listen" => self.accel_listen = parse_value(value).ok_or_else(invalid)?,
            "heart_rate_device" => self.heart_rate_device = optional_path(value),
            "warmed_hr" => self.warmed_hr = positive(value).ok_or_else(invalid)?,
            "resting_hr" => self.resting_hr = positive(value).ok_or_else(invalid)?,
            "stride_floor" => self.stride_floor = positive(value).ok_or_else(invalid)?,
            "min_speed" => self.min_speed = positive(value).ok_or_else(invalid)?,
            "max_speed" => {
                self.max_speed = if value.is_empty() {
                    None
                } else {
                    Some(positive(value).ok_or_else(invalid)?)
                }
            }
            "chunk_ms" => self.chunk_ms = parse_value(value).ok_or_else(invalid)?,
            "poll_ms" => self.poll_ms = parse_value(value).ok_or_else(invalid)?,
            "last_track" => self.last_track = optional_path(value),
            _ => {} // Ignore unknown keys
        }

        Ok(())
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec![
            "# stride configuration".to_string(),
            format!("accel_listen={}", self.accel_listen),
        ];

        if let Some(ref device) = self.heart_rate_device {
            lines.push(format!("heart_rate_device={}", device.display()));
        }
        lines.push(format!("warmed_hr={}", self.warmed_hr));
        lines.push(format!("resting_hr={}", self.resting_hr));
        lines.push(format!("stride_floor={}", self.stride_floor));
        lines.push(format!("min_speed={}", self.min_speed));
        if let Some(max) = self.max_speed {
            lines.push(format!("max_speed={}", max));
        }
        lines.push(format!("chunk_ms={}", self.chunk_ms));
        lines.push(format!("poll_ms={}", self.poll_ms));
        if let Some(ref track) = self.last_track {
            lines.push(format!("last_track={}", track.display()));
        }

        lines.join("\n")
    }
}

fn parse_value<T: FromStr>(value: &str) -> Option<T> {
    value.parse().ok()
}

fn positive(value: &str) -> Option<f32> {
    value
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

fn optional_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}
