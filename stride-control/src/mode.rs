//! Training modes

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown mode: {0}")]
pub struct UnknownMode(pub String);

/// Operator-selected training mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Standing still, collecting the resting heart rate
    Resting,
    /// Music follows cadence exactly
    #[default]
    Warmup,
    /// Music nudges the runner faster until the target heart rate
    Workout,
    /// Music nudges the runner slower back toward resting
    SlowDown,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Resting, Mode::Warmup, Mode::Workout, Mode::SlowDown];

    /// Compact encoding for atomic storage
    pub fn as_u8(self) -> u8 {
        match self {
            Mode::Resting => 0,
            Mode::Warmup => 1,
            Mode::Workout => 2,
            Mode::SlowDown => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Mode::Resting),
            1 => Some(Mode::Warmup),
            2 => Some(Mode::Workout),
            3 => Some(Mode::SlowDown),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Resting => "Resting",
            Mode::Warmup => "Warmup",
            Mode::Workout => "Workout",
            Mode::SlowDown => "Slow Down",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    /// Case-insensitive; accepts "slow down", "slow-down" and "slowdown"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "resting" | "rest" => Ok(Mode::Resting),
            "warmup" => Ok(Mode::Warmup),
            "workout" => Ok(Mode::Workout),
            "slowdown" => Ok(Mode::SlowDown),
            _ => Err(UnknownMode(s.trim().to_string())),
        }
    }
}
