//! Track library for stride - loading, tempo analysis and configuration

mod config;
mod loader;

pub use config::{Config, ConfigError, DEFAULT_ACCEL_LISTEN};
pub use loader::{LoadError, LoadedTrack, TrackLoader, TrackMetadata};
