//! Audio playback for stride
//!
//! - Player: chunked rendering of a loaded track at the live playback speed
//! - Timestretcher: phase vocoder for pitch-independent tempo
//! - Sink: audio output devices

mod player;
mod sink;
pub mod timestretcher;

pub use player::{
    AudioBuffer, PlaybackState, Player, PlayerError, PlayerEvent, RenderConfig, DEFAULT_CHUNK_MS,
};
pub use sink::{AudioSink, CpalSink, CpalSinkFactory, RenderError, SinkFactory};
pub use timestretcher::{stretched_len, FftSize, PhaseVocoder, TimeStretch};
