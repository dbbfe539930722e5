//! Track loading: decode, downmix, resample, measure tempo

use std::path::Path;
use stride_analysis::{TempoAnalyzer, TempoEstimate};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Errors that can occur during track loading
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Resample error: {0}")]
    Resample(String),
    #[error("Track contains no audio")]
    Empty,
    #[error("Could not determine track tempo")]
    Tempo,
}

/// Track metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub duration_secs: f64,
    /// Rate of the file before resampling
    pub source_sample_rate: u32,
    pub channels: u16,
}

/// A decoded mono track ready for playback
#[derive(Debug, Clone)]
pub struct LoadedTrack {
    /// Mono samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub metadata: TrackMetadata,
    pub tempo: TempoEstimate,
}

impl LoadedTrack {
    pub fn bpm(&self) -> f32 {
        self.tempo.bpm
    }
}

/// Audio file loader using Symphonia
pub struct TrackLoader {
    target_sample_rate: u32,
}

impl Default for TrackLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackLoader {
    /// Create a new track loader with default 44.1kHz sample rate
    pub fn new() -> Self {
        Self::with_sample_rate(44100)
    }

    /// Loader producing audio at `target_sample_rate` (normally the output device rate)
    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Load, decode and analyze an audio file
    ///
    /// Nothing is returned unless the whole pipeline succeeds, including tempo
    /// detection.
    pub fn load(&self, path: &Path) -> Result<LoadedTrack, LoadError> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let source_sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let mut channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut metadata = Self::extract_metadata(&mut format, path);

        let mut mono: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    tracing::debug!("stopping decode: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!("skipping undecodable packet: {}", e);
                    continue;
                }
            };

            let spec = *decoded.spec();
            channels = spec.channels.count() as u16;
            let duration = decoded.capacity() as u64;

            let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
            sample_buf.copy_interleaved_ref(decoded);
            downmix_into(&mut mono, sample_buf.samples(), channels as usize);
        }

        if mono.is_empty() {
            return Err(LoadError::Empty);
        }

        metadata.source_sample_rate = source_sample_rate;
        metadata.channels = channels;
        metadata.duration_secs = mono.len() as f64 / source_sample_rate as f64;

        let samples = if source_sample_rate != self.target_sample_rate {
            self.resample(&mono, source_sample_rate)?
        } else {
            mono
        };

        let tempo = TempoAnalyzer::new(self.target_sample_rate)
            .analyze(&samples)
            .ok_or(LoadError::Tempo)?;

        tracing::info!(
            title = %metadata.title,
            bpm = tempo.bpm,
            duration = metadata.duration_secs,
            "track decoded"
        );

        Ok(LoadedTrack {
            samples,
            sample_rate: self.target_sample_rate,
            metadata,
            tempo,
        })
    }

    /// Resample mono audio to the target sample rate
    fn resample(&self, samples: &[f32], source_rate: u32) -> Result<Vec<f32>, LoadError> {
        use rubato::{FftFixedInOut, Resampler};

        let frames = samples.len();
        let mut resampler = FftFixedInOut::<f32>::new(
            source_rate as usize,
            self.target_sample_rate as usize,
            1024,
            1,
        )
        .map_err(|e| LoadError::Resample(e.to_string()))?;

        let chunk_size = resampler.input_frames_next();
        let expected =
            (frames as u64 * self.target_sample_rate as u64 / source_rate as u64) as usize;
        let mut output: Vec<f32> = Vec::with_capacity(expected);

        let mut pos = 0;
        while pos + chunk_size <= frames {
            let resampled = resampler
                .process(&[&samples[pos..pos + chunk_size]], None)
                .map_err(|e| LoadError::Resample(e.to_string()))?;
            output.extend(resampled.into_iter().flatten());
            pos += chunk_size;
        }

        // Zero-pad the tail and keep only its proportional share
        if pos < frames {
            let remaining = frames - pos;
            let mut padded = samples[pos..].to_vec();
            padded.resize(chunk_size, 0.0);

            let resampled = resampler
                .process(&[padded.as_slice()], None)
                .map_err(|e| LoadError::Resample(e.to_string()))?;
            let tail_frames = remaining * self.target_sample_rate as usize / source_rate as usize;
            if let Some(channel) = resampled.into_iter().next() {
                output.extend(channel.into_iter().take(tail_frames));
            }
        }

        Ok(output)
    }

    fn extract_metadata(
        format: &mut Box<dyn symphonia::core::formats::FormatReader>,
        path: &Path,
    ) -> TrackMetadata {
        let mut metadata = TrackMetadata {
            title: path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Unknown")
                .to_string(),
            artist: "Unknown".to_string(),
            ..Default::default()
        };

        if let Some(meta) = format.metadata().current() {
            for tag in meta.tags() {
                match tag.std_key {
                    Some(symphonia::core::meta::StandardTagKey::TrackTitle) => {
                        metadata.title = tag.value.to_string();
                    }
                    Some(symphonia::core::meta::StandardTagKey::Artist) => {
                        metadata.artist = tag.value.to_string();
                    }
                    _ => {}
                }
            }
        }

        metadata
    }
}

/// Average interleaved frames into mono
fn downmix_into(mono: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels <= 1 {
        mono.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    mono.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::path::PathBuf;

    /// Write a click track at `bpm` as 16-bit WAV, identical on every channel
    fn write_click_track(
        name: &str,
        bpm: f32,
        seconds: f32,
        sample_rate: u32,
        channels: u16,
    ) -> PathBuf {
        let path = std::env::temp_dir().join(format!("stride-{}-{}.wav", name, std::process::id()));
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();

        let len = (seconds * sample_rate as f32) as usize;
        let beat = (60.0 / bpm * sample_rate as f32) as usize;
        let click_len = sample_rate as usize / 50;
        for i in 0..len {
            let offset = i % beat;
            let value = if offset < click_len {
                let t = offset as f32 / sample_rate as f32;
                (2.0 * PI * 1000.0 * t).sin() * (-t * 200.0).exp() * 0.8
            } else {
                0.0
            };
            for _ in 0..channels {
                writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_load_click_track() {
        let path = write_click_track("load", 120.0, 10.0, 44100, 2);
        let track = TrackLoader::with_sample_rate(44100).load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(track.sample_rate, 44100);
        assert_eq!(track.samples.len(), 441000);
        assert_eq!(track.metadata.channels, 2);
        assert!((track.metadata.duration_secs - 10.0).abs() < 1e-6);
        assert!((track.bpm() - 120.0).abs() < 3.0, "bpm = {}", track.bpm());
    }

    #[test]
    fn test_loading_twice_is_idempotent() {
        let path = write_click_track("twice", 120.0, 8.0, 44100, 1);
        let loader = TrackLoader::with_sample_rate(44100);
        let first = loader.load(&path).unwrap();
        let second = loader.load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(first.samples, second.samples);
        assert_eq!(first.tempo, second.tempo);
        assert_eq!(first.metadata, second.metadata);
    }

    #[test]
    fn test_resamples_to_target_rate() {
        let path = write_click_track("resample", 120.0, 10.0, 22050, 1);
        let track = TrackLoader::with_sample_rate(44100).load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(track.sample_rate, 44100);
        assert_eq!(track.metadata.source_sample_rate, 22050);
        let expected = 441000usize;
        assert!(track.samples.len().abs_diff(expected) < 4096, "len = {}", track.samples.len());
        assert!((track.bpm() - 120.0).abs() < 3.0, "bpm = {}", track.bpm());
    }

    #[test]
    fn test_short_track_has_no_tempo() {
        let path = write_click_track("short", 120.0, 1.0, 44100, 1);
        let result = TrackLoader::with_sample_rate(44100).load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(LoadError::Tempo)));
    }

    #[test]
    fn test_missing_file() {
        let result = TrackLoader::new().load(Path::new("/nonexistent/stride/track.wav"));
        assert!(matches!(result, Err(LoadError::Io(_))));
    }

    #[test]
    fn test_downmix_averages_channels() {
        let mut mono = Vec::new();
        downmix_into(&mut mono, &[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }
}
