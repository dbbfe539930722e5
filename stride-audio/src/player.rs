//! Track playback at the live playback speed
//!
//! A play session runs on its own thread. Every chunk it reads the shared
//! speed once, time-stretches `chunk_ms` of the track by it, writes the
//! result to the sink and advances the cursor by the unstretched length.
//! Stop and shutdown requests are honoured between chunks.

use crate::sink::{AudioSink, RenderError, SinkFactory};
use crate::timestretcher::{PhaseVocoder, TimeStretch};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use stride_control::ControlState;
use thiserror::Error;

/// Chunk duration used unless configured
pub const DEFAULT_CHUNK_MS: u32 = 100;

/// Playback state of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing loaded
    #[default]
    Idle,
    /// Track installed, not rendering
    Loaded,
    /// Session thread rendering
    Playing,
}

impl PlaybackState {
    fn as_u8(self) -> u8 {
        match self {
            PlaybackState::Idle => 0,
            PlaybackState::Loaded => 1,
            PlaybackState::Playing => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Loaded,
            2 => PlaybackState::Playing,
            _ => PlaybackState::Idle,
        }
    }
}

/// Notifications from play sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The cursor reached the end of the track
    Finished,
    /// The session was stopped by request or shutdown
    Stopped,
    /// The output device failed; the session ended
    DeviceFailed(String),
}

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("no track loaded")]
    NotLoaded,
    #[error("failed to start render thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Decoded mono audio, immutable once loaded
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds at normal speed
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Render settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    pub chunk_ms: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chunk_ms: DEFAULT_CHUNK_MS,
        }
    }
}

impl RenderConfig {
    /// Samples per chunk at `sample_rate`
    pub fn chunk_len(&self, sample_rate: u32) -> usize {
        (sample_rate as u64 * self.chunk_ms as u64 / 1000) as usize
    }
}

type StretcherFactory = Arc<dyn Fn() -> Box<dyn TimeStretch> + Send + Sync>;

/// State visible to both the player and its session thread
#[derive(Debug, Default)]
struct Shared {
    state: AtomicU8,
    /// Unstretched samples consumed in the current session
    position: AtomicUsize,
}

impl Shared {
    fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

struct Session {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Everything a session thread owns
struct RenderJob {
    buffer: AudioBuffer,
    config: RenderConfig,
    control: Arc<ControlState>,
    sink: Arc<dyn SinkFactory>,
    stretcher: Box<dyn TimeStretch>,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    events: Sender<PlayerEvent>,
}

/// Plays one track at a time, following the shared playback speed
pub struct Player {
    config: RenderConfig,
    control: Arc<ControlState>,
    sink: Arc<dyn SinkFactory>,
    stretcher: StretcherFactory,
    shutdown: Arc<AtomicBool>,
    shared: Arc<Shared>,
    buffer: Option<AudioBuffer>,
    session: Option<Session>,
    events_tx: Sender<PlayerEvent>,
    events_rx: Receiver<PlayerEvent>,
}

impl Player {
    pub fn new(
        control: Arc<ControlState>,
        sink: Arc<dyn SinkFactory>,
        config: RenderConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            control,
            sink,
            stretcher: Arc::new(|| Box::new(PhaseVocoder::default())),
            shutdown,
            shared: Arc::new(Shared::default()),
            buffer: None,
            session: None,
            events_tx,
            events_rx,
        }
    }

    /// Use a different time-stretcher for future sessions
    pub fn with_stretcher<F>(mut self, make: F) -> Self
    where
        F: Fn() -> Box<dyn TimeStretch> + Send + Sync + 'static,
    {
        self.stretcher = Arc::new(make);
        self
    }

    /// Session notifications
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.events_rx.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// Samples of the track consumed by the current or last session
    pub fn position(&self) -> usize {
        self.shared.position.load(Ordering::Relaxed)
    }

    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.buffer.as_ref()
    }

    /// Install a track, stopping any running session
    pub fn load(&mut self, buffer: AudioBuffer) {
        self.stop();
        tracing::info!(
            samples = buffer.len(),
            sample_rate = buffer.sample_rate(),
            "track loaded into player"
        );
        self.buffer = Some(buffer);
        self.shared.position.store(0, Ordering::Relaxed);
        self.shared.set_state(PlaybackState::Loaded);
    }

    /// Start playing from the beginning of the loaded track
    pub fn play(&mut self) -> Result<(), PlayerError> {
        match self.state() {
            PlaybackState::Idle => return Err(PlayerError::NotLoaded),
            PlaybackState::Playing => return Ok(()),
            PlaybackState::Loaded => {}
        }
        let buffer = self.buffer.clone().ok_or(PlayerError::NotLoaded)?;

        // A finished session still has a handle to reap
        self.reap();

        let stop = Arc::new(AtomicBool::new(false));
        let job = RenderJob {
            buffer,
            config: self.config,
            control: Arc::clone(&self.control),
            sink: Arc::clone(&self.sink),
            stretcher: (self.stretcher)(),
            shared: Arc::clone(&self.shared),
            stop: Arc::clone(&stop),
            shutdown: Arc::clone(&self.shutdown),
            events: self.events_tx.clone(),
        };

        self.shared.position.store(0, Ordering::Relaxed);
        self.shared.set_state(PlaybackState::Playing);

        let handle = match thread::Builder::new()
            .name("stride-render".into())
            .spawn(move || job.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.set_state(PlaybackState::Loaded);
                return Err(e.into());
            }
        };

        self.session = Some(Session { stop, handle });
        tracing::info!("playback started");
        Ok(())
    }

    /// Stop the running session, waiting for it to exit
    ///
    /// Returns whether a session was running.
    pub fn stop(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };

        let was_playing = self.state() == PlaybackState::Playing;
        session.stop.store(true, Ordering::Relaxed);
        if session.handle.join().is_err() {
            tracing::error!("render thread panicked");
        }

        if self.buffer.is_some() {
            self.shared.set_state(PlaybackState::Loaded);
        }
        if was_playing {
            tracing::info!("playback stopped");
        }
        was_playing
    }

    fn reap(&mut self) {
        if let Some(session) = self.session.take() {
            if session.handle.join().is_err() {
                tracing::error!("render thread panicked");
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

impl RenderJob {
    fn run(mut self) {
        let event = match self.sink.open() {
            Ok(mut sink) => self.render(sink.as_mut()),
            Err(e) => {
                tracing::error!("failed to open audio output: {}", e);
                PlayerEvent::DeviceFailed(e.to_string())
            }
        };

        self.shared.set_state(PlaybackState::Loaded);
        let _ = self.events.send(event);
    }

    fn render(&mut self, sink: &mut dyn AudioSink) -> PlayerEvent {
        if sink.sample_rate() != self.buffer.sample_rate() {
            tracing::warn!(
                track = self.buffer.sample_rate(),
                device = sink.sample_rate(),
                "track and device sample rates differ"
            );
        }

        let chunk_len = self.config.chunk_len(self.buffer.sample_rate());
        if chunk_len == 0 {
            tracing::warn!("chunk length is zero, stopping");
            return PlayerEvent::Stopped;
        }

        let samples = self.buffer.samples();
        let mut cursor = 0;

        loop {
            if self.stop.load(Ordering::Relaxed) || self.shutdown.load(Ordering::Relaxed) {
                return PlayerEvent::Stopped;
            }
            if cursor >= samples.len() {
                break;
            }

            let speed = self.control.speed();
            let end = (cursor + chunk_len).min(samples.len());
            let stretched = self.stretcher.stretch(&samples[cursor..end], speed);

            if let Err(e) = sink.write(&stretched) {
                tracing::error!("audio output failed: {}", e);
                return PlayerEvent::DeviceFailed(e.to_string());
            }

            cursor = end;
            self.shared.position.store(cursor, Ordering::Relaxed);
        }

        if let Err(e) = sink.finish() {
            tracing::warn!("failed to drain audio output: {}", e);
        }
        tracing::info!("track finished");
        PlayerEvent::Finished
    }
}


#[cfg(test)]
mod tests {
    use super::test_sink::*;
    use super::*;
    use std::time::Duration;

    const RATE: u32 = 8000;
    const WAIT: Duration = Duration::from_secs(10);

    fn tone(len: usize) -> AudioBuffer {
        let samples = (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 500.0 * i as f32 / RATE as f32).sin())
            .collect();
        AudioBuffer::new(samples, RATE)
    }

    fn player(
        factory: MemorySinkFactory,
        config: RenderConfig,
    ) -> (Player, Arc<ControlState>, Arc<Recorded>) {
        let control = Arc::new(ControlState::default());
        let recorded = Arc::clone(&factory.recorded);
        let player = Player::new(
            Arc::clone(&control),
            Arc::new(factory),
            config,
            Arc::new(AtomicBool::new(false)),
        );
        (player, control, recorded)
    }

    fn wait_for_writes(recorded: &Recorded, count: usize) {
        let start = std::time::Instant::now();
        while recorded.writes.load(Ordering::SeqCst) < count {
            assert!(start.elapsed() < WAIT, "timed out waiting for writes");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_state_machine() {
        let (mut player, _, _) = player(MemorySinkFactory::new(RATE), RenderConfig::default());
        assert_eq!(player.state(), PlaybackState::Idle);
        assert!(matches!(player.play(), Err(PlayerError::NotLoaded)));
        assert!(!player.stop());

        player.load(tone(800));
        assert_eq!(player.state(), PlaybackState::Loaded);
    }

    #[test]
    fn test_duration_follows_speed() {
        let (mut player, control, recorded) =
            player(MemorySinkFactory::new(RATE), RenderConfig::default());
        control.set_speed(2.0);
        player.load(tone(16000));
        let events = player.events();

        player.play().unwrap();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), PlayerEvent::Finished);

        assert_eq!(recorded.samples.lock().len(), 8000);
        assert_eq!(recorded.writes.load(Ordering::SeqCst), 20);
        assert_eq!(player.position(), 16000);
        assert_eq!(player.state(), PlaybackState::Loaded);
    }

    #[test]
    fn test_slow_speed_lengthens_output() {
        let (mut player, control, recorded) =
            player(MemorySinkFactory::new(RATE), RenderConfig::default());
        control.set_speed(0.5);
        player.load(tone(4000));
        let events = player.events();

        player.play().unwrap();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), PlayerEvent::Finished);
        assert_eq!(recorded.samples.lock().len(), 8000);
    }

    #[test]
    fn test_stop_halts_before_next_write() {
        let mut factory = MemorySinkFactory::new(RATE);
        factory.write_delay = Duration::from_millis(5);
        let (mut player, _, recorded) = player(factory, RenderConfig::default());
        player.load(tone(80000));

        player.play().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        wait_for_writes(&recorded, 1);

        assert!(player.stop());
        let writes = recorded.writes.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));

        assert_eq!(recorded.writes.load(Ordering::SeqCst), writes);
        assert!(writes < 100);
        assert_eq!(player.state(), PlaybackState::Loaded);
        assert_eq!(player.events().try_recv(), Ok(PlayerEvent::Stopped));
    }

    #[test]
    fn test_play_restarts_from_beginning() {
        let (mut player, _, recorded) =
            player(MemorySinkFactory::new(RATE), RenderConfig::default());
        player.load(tone(1600));
        let events = player.events();

        player.play().unwrap();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), PlayerEvent::Finished);
        player.play().unwrap();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), PlayerEvent::Finished);

        assert_eq!(recorded.samples.lock().len(), 3200);
    }

    #[test]
    fn test_play_while_playing_is_noop() {
        let mut factory = MemorySinkFactory::new(RATE);
        factory.write_delay = Duration::from_millis(5);
        let (mut player, _, recorded) = player(factory, RenderConfig::default());
        player.load(tone(8000));
        let events = player.events();

        player.play().unwrap();
        player.play().unwrap();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), PlayerEvent::Finished);
        assert_eq!(recorded.samples.lock().len(), 8000);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_load_while_playing_stops_first() {
        let mut factory = MemorySinkFactory::new(RATE);
        factory.write_delay = Duration::from_millis(5);
        let (mut player, _, recorded) = player(factory, RenderConfig::default());
        player.load(tone(80000));
        player.play().unwrap();
        wait_for_writes(&recorded, 1);

        player.load(tone(800));
        assert_eq!(player.state(), PlaybackState::Loaded);
        assert_eq!(player.position(), 0);
        assert_eq!(player.buffer().map(AudioBuffer::len), Some(800));
    }

    #[test]
    fn test_device_failure_ends_session() {
        let mut factory = MemorySinkFactory::new(RATE);
        factory.fail_on_write = Some(3);
        let (mut player, _, recorded) = player(factory, RenderConfig::default());
        player.load(tone(16000));
        let events = player.events();

        player.play().unwrap();
        assert_eq!(
            events.recv_timeout(WAIT).unwrap(),
            PlayerEvent::DeviceFailed("audio device error: unplugged".into())
        );
        assert_eq!(recorded.writes.load(Ordering::SeqCst), 2);
        assert_eq!(player.state(), PlaybackState::Loaded);
    }

    #[test]
    fn test_missing_device_reports_failure() {
        let mut factory = MemorySinkFactory::new(RATE);
        factory.fail_open = true;
        let (mut player, _, _) = player(factory, RenderConfig::default());
        player.load(tone(800));
        let events = player.events();

        player.play().unwrap();
        assert!(matches!(
            events.recv_timeout(WAIT).unwrap(),
            PlayerEvent::DeviceFailed(_)
        ));
        assert_eq!(player.state(), PlaybackState::Loaded);
    }

    #[test]
    fn test_zero_chunk_stops_immediately() {
        let (mut player, _, recorded) =
            player(MemorySinkFactory::new(RATE), RenderConfig { chunk_ms: 0 });
        player.load(tone(800));
        let events = player.events();

        player.play().unwrap();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), PlayerEvent::Stopped);
        assert_eq!(recorded.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_ends_session() {
        let mut factory = MemorySinkFactory::new(RATE);
        factory.write_delay = Duration::from_millis(5);
        let control = Arc::new(ControlState::default());
        let recorded = Arc::clone(&factory.recorded);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut player = Player::new(
            control,
            Arc::new(factory),
            RenderConfig::default(),
            Arc::clone(&shutdown),
        );
        player.load(tone(80000));
        let events = player.events();

        player.play().unwrap();
        wait_for_writes(&recorded, 1);
        shutdown.store(true, Ordering::Relaxed);

        assert_eq!(events.recv_timeout(WAIT).unwrap(), PlayerEvent::Stopped);
        assert_eq!(player.state(), PlaybackState::Loaded);
    }

    #[test]
    fn test_chunk_len() {
        assert_eq!(RenderConfig::default().chunk_len(44100), 4410);
        assert_eq!(RenderConfig { chunk_ms: 0 }.chunk_len(44100), 0);
    }
}
