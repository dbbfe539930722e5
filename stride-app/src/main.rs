//! stride - music that keeps pace with a runner
//!
//! Listens to a wearable accelerometer and a heart-rate monitor, turns them
//! into a playback speed for the loaded track, and takes operator commands on
//! stdin.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::{select, unbounded, Receiver};
use tracing_subscriber::EnvFilter;

use stride_analysis::{CadencePipeline, PipelineConfig};
use stride_audio::{AudioBuffer, CpalSinkFactory, Player, PlayerError, PlayerEvent, RenderConfig};
use stride_control::{
    AccelerometerConsumer, ControlState, HeartRateConsumer, HrBaseline, SpeedController,
    SpeedLimits,
};
use stride_input::{AccelerometerListener, Command, CommandError, HeartRateReader, HELP};
use stride_library::{Config, TrackLoader};

/// Used when the output device cannot be queried
const FALLBACK_SAMPLE_RATE: u32 = 44100;

#[derive(Parser, Debug)]
#[command(name = "stride")]
#[command(about = "Music tempo that follows your running cadence and heart rate")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// UDP address for accelerometer datagrams
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Serial device streaming heart-rate lines (e.g. /dev/rfcomm0)
    #[arg(long)]
    heart_rate_device: Option<PathBuf>,

    /// Track to load at startup
    #[arg(long)]
    track: Option<PathBuf>,

    /// Heart rate after warming up (bpm)
    #[arg(long)]
    warmed_hr: Option<f32>,

    /// Upper bound on playback speed
    #[arg(long)]
    max_speed: Option<f32>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Flags take precedence over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(addr) = self.listen {
            config.accel_listen = addr;
        }
        if let Some(ref device) = self.heart_rate_device {
            config.heart_rate_device = Some(device.clone());
        }
        if let Some(warmed) = self.warmed_hr {
            config.warmed_hr = warmed;
        }
        if let Some(max) = self.max_speed {
            config.max_speed = Some(max);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let mut config = if config_path.exists() {
        Config::load_from(&config_path)
            .with_context(|| format!("failed to read config {}", config_path.display()))?
    } else {
        Config::default()
    };
    cli.apply(&mut config);

    let mut runtime = Runtime::start(config, config_path)?;

    let initial = cli.track.clone().or_else(|| {
        runtime
            .config
            .last_track
            .clone()
            .filter(|path| path.exists())
    });
    if let Some(path) = initial {
        runtime.load(&path);
    }

    println!("stride ready - type 'help' for commands");
    let result = run_commands(&mut runtime);

    runtime.shutdown();
    result
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Everything alive for the lifetime of the process
struct Runtime {
    config: Config,
    config_path: PathBuf,
    control: Arc<ControlState>,
    shutdown: Arc<AtomicBool>,
    loader: TrackLoader,
    player: Player,
    /// Threads that observe the shutdown flag and are joined on exit
    threads: Vec<(&'static str, JoinHandle<()>)>,
}

impl Runtime {
    fn start(config: Config, config_path: PathBuf) -> anyhow::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let control = Arc::new(ControlState::new(HrBaseline::new(
            config.resting_hr,
            config.warmed_hr,
        )));
        let poll = Duration::from_millis(config.poll_ms.max(1));
        let mut threads = Vec::new();

        // Accelerometer: UDP ingress -> cadence pipeline -> speed
        let (accel_tx, accel_rx) = unbounded();
        let listener = AccelerometerListener::bind(config.accel_listen, poll)
            .with_context(|| format!("failed to bind {}", config.accel_listen))?;
        {
            let shutdown = Arc::clone(&shutdown);
            threads.push((
                "accelerometer ingress",
                spawn("stride-accel-in", move || {
                    listener.run(accel_tx, shutdown);
                })?,
            ));
        }

        let pipeline = CadencePipeline::new(PipelineConfig {
            stride_floor: config.stride_floor,
            ..PipelineConfig::default()
        });
        let controller = SpeedController::new(SpeedLimits::new(config.min_speed, config.max_speed));
        let accel_consumer = AccelerometerConsumer::new(pipeline, controller, Arc::clone(&control));
        {
            let shutdown = Arc::clone(&shutdown);
            threads.push((
                "accelerometer consumer",
                spawn("stride-cadence", move || {
                    accel_consumer.run(accel_rx, shutdown, poll);
                })?,
            ));
        }

        // Heart rate: serial lines -> baseline. The reader blocks on the
        // device, so it is left detached rather than joined.
        let (hr_tx, hr_rx) = unbounded();
        match config.heart_rate_device {
            Some(ref device) => match File::open(device) {
                Ok(file) => {
                    tracing::info!(device = %device.display(), "reading heart rate");
                    let reader = HeartRateReader::new(BufReader::new(file));
                    let shutdown = Arc::clone(&shutdown);
                    spawn("stride-hr-in", move || {
                        reader.run(hr_tx, shutdown);
                    })?;
                }
                Err(e) => {
                    tracing::warn!("heart-rate device {} unavailable: {}", device.display(), e);
                }
            },
            None => tracing::info!("no heart-rate device configured"),
        }

        let hr_consumer = HeartRateConsumer::new(Arc::clone(&control));
        {
            let shutdown = Arc::clone(&shutdown);
            threads.push((
                "heart-rate consumer",
                spawn("stride-heart", move || {
                    hr_consumer.run(hr_rx, shutdown, poll);
                })?,
            ));
        }

        // Audio output and loading share the device rate
        let sink = CpalSinkFactory::default();
        let sample_rate = sink.sample_rate().unwrap_or_else(|e| {
            tracing::warn!("{}; assuming {} Hz", e, FALLBACK_SAMPLE_RATE);
            FALLBACK_SAMPLE_RATE
        });
        let player = Player::new(
            Arc::clone(&control),
            Arc::new(sink),
            RenderConfig {
                chunk_ms: config.chunk_ms,
            },
            Arc::clone(&shutdown),
        );

        Ok(Self {
            loader: TrackLoader::with_sample_rate(sample_rate),
            config,
            config_path,
            control,
            shutdown,
            player,
            threads,
        })
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::SetMode(mode) => {
                let previous = self.control.set_mode(mode);
                tracing::info!(from = %previous, to = %mode, "mode changed");
                println!("Mode: {}", mode);
            }
            Command::Load(path) => self.load(&path),
            Command::Play => match self.player.play() {
                Ok(()) => println!("Playing"),
                Err(PlayerError::NotLoaded) => println!("Load a track first"),
                Err(e) => {
                    tracing::error!("failed to start playback: {}", e);
                    println!("Playback failed: {}", e);
                }
            },
            Command::Stop => {
                if self.player.stop() {
                    println!("Stopped");
                }
            }
            Command::Status => {
                println!("{}", self.control.snapshot());
                println!("Player:      {:?}", self.player.state());
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
    }

    /// Decode and install a track; on failure nothing changes
    fn load(&mut self, path: &Path) {
        println!("Loading {} ...", path.display());
        match self.loader.load(path) {
            Ok(track) => {
                let bpm = track.bpm();
                println!(
                    "Loaded \"{}\" by {} ({:.1} BPM, {:.0}s)",
                    track.metadata.title, track.metadata.artist, bpm, track.metadata.duration_secs
                );
                self.player
                    .load(AudioBuffer::new(track.samples, track.sample_rate));
                self.control.set_track_bpm(Some(bpm));

                self.config.last_track = Some(path.to_path_buf());
                if let Err(e) = self.config.save_to(&self.config_path) {
                    tracing::warn!("failed to save config: {}", e);
                }
            }
            Err(e) => {
                tracing::error!("failed to load {}: {}", path.display(), e);
                println!("Failed to load track: {}", e);
            }
        }
    }

    fn shutdown(mut self) {
        tracing::info!("shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
        self.player.stop();

        for (name, handle) in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("{} thread panicked", name);
            }
        }
    }
}

fn spawn<F>(name: &str, f: F) -> anyhow::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .with_context(|| format!("failed to spawn {} thread", name))
}

/// Forward stdin lines; the thread ends with stdin
fn spawn_stdin_reader() -> anyhow::Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    spawn("stride-stdin", move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("stdin read error: {}", e);
                    break;
                }
            }
        }
    })?;
    Ok(rx)
}

fn run_commands(runtime: &mut Runtime) -> anyhow::Result<()> {
    let lines = spawn_stdin_reader()?;
    let events = runtime.player.events();

    loop {
        select! {
            recv(lines) -> line => {
                let Ok(line) = line else {
                    // stdin closed
                    break;
                };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => runtime.execute(command),
                    Err(CommandError::Empty) => {}
                    Err(e) => println!("{} (type 'help')", e),
                }
            }
            recv(events) -> event => match event {
                Ok(PlayerEvent::Finished) => println!("Track finished"),
                Ok(PlayerEvent::Stopped) => tracing::debug!("play session stopped"),
                Ok(PlayerEvent::DeviceFailed(message)) => {
                    println!("Audio output failed: {}", message);
                }
                Err(_) => break,
            },
        }
    }

    Ok(())
}
