//! Sensor ingress threads
//!
//! Each source stamps arrival time on receipt, parses, and forwards typed
//! samples into a channel. Malformed input is dropped here and never reaches
//! the consumers.

use crate::sensors::{parse_accelerometer, parse_heart_rate};
use crossbeam_channel::Sender;
use std::io::{self, BufRead};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stride_analysis::AccelerometerSample;
use stride_control::HeartRateSample;

/// Largest accepted datagram
const MAX_DATAGRAM: usize = 1024;

/// Counters reported when an ingress loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngressStats {
    pub received: u64,
    pub dropped: u64,
}

/// Accelerometer datagrams over UDP
pub struct AccelerometerListener {
    socket: UdpSocket,
}

impl AccelerometerListener {
    /// Bind `addr`; reads time out after `poll` so shutdown is noticed
    pub fn bind(addr: SocketAddr, poll: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(poll.max(Duration::from_millis(1))))?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn run(self, tx: Sender<AccelerometerSample>, shutdown: Arc<AtomicBool>) -> IngressStats {
        let mut stats = IngressStats::default();
        let mut buf = [0u8; MAX_DATAGRAM];

        if let Ok(addr) = self.socket.local_addr() {
            tracing::info!(%addr, "listening for accelerometer data");
        }

        while !shutdown.load(Ordering::Relaxed) {
            let len = match self.socket.recv_from(&mut buf) {
                Ok((len, _)) => len,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    tracing::error!("accelerometer socket error: {}", e);
                    break;
                }
            };
            let arrival = Instant::now();

            match parse_accelerometer(&buf[..len], arrival) {
                Ok(sample) => {
                    stats.received += 1;
                    if tx.send(sample).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    stats.dropped += 1;
                    tracing::debug!("dropping accelerometer datagram: {}", e);
                }
            }
        }

        tracing::info!(
            received = stats.received,
            dropped = stats.dropped,
            "accelerometer ingress stopped"
        );
        stats
    }
}

/// Heart-rate lines from a serial device or any other reader
pub struct HeartRateReader<R> {
    reader: R,
}

impl<R: BufRead> HeartRateReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Forward parsed lines until EOF, a read error, disconnect or shutdown
    ///
    /// A blocking device is only checked for shutdown between lines.
    pub fn run(mut self, tx: Sender<HeartRateSample>, shutdown: Arc<AtomicBool>) -> IngressStats {
        let mut stats = IngressStats::default();
        let mut line = String::new();

        while !shutdown.load(Ordering::Relaxed) {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    tracing::info!("heart-rate source closed");
                    break;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    stats.dropped += 1;
                    tracing::debug!("dropping heart-rate line: {}", e);
                    continue;
                }
                Err(e) => {
                    tracing::error!("heart-rate read error: {}", e);
                    break;
                }
            }
            let arrival = Instant::now();

            match parse_heart_rate(&line, arrival) {
                Ok(sample) => {
                    stats.received += 1;
                    if tx.send(sample).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    stats.dropped += 1;
                    tracing::debug!("dropping heart-rate line {:?}: {}", line.trim(), e);
                }
            }
        }

        tracing::info!(
            received = stats.received,
            dropped = stats.dropped,
            "heart-rate ingress stopped"
        );
        stats
    }
}
