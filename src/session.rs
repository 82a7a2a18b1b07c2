use std::{fmt::Display, io, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    time::{sleep_until, timeout, Instant},
};
use tracing::{debug, info, trace, warn};

use crate::endpoint::{Device, ExclusivityLock};

/// How many bytes a single read may move.
pub const CHUNK_SIZE: usize = 8192;

/// How long a read may wait on a device which cannot take part in readiness waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Stands in for deadlines too far away to represent.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// One of the two ends a session bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The serial device.
    Device,

    /// The TCP client.
    Socket,
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Device => write!(f, "device"),
            Endpoint::Socket => write!(f, "socket"),
        }
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum Ended {
    /// Another session of the same pairing holds the lock.
    Busy,

    /// Nothing was transferred for the whole idle timeout.
    IdleTimeout,

    /// An endpoint hung up.
    Eof(Endpoint),

    /// Reading from or writing to an endpoint failed.
    Failed {
        /// Where it failed.
        endpoint: Endpoint,

        /// What failed.
        error: io::Error,
    },
}

impl Display for Ended {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ended::Busy => write!(f, "resource busy"),
            Ended::IdleTimeout => write!(f, "timed out"),
            Ended::Eof(endpoint) => write!(f, "EOF from {endpoint}"),
            Ended::Failed { endpoint, error } => write!(f, "{endpoint} failed: {error}"),
        }
    }
}

/// A buffer holding at most one chunk which has been read but not yet fully written.
#[derive(Debug)]
struct Chunk {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
}

impl Chunk {
    fn new(size: usize) -> Self {
        Self {
            buf: vec![0; size].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    fn pending(&self) -> usize {
        self.end - self.start
    }

    fn is_empty(&self) -> bool {
        self.pending() == 0
    }
}

/// What one step of a [`Direction`] did.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Read(usize),
    Wrote(usize),
    Eof,

    /// A polled read found nothing.
    Nothing,
}

/// Moves bytes one way: from `source` into the chunk, and from the chunk into `sink`.
///
/// While the chunk has pending bytes the source is not read,
/// so a slow sink throttles a fast source.
struct Direction<R, W> {
    source: R,
    source_endpoint: Endpoint,
    sink: W,
    sink_endpoint: Endpoint,
    chunk: Chunk,
    poll_interval: Option<Duration>,
    transferred: u64,
}

impl<R, W> Direction<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    fn new(source: (R, Endpoint), sink: (W, Endpoint), chunk_size: usize) -> Self {
        Self {
            source: source.0,
            source_endpoint: source.1,
            sink: sink.0,
            sink_endpoint: sink.1,
            chunk: Chunk::new(chunk_size),
            poll_interval: None,
            transferred: 0,
        }
    }

    fn polled(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = Some(poll_interval);
        self
    }

    /// Perform a single read or a single write, depending on whether bytes are pending.
    ///
    /// Cancel safe: dropping the future before completion leaves the chunk untouched.
    async fn step(&mut self) -> Result<Step, Ended> {
        if self.chunk.is_empty() {
            let read = match self.poll_interval {
                Some(interval) => {
                    match timeout(interval, self.source.read(&mut self.chunk.buf)).await {
                        Ok(read) => read,
                        Err(_elapsed) => return Ok(Step::Nothing),
                    }
                }
                None => self.source.read(&mut self.chunk.buf).await,
            };

            match read {
                Ok(0) => Err(Ended::Eof(self.source_endpoint)),
                Ok(n) => {
                    self.chunk.start = 0;
                    self.chunk.end = n;
                    Ok(Step::Read(n))
                }
                Err(error) => Err(Ended::Failed {
                    endpoint: self.source_endpoint,
                    error,
                }),
            }
        } else {
            let pending = &self.chunk.buf[self.chunk.start..self.chunk.end];

            match self.sink.write(pending).await {
                Ok(0) => Err(Ended::Failed {
                    endpoint: self.sink_endpoint,
                    error: io::ErrorKind::WriteZero.into(),
                }),
                Ok(n) => {
                    self.chunk.start += n;
                    self.transferred += n as u64;
                    Ok(Step::Wrote(n))
                }
                Err(error) => Err(Ended::Failed {
                    endpoint: self.sink_endpoint,
                    error,
                }),
            }
        }
    }
}

/// The worker for one accepted client.
///
/// Owns the opened device and the accepted socket.
/// Both are closed when [`BridgeSession::run`] returns, whatever the reason.
pub struct BridgeSession<D, S> {
    device: D,
    socket: S,
    lock: ExclusivityLock,
    idle_timeout: Duration,
    chunk_size: usize,
}

impl<D, S> BridgeSession<D, S>
where
    D: Device,
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// A session which will bridge the given device and socket
    /// once it holds the pairing's lock.
    pub fn new(device: D, socket: S, lock: ExclusivityLock, idle_timeout: Duration) -> Self {
        Self {
            device,
            socket,
            lock,
            idle_timeout,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Use a different transfer chunk size.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Take the lock, bridge until something ends the session, then clean up.
    pub async fn run(self) -> Ended {
        let Some(guard) = self.lock.try_lock() else {
            warn!("Resource busy, closing connection");
            return Ended::Busy;
        };

        info!("Session started");

        let polled = !self.device.supports_readiness_wait();
        let (device_rx, device_tx) = tokio::io::split(self.device);
        let (socket_rx, socket_tx) = tokio::io::split(self.socket);

        let mut to_socket = Direction::new(
            (device_rx, Endpoint::Device),
            (socket_tx, Endpoint::Socket),
            self.chunk_size,
        );
        if polled {
            debug!("Device is polled");
            to_socket = to_socket.polled(POLL_INTERVAL);
        }

        let mut to_device = Direction::new(
            (socket_rx, Endpoint::Socket),
            (device_tx, Endpoint::Device),
            self.chunk_size,
        );

        let ended = bridge(&mut to_socket, &mut to_device, self.idle_timeout).await;

        match &ended {
            Ended::Failed { .. } => warn!(%ended, "Session ending"),
            _ => info!(%ended, "Session ending"),
        }
        info!(
            to_socket = to_socket.transferred,
            to_device = to_device.transferred,
            "Bytes transferred"
        );

        drop(guard);

        let Direction {
            source: device_rx,
            sink: mut socket_tx,
            ..
        } = to_socket;
        let Direction {
            source: socket_rx,
            sink: device_tx,
            ..
        } = to_device;

        drop(device_tx);
        drop(device_rx);

        if let Err(e) = socket_tx.shutdown().await {
            debug!(?e, "Socket shutdown");
        }
        drop(socket_tx);
        drop(socket_rx);

        ended
    }
}

fn idle_deadline(idle_timeout: Duration) -> Instant {
    let now = Instant::now();

    now.checked_add(idle_timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

type DeviceToSocket<D, S> = Direction<ReadHalf<D>, WriteHalf<S>>;
type SocketToDevice<D, S> = Direction<ReadHalf<S>, WriteHalf<D>>;

async fn bridge<D, S>(
    to_socket: &mut DeviceToSocket<D, S>,
    to_device: &mut SocketToDevice<D, S>,
    idle_timeout: Duration,
) -> Ended
where
    D: AsyncRead + AsyncWrite,
    S: AsyncRead + AsyncWrite,
{
    let mut deadline = idle_deadline(idle_timeout);

    loop {
        let step = tokio::select! {
            step = to_socket.step() => step,
            step = to_device.step() => step,
            _ = sleep_until(deadline) => return Ended::IdleTimeout,
        };

        match step {
            Ok(Step::Nothing) => continue,
            Ok(step) => {
                trace!(?step);
                deadline = idle_deadline(idle_timeout);
            }
            Err(ended) => return ended,
        }
    }
}
