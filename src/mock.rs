//! A mock, useful to test the gateway without the actual serial ports.
//!
//! Each time a mock device is opened an in-memory pipe is created.
//! The session gets one end, and the other end (the "wire") is handed
//! to whoever holds the [`MockWires`], playing the part of the hardware.

use std::{
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf},
    sync::mpsc,
    time::timeout,
};
use tracing::{debug, info};

use crate::{endpoint::DeviceTemplate, error::Error};

const DEFAULT_MAX_BUF_SIZE: usize = 4096;

/// An opened mock device.
#[derive(Debug)]
pub struct MockDevice {
    inner: DuplexStream,
    pub(crate) readiness_wait: bool,
}

impl MockDevice {
    /// A connected pair: the device, and the wire end the "hardware" uses.
    pub fn pair(max_buf_size: usize, readiness_wait: bool) -> (Self, DuplexStream) {
        let (inner, wire) = tokio::io::duplex(max_buf_size);

        (
            Self {
                inner,
                readiness_wait,
            },
            wire,
        )
    }
}

impl AsyncRead for MockDevice {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockDevice {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Receives the wire end of every mock device opened from a [`MockBuilder`].
#[derive(Debug)]
pub struct MockWires(mpsc::UnboundedReceiver<DuplexStream>);

impl MockWires {
    /// Wait for the next device to be opened, giving up after the given duration.
    pub async fn next_within(&mut self, duration: Duration) -> Option<DuplexStream> {
        timeout(duration, self.0.recv()).await.ok().flatten()
    }

    /// The wire of a device which was already opened, if any.
    pub fn try_next(&mut self) -> Option<DuplexStream> {
        self.0.try_recv().ok()
    }
}

/// Template for [`MockDevice`]s.
///
/// Clones share availability, so a test may keep a clone around
/// to make a registered mock fail to open.
#[derive(Debug, Clone)]
pub struct MockBuilder {
    name: String,
    readiness_wait: bool,
    max_buf_size: usize,
    available: Arc<AtomicBool>,
    wires: mpsc::UnboundedSender<DuplexStream>,
}

impl MockBuilder {
    /// A new mock template, along with where the wire ends of opened devices arrive.
    pub fn new(name: &str) -> (Self, MockWires) {
        let (wires, wires_receiver) = mpsc::unbounded_channel();

        (
            Self {
                name: name.into(),
                readiness_wait: true,
                max_buf_size: DEFAULT_MAX_BUF_SIZE,
                available: Arc::new(AtomicBool::new(true)),
                wires,
            },
            MockWires(wires_receiver),
        )
    }

    /// Make opened devices claim they cannot take part in readiness waits.
    pub fn without_readiness_wait(mut self) -> Self {
        self.readiness_wait = false;
        self
    }

    /// How many bytes may be in flight in each direction of the in-memory pipe.
    /// Small values force partial writes.
    pub fn set_max_buf_size(mut self, max_buf_size: usize) -> Self {
        self.max_buf_size = max_buf_size;
        self
    }

    /// Make subsequent opens succeed or fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl DeviceTemplate for MockBuilder {
    type Device = MockDevice;

    fn open(&self) -> Result<Self::Device, Error> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::DeviceUnavailable {
                device: self.name.clone(),
                problem: "mock marked as unavailable".into(),
            });
        }

        info!(%self.name, "Opening mock");

        let (device, wire) = MockDevice::pair(self.max_buf_size, self.readiness_wait);

        if self.wires.send(wire).is_err() {
            debug!(%self.name, "Nobody is holding the wires of this mock");
        }

        Ok(device)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
