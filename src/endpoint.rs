use std::{fmt::Display, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError},
};
use uuid::Uuid;

use crate::error::Error;

pub(crate) mod mock;
pub(crate) mod serial;

/// An opened device, i.e. a serial line we may read from and write to.
///
/// Reads returning zero bytes mean the device hung up.
/// Writes may be partial.
/// Dropping the device closes it.
pub trait Device: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Whether the device can take part in waiting for readiness alongside the socket.
    ///
    /// If not, the session falls back to reading the device with short timeouts.
    fn supports_readiness_wait(&self) -> bool {
        true
    }
}

/// Something which holds the settings of a device and knows how to open it.
///
/// A template is never itself opened.
/// Each session gets its own freshly opened [`Device`].
pub trait DeviceTemplate: Send + Sync + 'static {
    /// The kind of device this template opens.
    type Device: Device;

    /// Open and configure a new instance of the device.
    fn open(&self) -> Result<Self::Device, Error>;

    /// The name of the device, for logging.
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ExclusivityLockId(Uuid);

impl Display for ExclusivityLockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sessions of the same pairing share (via clone) this lock.
///
/// Only one of them may hold it at a time.
/// Acquiring never waits: a session which cannot get it right away gives up.
#[derive(Debug, Clone)]
pub struct ExclusivityLock {
    inner: Arc<Semaphore>,
    id: ExclusivityLockId,
}

impl Default for ExclusivityLock {
    fn default() -> Self {
        Self {
            inner: Arc::new(Semaphore::new(1)),
            id: ExclusivityLockId(Uuid::new_v4()),
        }
    }
}

/// Proof of holding an [`ExclusivityLock`].
/// The lock is released when this is dropped.
#[derive(Debug)]
pub struct ExclusivityGuard {
    _permit: OwnedSemaphorePermit,
}

impl ExclusivityLock {
    /// Try to take the lock without waiting.
    /// Returns `None` if somebody else holds it.
    pub fn try_lock(&self) -> Option<ExclusivityGuard> {
        match self.inner.clone().try_acquire_owned() {
            Ok(permit) => Some(ExclusivityGuard { _permit: permit }),
            // The semaphore is never closed.
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => None,
        }
    }

    /// Whether some session currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.inner.available_permits() == 0
    }
}

impl Display for ExclusivityLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lock {}", self.id)
    }
}
