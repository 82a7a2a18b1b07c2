use std::io;

use thiserror::Error;

/// Errors thay may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration could not be turned into pairings.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// A setting which has no default was not given.
    #[error("Couldn't find `{0}` entry in the configuration")]
    MissingKey(String),

    /// A pairing could not listen on its TCP port.
    #[error("Could not listen on TCP port {port}")]
    Bind {
        /// The port we tried to bind.
        port: u16,

        /// What the OS said.
        #[source]
        source: io::Error,
    },

    /// The serial device could not be opened.
    #[error("Could not open `{device}`, problem: {problem}")]
    DeviceUnavailable {
        /// The device path or name.
        device: String,

        /// Why it could not be opened.
        problem: String,
    },

    /// IO related errors.
    #[error("Underlying IO problem")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns the message if this is a [`Error::BadConfig`],
    /// otherwise hands the error back.
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(v) = self {
            Ok(v)
        } else {
            Err(self)
        }
    }
}
