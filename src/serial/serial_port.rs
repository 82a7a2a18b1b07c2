use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::{endpoint::DeviceTemplate, error::Error, serial::SerialSettings};

/// Holds the path and line settings of a serial port.
///
/// This is the template from which sessions open their own [`SerialStream`].
#[derive(Debug, Clone)]
pub struct SerialPortBuilder {
    path: String,
    settings: SerialSettings,
}

fn try_create_serial_port(path: &str, settings: &SerialSettings) -> Result<SerialStream, Error> {
    let serial_stream = tokio_serial::new(path, settings.baud)
        .data_bits(settings.data_bits)
        .parity(settings.parity.into())
        .stop_bits(settings.stop_bits)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| Error::DeviceUnavailable {
            device: path.to_owned(),
            problem: e.to_string(),
        })?;

    // Exclusivity is handled by the pairing's lock.
    // Holding TIOCEXCL would make a second client fail on open instead.
    #[cfg(unix)]
    let serial_stream = {
        let mut serial_stream = serial_stream;
        if let Err(e) = serial_stream.set_exclusive(false) {
            tracing::warn!(%path, ?e, "Could not clear exclusive mode");
        }
        serial_stream
    };

    Ok(serial_stream)
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The path should likely be along the lines of `/dev/ttyS0` on unix, and `COMx` on Windows.
    pub fn new(path: &str, settings: SerialSettings) -> Self {
        Self {
            path: path.to_string(),
            settings,
        }
    }

    /// The line settings used when opening.
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

impl DeviceTemplate for SerialPortBuilder {
    type Device = SerialStream;

    fn open(&self) -> Result<Self::Device, Error> {
        debug!(%self.path, %self.settings, "Opening port");

        try_create_serial_port(&self.path, &self.settings)
    }

    fn name(&self) -> &str {
        &self.path
    }
}
