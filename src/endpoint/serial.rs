//! A serial port endpoint.

use tokio_serial::SerialStream;

use super::Device;

// Both the unix and the Windows flavours of the stream are driven by the
// runtime's reactor, so the default readiness capability holds.
impl Device for SerialStream {}
