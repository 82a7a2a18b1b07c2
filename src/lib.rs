#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// What a device must offer to be bridged,
/// and the lock guarding exclusive use of it.
pub mod endpoint;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;

/// Mocked serial devices.
pub mod mock;

/// The pairings of serial devices and TCP ports, set up at startup.
pub mod registry;

/// Serial port settings and driver.
pub mod serial;

/// Accepts clients and spawns a session for each.
pub mod server;

/// The per client worker which relays bytes between socket and device.
pub mod session;
