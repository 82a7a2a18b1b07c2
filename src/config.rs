use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    time::Duration,
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    serial::{self, SerialSettings},
};

const DEFAULT_BAUD: u32 = 9600;
const DEFAULT_DATA_BITS: u8 = 8;
const DEFAULT_STOP_BITS: u8 = 1;
const DEFAULT_PARITY: &str = "none";
const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// One week.
const MAX_TIMEOUT_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Where the configuration is read from if no path is given.
#[cfg(unix)]
pub fn default_path() -> PathBuf {
    PathBuf::from("/etc/serial-proxy.ron")
}

/// Where the configuration is read from if no path is given.
#[cfg(not(unix))]
pub fn default_path() -> PathBuf {
    PathBuf::from("serial-proxy.ron")
}

/// Settings which may be given globally (see [`Config::defaults`])
/// and overridden per serial port (see [`Config::ports`]).
///
/// Anything left out falls back to the next level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    /// The TCP port clients connect to for this serial port.
    pub net_port: Option<u16>,

    /// Seconds without any transfer before a session is closed.
    pub timeout: Option<u64>,

    /// Baud rate.
    pub baud: Option<u32>,

    /// Data bits, 5 to 8.
    pub data_bits: Option<u8>,

    /// Stop bits, 1 or 2.
    pub stop_bits: Option<u8>,

    /// One of `"none"`, `"even"`, `"odd"`.
    pub parity: Option<String>,

    /// Use this device path instead of the one derived from the port number.
    pub device: Option<String>,
}

/// The configuration used for running the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Comma separated serial port numbers to expose, e.g. `"1,2"`.
    pub comm_ports: Option<String>,

    /// The address listeners bind to.
    /// All interfaces if not given.
    pub listen_address: Option<IpAddr>,

    /// Settings applying to all serial ports.
    pub defaults: PortSettings,

    /// Settings for specific serial ports, keyed by port number.
    pub ports: BTreeMap<u32, PortSettings>,
}

/// A fully resolved pairing of a serial device and a TCP port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingConfig {
    /// The serial port number as configured.
    pub comm_port: u32,

    /// The TCP port to listen on.
    /// Zero lets the OS pick one.
    pub net_port: u16,

    /// The platform path of the serial device.
    pub device: String,

    /// Line settings.
    pub serial: SerialSettings,

    /// How long a session may go without any transfer.
    pub timeout: Duration,
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Not valid RON: {e}")))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let p = p.as_ref();

        let s = std::fs::read_to_string(p).map_err(|e| {
            Error::BadConfig(format!("Could not read configuration file {p:?}: {e}"))
        })?;

        Self::deserialize(&s)
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            comm_ports: Some("1,2,3".into()),
            listen_address: None,
            defaults: PortSettings {
                timeout: Some(300),
                baud: Some(9600),
                data_bits: Some(8),
                stop_bits: Some(1),
                parity: Some("none".into()),
                ..Default::default()
            },
            ports: BTreeMap::from([
                (
                    1,
                    PortSettings {
                        net_port: Some(5331),
                        ..Default::default()
                    },
                ),
                (
                    2,
                    PortSettings {
                        net_port: Some(5332),
                        baud: Some(115200),
                        ..Default::default()
                    },
                ),
                (
                    3,
                    PortSettings {
                        net_port: Some(5333),
                        parity: Some("even".into()),
                        data_bits: Some(7),
                        device: Some("/dev/ttyUSB0".into()),
                        ..Default::default()
                    },
                ),
            ]),
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> Result<String, Error> {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::BadConfig(e.to_string()))
    }

    /// The address to listen on.
    pub fn listen_address(&self) -> IpAddr {
        self.listen_address.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    fn comm_port_numbers(&self) -> Result<Vec<u32>, Error> {
        let comm_ports = self
            .comm_ports
            .as_deref()
            .ok_or_else(|| Error::MissingKey("comm_ports".into()))?;

        let numbers = comm_ports
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.parse::<u32>() {
                Ok(0) | Err(_) => Err(Error::BadConfig(format!(
                    "`{entry}` in comm_ports is not a serial port number (counting from 1)"
                ))),
                Ok(number) => Ok(number),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if numbers.is_empty() {
            return Err(Error::BadConfig("comm_ports lists no serial ports".into()));
        }

        let duplicates = numbers.iter().duplicates().collect::<Vec<_>>();
        if !duplicates.is_empty() {
            return Err(Error::BadConfig(format!(
                "Serial ports listed more than once in comm_ports: {duplicates:?}"
            )));
        }

        Ok(numbers)
    }

    fn resolve(&self, comm_port: u32) -> Result<PairingConfig, Error> {
        let specific = self.ports.get(&comm_port).cloned().unwrap_or_default();
        let defaults = &self.defaults;

        macro_rules! setting {
            ($field:ident) => {
                specific.$field.or_else(|| defaults.$field.clone())
            };
        }

        let net_port = setting!(net_port)
            .ok_or_else(|| Error::MissingKey(format!("net_port (for comm port {comm_port})")))?;

        let timeout = setting!(timeout).unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if timeout == 0 {
            return Err(Error::BadConfig(format!(
                "The timeout of comm port {comm_port} must be at least one second"
            )));
        }
        if timeout > MAX_TIMEOUT_SECONDS {
            return Err(Error::BadConfig(format!(
                "The timeout of comm port {comm_port} is {timeout} seconds, \
                 at most {MAX_TIMEOUT_SECONDS} is allowed"
            )));
        }

        let parity = setting!(parity).unwrap_or_else(|| DEFAULT_PARITY.into());
        let serial = SerialSettings::resolve(
            setting!(baud).unwrap_or(DEFAULT_BAUD),
            &parity,
            setting!(data_bits).unwrap_or(DEFAULT_DATA_BITS),
            setting!(stop_bits).unwrap_or(DEFAULT_STOP_BITS),
        )
        .map_err(|e| match e {
            Error::BadConfig(problem) => {
                Error::BadConfig(format!("Unable to configure comm port {comm_port}: {problem}"))
            }
            other => other,
        })?;

        Ok(PairingConfig {
            comm_port,
            net_port,
            device: specific
                .device
                .unwrap_or_else(|| serial::device_name(comm_port)),
            serial,
            timeout: Duration::from_secs(timeout),
        })
    }

    /// Resolve every listed serial port into a [`PairingConfig`], in listed order.
    ///
    /// Fails on missing keys, settings the serial driver would not accept,
    /// and TCP ports used by more than one serial port.
    pub fn pairings(&self) -> Result<Vec<PairingConfig>, Error> {
        let pairings = self
            .comm_port_numbers()?
            .into_iter()
            .map(|comm_port| self.resolve(comm_port))
            .collect::<Result<Vec<_>, _>>()?;

        // Port zero asks the OS for any free port, so may be repeated.
        let duplicates = pairings
            .iter()
            .map(|pairing| pairing.net_port)
            .filter(|port| *port != 0)
            .duplicates()
            .collect::<Vec<_>>();

        if duplicates.is_empty() {
            Ok(pairings)
        } else {
            Err(Error::BadConfig(format!(
                "Each serial port needs its own TCP port. Shared: {duplicates:?}"
            )))
        }
    }
}
