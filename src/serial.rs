use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The serial port structure.
pub mod serial_port;

/// The baud rates a serial line may be configured with.
pub const BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600, 115200,
    230400,
];

/// Parity checking on a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    /// No parity bit.
    None,

    /// Even parity.
    Even,

    /// Odd parity.
    Odd,
}

impl FromStr for Parity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "even" => Ok(Self::Even),
            "odd" => Ok(Self::Odd),
            unknown => Err(Error::BadConfig(format!(
                "Unknown parity string `{unknown}`, expected one of `none`, `even`, `odd`"
            ))),
        }
    }
}

impl Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Parity::None => write!(f, "none"),
            Parity::Even => write!(f, "even"),
            Parity::Odd => write!(f, "odd"),
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        }
    }
}

/// Line settings of a serial device, all resolved to values
/// the serial driver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    /// Bits per second.
    pub baud: u32,

    /// Parity checking.
    pub parity: Parity,

    /// Data bits per character.
    pub data_bits: serialport::DataBits,

    /// Stop bits per character.
    pub stop_bits: serialport::StopBits,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud: 9600,
            parity: Parity::None,
            data_bits: serialport::DataBits::Eight,
            stop_bits: serialport::StopBits::One,
        }
    }
}

impl Display for SerialSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data_bits = match self.data_bits {
            serialport::DataBits::Five => 5,
            serialport::DataBits::Six => 6,
            serialport::DataBits::Seven => 7,
            serialport::DataBits::Eight => 8,
        };
        let stop_bits = match self.stop_bits {
            serialport::StopBits::One => 1,
            serialport::StopBits::Two => 2,
        };

        write!(f, "{} {data_bits}/{}/{stop_bits}", self.baud, self.parity)
    }
}

impl SerialSettings {
    /// Resolve raw settings, failing on anything the serial driver would not accept.
    pub fn resolve(baud: u32, parity: &str, data_bits: u8, stop_bits: u8) -> Result<Self, Error> {
        if !BAUD_RATES.contains(&baud) {
            return Err(Error::BadConfig(format!(
                "Unresolvable baud rate {baud}, expected one of {BAUD_RATES:?}"
            )));
        }

        let data_bits = match data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(Error::BadConfig(format!(
                    "Data bits must be between 5 and 8, got {other}"
                )))
            }
        };

        let stop_bits = match stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(Error::BadConfig(format!(
                    "Stop bits must be 1 or 2, got {other}"
                )))
            }
        };

        Ok(Self {
            baud,
            parity: parity.parse()?,
            data_bits,
            stop_bits,
        })
    }
}

/// The platform device name of the serial port with the given (one based) index.
#[cfg(unix)]
pub fn device_name(comm_port: u32) -> String {
    format!("/dev/ttyS{}", comm_port.saturating_sub(1))
}

/// The platform device name of the serial port with the given (one based) index.
#[cfg(not(unix))]
pub fn device_name(comm_port: u32) -> String {
    format!("COM{comm_port}")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn resolve_defaults() {
        let settings = SerialSettings::resolve(9600, "none", 8, 1).unwrap();

        assert_eq!(settings, SerialSettings::default());
        assert_eq!(settings.to_string(), "9600 8/none/1");
    }

    #[test]
    fn resolve_seven_even_two() {
        let settings = SerialSettings::resolve(115200, "even", 7, 2).unwrap();

        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.data_bits, serialport::DataBits::Seven);
        assert_eq!(settings.stop_bits, serialport::StopBits::Two);
    }

    #[test]
    fn unknown_parity() {
        let err = SerialSettings::resolve(9600, "mark", 8, 1)
            .unwrap_err()
            .try_into_bad_config()
            .unwrap();

        assert!(err.contains("mark"));
    }

    #[test]
    fn unresolvable_baud() {
        let err = SerialSettings::resolve(12345, "none", 8, 1)
            .unwrap_err()
            .try_into_bad_config()
            .unwrap();

        assert!(err.contains("12345"));

        // Zero is a hangup on most drivers, not a rate.
        assert!(SerialSettings::resolve(0, "none", 8, 1).is_err());
    }

    #[test]
    fn bits_out_of_range() {
        assert!(SerialSettings::resolve(9600, "none", 4, 1).is_err());
        assert!(SerialSettings::resolve(9600, "none", 9, 1).is_err());
        assert!(SerialSettings::resolve(9600, "none", 8, 0).is_err());
        assert!(SerialSettings::resolve(9600, "none", 8, 3).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn device_names_are_zero_based() {
        assert_eq!(device_name(1), "/dev/ttyS0");
        assert_eq!(device_name(4), "/dev/ttyS3");
    }
}
