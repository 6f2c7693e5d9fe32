//! Wire commands understood by the TCLab firmware.
//!
//! The firmware speaks a line-oriented ASCII protocol: one command per line,
//! one reply per command. Numeric replies are plain decimal floats.

use super::Channel;
use crate::error::{LabError, LabResult};
use std::fmt;

/// A single firmware command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `T1` / `T2`: read a temperature sensor.
    Temperature(Channel),
    /// `Q1 v` / `Q2 v`: set heater output in percent.
    SetHeater(Channel, f64),
    /// `R1` / `R2`: read heater output back.
    ReadHeater(Channel),
    /// `P1 v` / `P2 v`: set the heater power limit.
    SetPowerLimit(Channel, f64),
    /// `LED v`: drive the LED at a percentage.
    Led(f64),
    /// `VER`: firmware version string.
    Version,
    /// `X`: stop, heaters off.
    Stop,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Temperature(ch) => write!(f, "T{ch}"),
            Command::SetHeater(ch, value) => write!(f, "Q{ch} {value}"),
            Command::ReadHeater(ch) => write!(f, "R{ch}"),
            Command::SetPowerLimit(ch, value) => write!(f, "P{ch} {value}"),
            Command::Led(value) => write!(f, "LED {value}"),
            Command::Version => f.write_str("VER"),
            Command::Stop => f.write_str("X"),
        }
    }
}

impl Command {
    /// Wire form of the command, without the line terminator.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }

    /// Interpret a numeric reply to this command.
    pub fn parse_value(&self, response: &str) -> LabResult<f64> {
        let trimmed = response.trim();
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| LabError::Protocol {
                command: self.to_wire(),
                response: trimmed.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(Command::Temperature(Channel::One).to_wire(), "T1");
        assert_eq!(Command::SetHeater(Channel::Two, 50.0).to_wire(), "Q2 50");
        assert_eq!(Command::SetHeater(Channel::One, 12.5).to_wire(), "Q1 12.5");
        assert_eq!(Command::ReadHeater(Channel::Two).to_wire(), "R2");
        assert_eq!(Command::SetPowerLimit(Channel::One, 200.0).to_wire(), "P1 200");
        assert_eq!(Command::Led(50.0).to_wire(), "LED 50");
        assert_eq!(Command::Version.to_wire(), "VER");
        assert_eq!(Command::Stop.to_wire(), "X");
    }

    #[test]
    fn test_parse_value_accepts_padded_numbers() {
        let cmd = Command::Temperature(Channel::One);
        assert_eq!(cmd.parse_value(" 23.45\r").unwrap(), 23.45);
        assert_eq!(cmd.parse_value("1.5E1").unwrap(), 15.0);
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let cmd = Command::ReadHeater(Channel::Two);
        match cmd.parse_value("Stop") {
            Err(LabError::Protocol { command, response }) => {
                assert_eq!(command, "R2");
                assert_eq!(response, "Stop");
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
        assert!(cmd.parse_value("NaN").is_err());
    }
}
