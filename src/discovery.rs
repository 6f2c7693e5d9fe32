//! Serial port discovery for TCLab boards.
//!
//! A requested address that names a port exactly selects that port. Anything
//! else is a case-insensitive regex matched against the port name and USB
//! product string (taken literally when it is not a valid regex). The
//! remaining ports are matched against the USB vendor/product IDs of the
//! boards the TCLab ships on.

use crate::error::{LabError, LabResult};
use regex::RegexBuilder;
use tracing::{debug, trace};

/// A USB vendor/product pair, with `pid: None` matching any product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    /// USB vendor ID
    pub vid: u16,
    /// USB product ID, or any product of the vendor
    pub pid: Option<u16>,
}

/// Boards known to carry the TCLab firmware, in match priority order.
pub const KNOWN_BOARDS: &[(UsbId, &str)] = &[
    (UsbId { vid: 0x2341, pid: Some(0x0043) }, "Arduino Uno"),
    (UsbId { vid: 0x2341, pid: Some(0x0001) }, "Arduino Uno"),
    (UsbId { vid: 0x16D0, pid: Some(0x0613) }, "Arduino Uno"),
    (UsbId { vid: 0x1A86, pid: Some(0x7523) }, "NHduino"),
    (UsbId { vid: 0x2341, pid: Some(0x8036) }, "Arduino Leonardo"),
    (UsbId { vid: 0x2A03, pid: None }, "Arduino.org device"),
];

/// Description used for USB serial devices not in [`KNOWN_BOARDS`].
pub const UNKNOWN_DEVICE: &str = "unknown device";

/// USB details of a serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDetails {
    /// USB vendor ID
    pub vid: u16,
    /// USB product ID
    pub pid: u16,
    /// Product string, when the OS reports one
    pub product: Option<String>,
}

/// A serial port as seen by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub name: String,
    /// USB details, `None` for non-USB ports
    pub usb: Option<UsbDetails>,
}

/// A port identified as a TCLab board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDevice {
    /// Port name to open
    pub port: String,
    /// Board description
    pub device: String,
}

impl UsbId {
    fn matches(&self, usb: &UsbDetails) -> bool {
        self.vid == usb.vid && self.pid.map_or(true, |pid| pid == usb.pid)
    }
}

fn identify(usb: &UsbDetails) -> &'static str {
    KNOWN_BOARDS
        .iter()
        .find(|(id, _)| id.matches(usb))
        .map_or(UNKNOWN_DEVICE, |(_, name)| name)
}

/// Pick the port named `pattern`, or else the first port that matches it and
/// looks like a TCLab board.
///
/// # Errors
///
/// `LabError::Connection` when no port qualifies.
pub fn find_arduino(pattern: Option<&str>, ports: &[PortInfo]) -> LabResult<FoundDevice> {
    if let Some(address) = pattern {
        if let Some(port) = ports.iter().find(|p| p.name == address) {
            let device = port.usb.as_ref().map_or(UNKNOWN_DEVICE, identify);
            debug!("Port '{}' requested by name ({})", port.name, device);
            return Ok(FoundDevice {
                port: port.name.clone(),
                device: device.to_string(),
            });
        }
    }

    let filter = pattern.map(|p| {
        RegexBuilder::new(p)
            .case_insensitive(true)
            .build()
            .or_else(|_| {
                RegexBuilder::new(&regex::escape(p))
                    .case_insensitive(true)
                    .build()
            })
    });
    let filter = filter
        .transpose()
        .map_err(|e| LabError::Connection(format!("Invalid port pattern: {e}")))?;

    for port in ports {
        trace!("Checking port '{}'", port.name);

        if let Some(re) = &filter {
            let product = port
                .usb
                .as_ref()
                .and_then(|u| u.product.as_deref())
                .unwrap_or_default();
            if !re.is_match(&port.name) && !re.is_match(product) {
                continue;
            }
        }

        match &port.usb {
            Some(usb) => {
                let device = identify(usb);
                debug!(
                    "Port '{}' is {} ({:04X}:{:04X})",
                    port.name, device, usb.vid, usb.pid
                );
                return Ok(FoundDevice {
                    port: port.name.clone(),
                    device: device.to_string(),
                });
            }
            None => debug!("Port '{}' is not a USB port", port.name),
        }
    }

    let seen: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
    Err(LabError::Connection(format!(
        "No Arduino device found{} (ports: [{}])",
        pattern.map(|p| format!(" matching '{p}'")).unwrap_or_default(),
        seen.join(", ")
    )))
}

/// List the system's serial ports.
#[cfg(feature = "instrument_serial")]
pub fn available() -> LabResult<Vec<PortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| LabError::Connection(format!("Failed to enumerate serial ports: {e}")))?;

    Ok(ports
        .into_iter()
        .map(|port| {
            let usb = match port.port_type {
                serialport::SerialPortType::UsbPort(info) => Some(UsbDetails {
                    vid: info.vid,
                    pid: info.pid,
                    product: info.product,
                }),
                _ => None,
            };
            PortInfo {
                name: port.port_name,
                usb,
            }
        })
        .collect())
}

/// List the system's serial ports.
#[cfg(not(feature = "instrument_serial"))]
pub fn available() -> LabResult<Vec<PortInfo>> {
    Err(LabError::FeatureNotEnabled("instrument_serial".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(name: &str, vid: u16, pid: u16, product: Option<&str>) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            usb: Some(UsbDetails {
                vid,
                pid,
                product: product.map(str::to_string),
            }),
        }
    }

    fn native(name: &str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            usb: None,
        }
    }

    #[test]
    fn test_identifies_known_boards() {
        let ports = [native("/dev/ttyS0"), usb("/dev/ttyACM0", 0x2341, 0x0043, None)];
        let found = find_arduino(None, &ports).unwrap();
        assert_eq!(found.port, "/dev/ttyACM0");
        assert_eq!(found.device, "Arduino Uno");
    }

    #[test]
    fn test_vendor_wildcard() {
        let ports = [usb("COM4", 0x2A03, 0x0043, None)];
        assert_eq!(find_arduino(None, &ports).unwrap().device, "Arduino.org device");
    }

    #[test]
    fn test_unknown_usb_device_still_qualifies() {
        let ports = [usb("/dev/ttyUSB0", 0x0403, 0x6001, Some("FT232R"))];
        assert_eq!(find_arduino(None, &ports).unwrap().device, UNKNOWN_DEVICE);
    }

    #[test]
    fn test_pattern_filters_by_name_or_product() {
        let ports = [
            usb("/dev/ttyACM0", 0x2341, 0x0043, Some("Arduino Uno")),
            usb("/dev/ttyUSB3", 0x1A86, 0x7523, Some("USB2.0-Serial")),
        ];
        assert_eq!(find_arduino(Some("ttyusb3"), &ports).unwrap().device, "NHduino");
        assert_eq!(
            find_arduino(Some("uno"), &ports).unwrap().port,
            "/dev/ttyACM0"
        );
    }

    #[test]
    fn test_nonsense_pattern_is_connection_error() {
        let ports = [usb("/dev/ttyACM0", 0x2341, 0x0043, None)];
        let err = find_arduino(Some("nonsense"), &ports).unwrap_err();
        assert!(err.is_connection());
        assert!(err.to_string().contains("No Arduino device found"));
    }

    #[test]
    fn test_no_usb_ports_is_connection_error() {
        assert!(find_arduino(None, &[native("/dev/ttyS0")])
            .unwrap_err()
            .is_connection());
        assert!(find_arduino(None, &[]).unwrap_err().is_connection());
    }

    #[test]
    fn test_exact_name_beats_longer_match() {
        let ports = [
            usb("COM10", 0x2341, 0x0043, None),
            usb("COM1", 0x1A86, 0x7523, None),
        ];
        let found = find_arduino(Some("COM1"), &ports).unwrap();
        assert_eq!(found.port, "COM1");
        assert_eq!(found.device, "NHduino");

        let ports = [
            usb("/dev/ttyACM10", 0x2341, 0x0043, None),
            usb("/dev/ttyACM1", 0x2341, 0x0043, None),
        ];
        assert_eq!(
            find_arduino(Some("/dev/ttyACM1"), &ports).unwrap().port,
            "/dev/ttyACM1"
        );
    }

    #[test]
    fn test_windows_device_path_by_name() {
        let ports = [
            usb(r"\\.\COM13", 0x2341, 0x0043, None),
            usb(r"\\.\COM3", 0x2341, 0x0043, None),
        ];
        assert_eq!(
            find_arduino(Some(r"\\.\COM3"), &ports).unwrap().port,
            r"\\.\COM3"
        );

        let err = find_arduino(Some(r"\\.\COM7"), &ports).unwrap_err();
        assert!(err.to_string().contains("No Arduino device found"), "{err}");
    }

    #[test]
    fn test_exact_name_accepts_non_usb_port() {
        let ports = [native("/dev/ttyS0")];
        let found = find_arduino(Some("/dev/ttyS0"), &ports).unwrap();
        assert_eq!(found.device, UNKNOWN_DEVICE);
    }

    #[test]
    fn test_invalid_regex_is_matched_literally() {
        let ports = [usb("/dev/tty(lab)0", 0x2341, 0x0043, None)];
        assert_eq!(
            find_arduino(Some("(lab"), &ports).unwrap().port,
            "/dev/tty(lab)0"
        );
        assert!(find_arduino(Some("(unclosed"), &[])
            .unwrap_err()
            .is_connection());
    }
}
