use super::Transport;
use crate::error::{LabError, LabResult};
use std::time::Duration;
use tracing::debug;

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;

/// Serial adapter for USB-serial boards
///
/// This adapter wraps the serialport crate and performs blocking,
/// line-terminated request/reply I/O with a bounded wait per reply.
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Bound on waiting for one complete reply
    timeout: Duration,

    /// Delay after opening while the board resets
    settle: Duration,

    /// Line terminator for commands (e.g., "\r\n")
    line_terminator: String,

    /// Response line ending byte (e.g., b'\n')
    response_delimiter: u8,

    #[cfg(feature = "instrument_serial")]
    port: Option<Box<dyn SerialPort>>,
}

impl SerialAdapter {
    /// Create a new serial adapter with default settings
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyACM0", "COM3")
    /// * `baud_rate` - Communication speed (e.g., 9600, 115200)
    ///
    /// Default configuration:
    /// * timeout: 2 seconds
    /// * settle: 2 seconds
    /// * line_terminator: "\r\n"
    /// * response_delimiter: b'\n'
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: Duration::from_secs(2),
            settle: Duration::from_secs(2),
            line_terminator: "\r\n".to_string(),
            response_delimiter: b'\n',
            #[cfg(feature = "instrument_serial")]
            port: None,
        }
    }

    /// Set the reply timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the delay observed after opening the port
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Set the line terminator appended to each command
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Set the byte that ends a reply
    pub fn with_response_delimiter(mut self, delimiter: u8) -> Self {
        self.response_delimiter = delimiter;
        self
    }

    /// Port this adapter talks to.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Configured baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    #[cfg(feature = "instrument_serial")]
    fn port_mut(&mut self) -> LabResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(LabError::SessionClosed)
    }

    /// Read bytes until the delimiter or until `timeout` has elapsed.
    #[cfg(feature = "instrument_serial")]
    fn read_line(&mut self) -> LabResult<String> {
        use std::io::Read;

        let timeout = self.timeout;
        let delimiter = self.response_delimiter;
        let port = self.port_mut()?;

        let mut response = Vec::new();
        let mut buffer = [0u8; 1];
        let start = std::time::Instant::now();

        loop {
            if start.elapsed() > timeout {
                return Err(LabError::Timeout(timeout));
            }

            match port.read(&mut buffer) {
                Ok(0) => {
                    return Err(LabError::Connection(
                        "Unexpected EOF from serial port".to_string(),
                    ));
                }
                Ok(_) => {
                    if buffer[0] == delimiter {
                        break;
                    }
                    response.push(buffer[0]);
                }
                // Port timeout is shorter than our overall timeout
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(LabError::Io(e)),
            }
        }

        Ok(String::from_utf8_lossy(&response).trim().to_string())
    }

    #[cfg(feature = "instrument_serial")]
    fn write_commands(&mut self, commands: &[String]) -> LabResult<()> {
        use std::io::Write;

        let mut payload = String::new();
        for command in commands {
            payload.push_str(command);
            payload.push_str(&self.line_terminator);
        }

        let port = self.port_mut()?;
        port.write_all(payload.as_bytes())?;
        port.flush()?;
        Ok(())
    }
}

impl Transport for SerialAdapter {
    fn name(&self) -> &str {
        "serial"
    }

    fn connect(&mut self) -> LabResult<()> {
        #[cfg(feature = "instrument_serial")]
        {
            let port = serialport::new(&self.port_name, self.baud_rate)
                .timeout(Duration::from_millis(100)) // Internal read timeout
                .open()
                .map_err(|e| {
                    LabError::Connection(format!(
                        "Failed to open serial port '{}' at {} baud: {}",
                        self.port_name, self.baud_rate, e
                    ))
                })?;

            // Opening the port resets most Arduino boards
            std::thread::sleep(self.settle);
            port.clear(serialport::ClearBuffer::All).map_err(|e| {
                LabError::Connection(format!(
                    "Failed to clear serial port '{}': {}",
                    self.port_name, e
                ))
            })?;

            self.port = Some(port);
            debug!(
                "Serial port '{}' opened at {} baud",
                self.port_name, self.baud_rate
            );
            Ok(())
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            Err(LabError::FeatureNotEnabled("instrument_serial".to_string()))
        }
    }

    fn disconnect(&mut self) -> LabResult<()> {
        #[cfg(feature = "instrument_serial")]
        {
            if self.port.take().is_some() {
                debug!("Serial port '{}' closed", self.port_name);
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        #[cfg(feature = "instrument_serial")]
        {
            self.port.is_some()
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            false
        }
    }

    fn query(&mut self, command: &str) -> LabResult<String> {
        let mut replies = self.query_batch(&[command.to_string()])?;
        replies.pop().ok_or_else(|| LabError::Protocol {
            command: command.to_string(),
            response: String::new(),
        })
    }

    fn query_batch(&mut self, commands: &[String]) -> LabResult<Vec<String>> {
        #[cfg(feature = "instrument_serial")]
        {
            self.write_commands(commands)?;
            debug!("Sent serial commands: {:?}", commands);

            let mut replies = Vec::with_capacity(commands.len());
            for _ in commands {
                replies.push(self.read_line()?);
            }
            debug!("Received serial replies: {:?}", replies);
            Ok(replies)
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            let _ = commands;
            Err(LabError::FeatureNotEnabled("instrument_serial".to_string()))
        }
    }

    fn clear_input(&mut self) -> LabResult<()> {
        #[cfg(feature = "instrument_serial")]
        {
            self.port_mut()?
                .clear(serialport::ClearBuffer::Input)
                .map_err(std::io::Error::from)?;
            debug!("Cleared input buffer of '{}'", self.port_name);
            Ok(())
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            Err(LabError::FeatureNotEnabled("instrument_serial".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_adapter_creation() {
        let adapter = SerialAdapter::new("/dev/ttyACM0", 115_200);
        assert_eq!(adapter.name(), "serial");
        assert_eq!(adapter.port_name(), "/dev/ttyACM0");
        assert_eq!(adapter.baud_rate(), 115_200);
        assert!(!adapter.is_connected());
    }

    #[test]
    fn test_builder_overrides() {
        let adapter = SerialAdapter::new("COM3", 9600)
            .with_timeout(Duration::from_millis(500))
            .with_settle(Duration::ZERO)
            .with_line_terminator("\n")
            .with_response_delimiter(b'\r');
        assert_eq!(adapter.timeout, Duration::from_millis(500));
        assert_eq!(adapter.settle, Duration::ZERO);
        assert_eq!(adapter.line_terminator, "\n");
        assert_eq!(adapter.response_delimiter, b'\r');
    }

    #[cfg(feature = "instrument_serial")]
    #[test]
    fn test_connect_to_missing_port_is_connection_error() {
        let mut adapter =
            SerialAdapter::new("/dev/tclab-does-not-exist", 9600).with_settle(Duration::ZERO);
        let err = adapter.connect().unwrap_err();
        assert!(err.is_connection(), "unexpected error: {err}");
        assert!(!adapter.is_connected());
    }

    #[cfg(feature = "instrument_serial")]
    #[test]
    fn test_query_without_connection_is_state_error() {
        let mut adapter = SerialAdapter::new("/dev/ttyACM0", 9600);
        let err = adapter.query("T1").unwrap_err();
        assert!(err.is_state());
        assert!(adapter.clear_input().unwrap_err().is_state());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut adapter = SerialAdapter::new("/dev/ttyACM0", 9600);
        assert!(adapter.disconnect().is_ok());
        assert!(adapter.disconnect().is_ok());
    }
}
