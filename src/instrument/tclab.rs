//! TCLab hardware driver
//!
//! `TCLab` talks to the Arduino-based Temperature Control Lab over a
//! [`Transport`]. Every accessor is one blocking round trip; `scan` pipelines
//! its four queries into a single exchange.
//!
//! ## Configuration
//!
//! ```toml
//! [connection]
//! port = ""            # empty = auto-discover
//! baud_rates = [115200, 9600]
//! timeout_ms = 2000
//! settle_ms = 2000
//! ```

use super::{clamp, protocol::Command, Channel, Lab, Scan, DEFAULT_P1, DEFAULT_P2};
use crate::adapters::{SerialAdapter, Transport};
use crate::config::{ConnectionConfig, LabConfig};
use crate::discovery;
use crate::error::{LabError, LabResult};
use tracing::{debug, info, warn};

/// Hardware-backed lab session
pub struct TCLab<A: Transport = SerialAdapter> {
    adapter: A,
    port: String,
    device: String,
    version: String,
    power_limits: [f64; 2],
    open: bool,
    /// Set after a timeout; late replies must be discarded before the next exchange
    resync: bool,
}

impl TCLab<SerialAdapter> {
    /// Open a board on `port`, or auto-discover one when `port` is `None`.
    ///
    /// `port` is a pattern matched against the system's serial ports, so a
    /// name that matches nothing (e.g. `"nonsense"`) fails with
    /// [`LabError::Connection`].
    pub fn connect(port: Option<&str>) -> LabResult<Self> {
        let mut config = ConnectionConfig::default();
        config.port = port.unwrap_or_default().to_string();
        Self::open_with(&config)
    }

    /// Open a board using the `[connection]` section of `config`.
    pub fn from_config(config: &LabConfig) -> LabResult<Self> {
        Self::open_with(&config.connection)
    }

    fn open_with(config: &ConnectionConfig) -> LabResult<Self> {
        let ports = discovery::available()?;
        let found = discovery::find_arduino(config.port_pattern(), &ports)?;
        info!("Found {} on {}", found.device, found.port);

        let mut last_error = None;
        for &baud_rate in &config.baud_rates {
            let adapter = SerialAdapter::new(found.port.clone(), baud_rate)
                .with_timeout(config.timeout())
                .with_settle(config.settle());

            match Self::with_adapter(adapter) {
                Ok(mut lab) => {
                    lab.port = found.port.clone();
                    lab.device = found.device.clone();
                    info!(
                        "{} connected on port {} at {} baud",
                        lab.device, lab.port, baud_rate
                    );
                    return Ok(lab);
                }
                Err(e) => {
                    warn!("No answer from {} at {} baud: {}", found.port, baud_rate, e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(LabError::Connection(msg)) => LabError::Connection(msg),
            Some(e) => LabError::Connection(format!(
                "Failed to handshake with {} on {}: {}",
                found.device, found.port, e
            )),
            None => LabError::Configuration("'baud_rates' is empty".to_string()),
        })
    }
}

impl<A: Transport> TCLab<A> {
    /// Open a session over an existing transport.
    ///
    /// Connects the transport, reads the firmware version and turns both
    /// heaters off. On failure the transport is disconnected again before
    /// the error is returned.
    pub fn with_adapter(mut adapter: A) -> LabResult<Self> {
        adapter.connect()?;

        let version = match Self::handshake(&mut adapter) {
            Ok(version) => version,
            Err(e) => {
                if let Err(disconnect_err) = adapter.disconnect() {
                    warn!(
                        "Failed to release {} after handshake error: {}",
                        adapter.name(),
                        disconnect_err
                    );
                }
                return Err(e);
            }
        };
        info!("{}", version);

        Ok(Self {
            port: adapter.name().to_string(),
            device: "TCLab".to_string(),
            adapter,
            version,
            power_limits: [DEFAULT_P1, DEFAULT_P2],
            open: true,
            resync: false,
        })
    }

    fn handshake(adapter: &mut A) -> LabResult<String> {
        let version = adapter.query(&Command::Version.to_wire())?;
        if version.is_empty() {
            return Err(LabError::Connection(
                "Device returned an empty version string".to_string(),
            ));
        }
        for channel in Channel::ALL {
            let command = Command::SetHeater(channel, 0.0);
            command.parse_value(&adapter.query(&command.to_wire())?)?;
        }
        Ok(version)
    }

    /// Firmware version reported during the handshake.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Port the session is attached to.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Board description from discovery.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Borrow the underlying transport.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    fn ensure_open(&self) -> LabResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(LabError::SessionClosed)
        }
    }

    /// One batch on the transport, keeping replies aligned with commands.
    fn exchange(&mut self, wire: &[String]) -> LabResult<Vec<String>> {
        if self.resync {
            self.adapter.clear_input()?;
            self.resync = false;
            debug!("Discarded late replies on {}", self.port);
        }
        let result = self.adapter.query_batch(wire);
        if matches!(&result, Err(e) if e.is_timeout()) {
            self.resync = true;
        }
        result
    }

    fn request(&mut self, command: Command) -> LabResult<f64> {
        self.ensure_open()?;
        let wire = command.to_wire();
        let response = self
            .exchange(std::slice::from_ref(&wire))?
            .pop()
            .unwrap_or_default();
        debug!("{} -> {}", wire, response);
        command.parse_value(&response)
    }
}

impl<A: Transport> Lab for TCLab<A> {
    fn temperature(&mut self, channel: Channel) -> LabResult<f64> {
        self.request(Command::Temperature(channel))
    }

    fn heater(&mut self, channel: Channel) -> LabResult<f64> {
        self.request(Command::ReadHeater(channel))
    }

    fn set_heater(&mut self, channel: Channel, percent: f64) -> LabResult<f64> {
        self.request(Command::SetHeater(channel, clamp(percent)))
    }

    fn power_limit(&mut self, channel: Channel) -> LabResult<f64> {
        self.ensure_open()?;
        Ok(self.power_limits[channel.index()])
    }

    fn set_power_limit(&mut self, channel: Channel, limit: f64) -> LabResult<f64> {
        let applied = self.request(Command::SetPowerLimit(channel, limit))?;
        self.power_limits[channel.index()] = applied;
        Ok(applied)
    }

    fn led(&mut self, percent: f64) -> LabResult<f64> {
        self.request(Command::Led(clamp(percent)))
    }

    fn scan(&mut self) -> LabResult<Scan> {
        self.ensure_open()?;

        let commands = [
            Command::Temperature(Channel::One),
            Command::Temperature(Channel::Two),
            Command::ReadHeater(Channel::One),
            Command::ReadHeater(Channel::Two),
        ];
        let wire: Vec<String> = commands.iter().map(Command::to_wire).collect();
        let replies = self.exchange(&wire)?;
        if replies.len() != commands.len() {
            return Err(LabError::Protocol {
                command: wire.join(";"),
                response: replies.join(";"),
            });
        }

        let mut values = [0.0; 4];
        for ((slot, command), reply) in values.iter_mut().zip(&commands).zip(&replies) {
            *slot = command.parse_value(reply)?;
        }
        let [t1, t2, q1, q2] = values;
        Ok(Scan { t1, t2, q1, q2 })
    }

    fn close(&mut self) -> LabResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let mut first_error = None;
        for command in [
            Command::SetHeater(Channel::One, 0.0),
            Command::SetHeater(Channel::Two, 0.0),
            Command::Stop,
        ] {
            if let Err(e) = self.exchange(&[command.to_wire()]) {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.adapter.disconnect() {
            first_error.get_or_insert(e);
        }
        info!("TCLab on {} disconnected", self.port);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl<A: Transport> Drop for TCLab<A> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close TCLab on {}: {}", self.port, e);
        }
    }
}
