//! Mock transport for testing
//!
//! `MockAdapter` answers the TCLab wire protocol from in-memory state, so a
//! hardware session can be exercised without a board attached. It provides:
//! - Firmware-like replies for every command
//! - Controllable failure and timeout injection, with late replies left
//!   in the receive buffer the way a real serial link leaves them
//! - A call log and exchange counter for test verification
//!
//! Clones share state, so a test can keep a handle after moving the adapter
//! into a session.

use super::Transport;
use crate::error::{LabError, LabResult};
use crate::instrument::{clamp, DEFAULT_P1, DEFAULT_P2};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Firmware version string reported by the mock.
pub const MOCK_VERSION: &str = "TCLab Firmware 2.0.1 (mock)";

#[derive(Debug)]
struct MockState {
    connected: bool,
    temperatures: [f64; 2],
    heaters: [f64; 2],
    power_limits: [f64; 2],
    led: f64,
    fail_connect: bool,
    fail_disconnect: bool,
    timeout_next: bool,
    input: VecDeque<String>,
    exchanges: usize,
    call_log: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            connected: false,
            temperatures: [21.0, 22.5],
            heaters: [0.0, 0.0],
            power_limits: [DEFAULT_P1, DEFAULT_P2],
            led: 0.0,
            fail_connect: false,
            fail_disconnect: false,
            timeout_next: false,
            input: VecDeque::new(),
            exchanges: 0,
            call_log: Vec::new(),
        }
    }
}

impl MockState {
    fn respond(&mut self, command: &str) -> String {
        self.call_log.push(command.to_string());

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let argument = parts.next().and_then(|a| a.parse::<f64>().ok());

        match (name, argument) {
            ("T1", None) => self.temperatures[0].to_string(),
            ("T2", None) => self.temperatures[1].to_string(),
            ("R1", None) => self.heaters[0].to_string(),
            ("R2", None) => self.heaters[1].to_string(),
            ("Q1", Some(v)) => {
                self.heaters[0] = clamp(v);
                self.heaters[0].to_string()
            }
            ("Q2", Some(v)) => {
                self.heaters[1] = clamp(v);
                self.heaters[1].to_string()
            }
            ("P1", Some(v)) => {
                self.power_limits[0] = v;
                v.to_string()
            }
            ("P2", Some(v)) => {
                self.power_limits[1] = v;
                v.to_string()
            }
            ("LED", Some(v)) => {
                self.led = clamp(v);
                self.led.to_string()
            }
            ("VER", None) => MOCK_VERSION.to_string(),
            ("X", None) => {
                self.heaters = [0.0, 0.0];
                "Stop".to_string()
            }
            _ => format!("Unknown command: {command}"),
        }
    }
}

/// In-memory stand-in for a TCLab board
#[derive(Clone, Debug, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    /// Create a new mock adapter with firmware defaults
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the temperature a sensor will report
    pub fn set_temperature(&self, index: usize, celsius: f64) {
        if let Some(slot) = self.state().temperatures.get_mut(index) {
            *slot = celsius;
        }
    }

    /// Heater outputs currently held by the mock firmware
    pub fn heaters(&self) -> [f64; 2] {
        self.state().heaters
    }

    /// LED level currently held by the mock firmware
    pub fn led_level(&self) -> f64 {
        self.state().led
    }

    /// Make the next `connect` fail
    pub fn fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    /// Make `disconnect` report an error (the link is still released)
    pub fn fail_disconnect(&self, fail: bool) {
        self.state().fail_disconnect = fail;
    }

    /// Make the next query or batch time out
    ///
    /// The firmware still executes the commands; their replies arrive late
    /// and wait in the receive buffer until read or cleared.
    pub fn inject_timeout(&self) {
        self.state().timeout_next = true;
    }

    /// Replies sitting unread in the receive buffer
    pub fn pending_input(&self) -> usize {
        self.state().input.len()
    }

    /// Number of query exchanges performed so far
    pub fn exchanges(&self) -> usize {
        self.state().exchanges
    }

    /// Get the call log
    pub fn call_log(&self) -> Vec<String> {
        self.state().call_log.clone()
    }

    /// Clear the call log
    pub fn clear_log(&self) {
        self.state().call_log.clear();
    }
}

impl Transport for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn connect(&mut self) -> LabResult<()> {
        let mut state = self.state();
        if state.fail_connect {
            return Err(LabError::Connection("Injected connect failure".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> LabResult<()> {
        let mut state = self.state();
        state.connected = false;
        if state.fail_disconnect {
            return Err(LabError::Io(std::io::Error::other(
                "Injected disconnect failure",
            )));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn query(&mut self, command: &str) -> LabResult<String> {
        let mut replies = self.query_batch(&[command.to_string()])?;
        replies.pop().ok_or(LabError::Timeout(Duration::ZERO))
    }

    fn query_batch(&mut self, commands: &[String]) -> LabResult<Vec<String>> {
        let mut state = self.state();
        if !state.connected {
            return Err(LabError::SessionClosed);
        }

        state.exchanges += 1;
        for command in commands {
            let reply = state.respond(command);
            state.input.push_back(reply);
        }
        if std::mem::take(&mut state.timeout_next) {
            return Err(LabError::Timeout(Duration::from_secs(2)));
        }

        // Replies come off the buffer in arrival order, stale ones first
        let count = commands.len().min(state.input.len());
        let replies: Vec<String> = state.input.drain(..count).collect();
        Ok(replies)
    }

    fn clear_input(&mut self) -> LabResult<()> {
        self.state().input.clear();
        Ok(())
    }
}
