//! Custom error types for the lab client.
//!
//! This module defines the primary error type, `LabError`, for the whole crate.
//! Using the `thiserror` crate, it gives every fallible operation a single,
//! consistent failure vocabulary, from opening a serial port to exporting a
//! historian to CSV.
//!
//! ## Error Hierarchy
//!
//! - **`Connection`**: The requested device address did not resolve to a usable
//!   device, the port could not be opened, or the firmware handshake failed.
//! - **`SessionClosed`**: An operation was attempted on a session that has
//!   already been closed.
//! - **`Timeout`**: A round trip to the device exceeded its bounded wait.
//! - **`Protocol`**: The device answered, but the reply could not be interpreted.
//! - **`Io`**: Wraps `std::io::Error` raised by the transport.
//! - **`Config`** / **`Configuration`**: Loading or validating `LabConfig`.
//! - **`FeatureNotEnabled`**: The crate was built without the feature needed
//!   for the requested operation.
//!
//! By using `#[from]`, `LabError` can be created from the underlying error
//! types, so the `?` operator works across the crate.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the lab error type.
pub type LabResult<T> = std::result::Result<T, LabError>;

/// Every failure the lab client can report.
#[derive(Error, Debug)]
pub enum LabError {
    /// The device could not be reached or identified.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The session was used after `close()`.
    #[error("Session is closed")]
    SessionClosed,

    /// No complete reply arrived within the bound.
    #[error("Device did not respond within {0:?}")]
    Timeout(Duration),

    /// The device replied with something that is not a valid answer.
    #[error("Unexpected reply to '{command}': {response:?}")]
    Protocol {
        /// Wire command that was sent.
        command: String,
        /// Raw reply received.
        response: String,
    },

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration sources could not be merged or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Historian export failed.
    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Support for the operation was compiled out.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl LabError {
    /// True for failures to establish a session.
    pub fn is_connection(&self) -> bool {
        matches!(self, LabError::Connection(_))
    }

    /// True when a round trip ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LabError::Timeout(_))
    }

    /// True when the session was not in a usable state.
    pub fn is_state(&self) -> bool {
        matches!(self, LabError::SessionClosed)
    }
}

impl From<figment::Error> for LabError {
    fn from(err: figment::Error) -> Self {
        LabError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LabError::Connection("No Arduino device found".to_string());
        assert_eq!(err.to_string(), "Connection error: No Arduino device found");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = LabError::Protocol {
            command: "T1".into(),
            response: "garbage".into(),
        };
        assert_eq!(err.to_string(), "Unexpected reply to 'T1': \"garbage\"");
    }

    #[test]
    fn test_error_classification() {
        assert!(LabError::Connection("x".into()).is_connection());
        assert!(LabError::Timeout(Duration::from_secs(2)).is_timeout());
        assert!(LabError::SessionClosed.is_state());
        assert!(!LabError::SessionClosed.is_connection());
    }
}
