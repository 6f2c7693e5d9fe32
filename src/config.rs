//! Configuration loading using Figment
//!
//! Configuration is merged from three layers, later layers winning:
//! 1. Built-in defaults (`LabConfig::default()`)
//! 2. A TOML file (`config/tclab.toml` unless another path is given)
//! 3. Environment variables prefixed with `TCLAB_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore so that field names
//! keep their own underscores:
//!
//! ```text
//! TCLAB_CONNECTION__PORT=/dev/ttyACM0
//! TCLAB_CONNECTION__TIMEOUT_MS=5000
//! TCLAB_MODEL__SPEEDUP=10
//! TCLAB_LOGGING__LEVEL=debug
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tclab::config::LabConfig;
//!
//! let config = LabConfig::load()?;
//! println!("Port: {:?}", config.connection.port);
//! # Ok::<(), tclab::error::LabError>(())
//! ```

use crate::error::{LabError, LabResult};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/tclab.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TCLAB_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabConfig {
    /// Serial connection to the device
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Simulation model parameters
    #[serde(default)]
    pub model: ModelConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Port name or pattern; empty means auto-discover
    #[serde(default)]
    pub port: String,
    /// Baud rates to try, in order
    #[serde(default = "default_baud_rates")]
    pub baud_rates: Vec<u32>,
    /// Bound on a single round trip in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Wait after opening the port while the board resets
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// Simulation model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Ambient temperature in degrees Celsius
    #[serde(default = "default_ambient_c")]
    pub ambient_c: f64,
    /// Lab time runs this many times faster than wall time
    #[serde(default = "default_speedup")]
    pub speedup: f64,
    /// Standard deviation of simulated sensor noise
    #[serde(default = "default_noise_std")]
    pub noise_std: f64,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_baud_rates() -> Vec<u32> {
    vec![115_200, 9600]
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_ambient_c() -> f64 {
    21.0
}

fn default_speedup() -> f64 {
    1.0
}

fn default_noise_std() -> f64 {
    0.043
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rates: default_baud_rates(),
            timeout_ms: default_timeout_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            ambient_c: default_ambient_c(),
            speedup: default_speedup(),
            noise_std: default_noise_std(),
            seed: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ConnectionConfig {
    /// Port pattern, or `None` when discovery should consider every port.
    pub fn port_pattern(&self) -> Option<&str> {
        let port = self.port.trim();
        (!port.is_empty()).then_some(port)
    }

    /// Round-trip bound as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Post-open settle delay as a `Duration`.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl LabConfig {
    /// Load configuration from the default file and environment variables.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load() -> LabResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// # Errors
    ///
    /// Returns `LabError::Config` if the sources cannot be merged and
    /// `LabError::Configuration` if validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> LabResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - At least one baud rate, none of them zero
    /// - Round-trip timeout is non-zero
    /// - Model speedup is positive and noise is non-negative
    pub fn validate(&self) -> LabResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(LabError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        if self.connection.baud_rates.is_empty() {
            return Err(LabError::Configuration(
                "'baud_rates' must list at least one rate".to_string(),
            ));
        }
        if self.connection.baud_rates.contains(&0) {
            return Err(LabError::Configuration(
                "'baud_rates' cannot contain 0".to_string(),
            ));
        }

        if self.connection.timeout_ms == 0 {
            return Err(LabError::Configuration(
                "'timeout_ms' must be > 0".to_string(),
            ));
        }

        if !(self.model.speedup.is_finite() && self.model.speedup > 0.0) {
            return Err(LabError::Configuration(format!(
                "Invalid speedup {}. Must be > 0",
                self.model.speedup
            )));
        }

        if !(self.model.noise_std.is_finite() && self.model.noise_std >= 0.0) {
            return Err(LabError::Configuration(format!(
                "Invalid noise_std {}. Must be >= 0",
                self.model.noise_std
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LabConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.baud_rates, vec![115_200, 9600]);
        assert_eq!(config.model.ambient_c, 21.0);
        assert!(config.connection.port_pattern().is_none());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = LabConfig::default();
        config.logging.level = "loud".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid log level"));
    }

    #[test]
    fn test_empty_baud_rates() {
        let mut config = LabConfig::default();
        config.connection.baud_rates.clear();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("baud_rates"));
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = LabConfig::default();
        config.connection.timeout_ms = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_speedup() {
        let mut config = LabConfig::default();
        config.model.speedup = 0.0;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Invalid speedup"));
    }

    #[test]
    fn test_port_pattern_trims_whitespace() {
        let mut config = LabConfig::default();
        config.connection.port = "  /dev/ttyACM0 ".to_string();
        assert_eq!(config.connection.port_pattern(), Some("/dev/ttyACM0"));
    }
}
