//! Node configuration.
//!
//! Protocol timing and GATT layout are fixed constants; everything a
//! deployment might tune lives in [`NodeConfig`], which is validated once at
//! startup.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use weather_station::config::NodeConfig;
//!
//! let config = NodeConfig::default().with_sample_period(Duration::from_secs(5));
//! assert!(config.validate().is_ok());
//! ```

use crate::sensor::WireFormat;
use std::fmt;
use std::time::Duration;

/// Time between two sensor transactions.
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(2500);

/// How long the start sequence holds the data line low (ms).
pub const START_HOLD_MS: u32 = 20;

/// Maximum wait for the sensor to acknowledge the start sequence (µs).
pub const LINE_IDLE_TIMEOUT_US: u32 = 1_000;

/// High pulses longer than this decode as a `1` bit (µs).
pub const BIT_THRESHOLD_US: u32 = 50;

/// Upper bound for any single pulse or gap inside the bit stream (µs).
pub const PULSE_MAX_US: u32 = 100;

/// Display refresh tick.
pub const DISPLAY_TICK: Duration = Duration::from_millis(500);

/// How often the control task checks for new credentials.
pub const CONTROL_POLL: Duration = Duration::from_millis(1000);

/// Maximum time `connect()` waits for the network to come up.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Automatic reconnect attempts before an attempt is reported as failed.
pub const MAX_RECONNECT_ATTEMPTS: u8 = 3;

/// Default port for the snapshot HTTP server.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Runtime configuration for the node's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    /// Period of the acquisition task.
    pub sample_period: Duration,
    /// Single-wire framing used by the attached sensor.
    pub wire_format: WireFormat,
    /// Start-sequence low hold in milliseconds.
    pub start_hold_ms: u32,
    /// Acknowledgement timeout in microseconds.
    pub line_idle_timeout_us: u32,
    /// Display refresh tick.
    pub display_tick: Duration,
    /// Credentials mailbox poll interval.
    pub control_poll: Duration,
    /// Bounded wait for a connect attempt.
    pub connect_timeout: Duration,
    /// Reconnects allowed per attempt.
    pub max_reconnect_attempts: u8,
    /// Port of the snapshot HTTP server.
    pub http_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sample_period: SAMPLE_PERIOD,
            wire_format: WireFormat::Checksummed,
            start_hold_ms: START_HOLD_MS,
            line_idle_timeout_us: LINE_IDLE_TIMEOUT_US,
            display_tick: DISPLAY_TICK,
            control_poll: CONTROL_POLL,
            connect_timeout: CONNECT_TIMEOUT,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl NodeConfig {
    /// Override the acquisition period.
    pub fn with_sample_period(self, sample_period: Duration) -> Self {
        Self {
            sample_period,
            ..self
        }
    }

    /// Override the wire variant.
    pub fn with_wire_format(self, wire_format: WireFormat) -> Self {
        Self {
            wire_format,
            ..self
        }
    }

    /// Override the connect wait.
    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }

    /// Override the HTTP port.
    pub fn with_http_port(self, http_port: u16) -> Self {
        Self { http_port, ..self }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // DHT11 needs ~1s between transactions to re-arm
        if self.sample_period < Duration::from_secs(1) {
            return Err(ConfigError::InvalidValue(
                "sample_period must be >= 1s",
            ));
        }
        if self.start_hold_ms < 18 {
            return Err(ConfigError::InvalidValue("start_hold_ms must be >= 18"));
        }
        if self.line_idle_timeout_us <= PULSE_MAX_US {
            return Err(ConfigError::InvalidValue(
                "line_idle_timeout_us must exceed the pulse bound",
            ));
        }
        if self.display_tick.is_zero() {
            return Err(ConfigError::InvalidValue("display_tick must be > 0"));
        }
        if self.control_poll.is_zero() {
            return Err(ConfigError::InvalidValue("control_poll must be > 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("connect_timeout must be > 0"));
        }
        if self.max_reconnect_attempts > 10 {
            return Err(ConfigError::InvalidValue(
                "max_reconnect_attempts must be <= 10",
            ));
        }
        if self.http_port == 0 {
            return Err(ConfigError::InvalidValue("http_port must be > 0"));
        }
        Ok(())
    }
}

/// Errors produced by configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field is outside its accepted range.
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue(msg) => write!(f, "invalid node config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
