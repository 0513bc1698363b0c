//! # Error Types
//!
//! Custom error types for Wind Logger using `thiserror`.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Wind Logger
#[derive(Debug, Error)]
pub enum WindLoggerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors (open, read)
    #[error("Serial error: {0}")]
    Serial(String),

    /// A sensor could not be reached at all
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The anemometer produced no line within the read timeout
    #[error("Device unresponsive: no data within {0:?}")]
    DeviceStalled(Duration),

    /// I2C bus errors from the battery monitor
    #[error("I2C error: {0}")]
    I2c(String),
}

/// Result type alias for Wind Logger
pub type Result<T> = std::result::Result<T, WindLoggerError>;
