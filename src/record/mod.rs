//! # Record Module
//!
//! One anemometer reading, from the raw serial line to a CSV row and back.
//!
//! This module handles:
//! - Header layouts (18 and 15 columns)
//! - Parsing the instrument's comma separated output
//! - Formatting rows for the hourly CSV files

pub mod layout;
pub mod parser;

use chrono::NaiveDateTime;
use thiserror::Error;

pub use layout::HeaderLayout;
pub use parser::parse_line;

/// Format of the local clock column.
pub const CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Why a line was rejected. The whole reading is discarded in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("missing field {name} at position {index}")]
    MissingField { index: usize, name: &'static str },

    #[error("invalid {name}: {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("malformed GPS triplet: {0:?}")]
    MalformedGps(String),

    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("invalid local clock time: {0:?}")]
    InvalidTimestamp(String),

    #[error("unreadable CSV row: {0}")]
    Csv(String),
}

/// GPS position as reported by the instrument.
///
/// Kept as text: the instrument pads and signs these fields and reports
/// placeholders when no fix is available.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GpsFix {
    pub latitude: String,
    pub longitude: String,
    pub height: String,
}

/// Typed fields of one instrument line.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Raw u velocity in m/s (full layout only)
    pub velocity_u: Option<f64>,
    /// Raw v velocity in m/s (full layout only)
    pub velocity_v: Option<f64>,
    /// Wind direction in degrees
    pub direction: u16,
    /// Wind speed in m/s
    pub speed: f64,
    /// Compass corrected direction in degrees
    pub corrected_direction: u16,
    /// Corrected wind speed in m/s
    pub corrected_speed: f64,
    pub pressure_hpa: f64,
    pub relative_humidity: f64,
    pub temperature_c: f64,
    pub dew_point_c: f64,
    pub gps: GpsFix,
    /// GPS time string (full layout only)
    pub gps_time: Option<String>,
    /// Instrument supply voltage
    pub supply_voltage: f64,
}

/// A reading stamped with the time it was taken and the battery voltage.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Seconds since the Unix epoch
    pub epoch: f64,
    /// Local wall clock time
    pub local_time: NaiveDateTime,
    pub reading: Reading,
    /// Battery voltage, `None` when the monitor is disabled or failed
    pub battery_v: Option<f64>,
}
