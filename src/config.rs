//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WindLoggerError};
use crate::record::HeaderLayout;
use crate::sensor::serial::DEFAULT_BAUD_RATE;
use crate::sensor::INA219_DEFAULT_ADDRESS;
use crate::storage::Granularity;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub plot: PlotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Anemometer serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Longest wait for one line before the device counts as stalled
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Wait for the first line at startup
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Battery monitor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BatteryConfig {
    #[serde(default = "default_battery_enabled")]
    pub enabled: bool,

    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: String,

    #[serde(default = "default_ina219_address")]
    pub address: u8,

    /// Below this voltage the battery is considered dead
    #[serde(default = "default_voltage_min")]
    pub voltage_min: f64,
}

/// Data file configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_local_root")]
    pub local_root: String,

    /// Mounted network share; may be left empty and given on the command line
    #[serde(default)]
    pub remote_root: String,

    #[serde(default)]
    pub layout: HeaderLayout,

    #[serde(default)]
    pub granularity: Granularity,

    /// Local day folders older than this are deleted at startup (0 keeps all)
    #[serde(default)]
    pub retention_days: u32,

    /// Failed mirrors older than this are dropped (0 retries forever)
    #[serde(default)]
    pub max_task_age_hours: u64,

    /// Folder holding the last-used port and remote root
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

/// Live plot feed configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PlotConfig {
    #[serde(default = "default_plot_enabled")]
    pub enabled: bool,

    #[serde(default = "default_wind_window_min")]
    pub wind_window_min: u32,

    #[serde(default = "default_voltage_window_h")]
    pub voltage_window_h: u32,

    #[serde(default = "default_voltage_interval_min")]
    pub voltage_interval_min: u32,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Folder for daily rotated log files; empty logs to stdout only
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { DEFAULT_BAUD_RATE }
fn default_read_timeout_ms() -> u64 { 5000 }
fn default_probe_timeout_ms() -> u64 { 5000 }

fn default_battery_enabled() -> bool { true }
fn default_i2c_bus() -> String { "/dev/i2c-1".to_string() }
fn default_ina219_address() -> u8 { INA219_DEFAULT_ADDRESS }
fn default_voltage_min() -> f64 { 12.2 }

fn default_local_root() -> String { "./wind_data".to_string() }
fn default_state_dir() -> String { "./state".to_string() }

fn default_plot_enabled() -> bool { true }
fn default_wind_window_min() -> u32 { 10 }
fn default_voltage_window_h() -> u32 { 6 }
fn default_voltage_interval_min() -> u32 { 5 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            enabled: default_battery_enabled(),
            i2c_bus: default_i2c_bus(),
            address: default_ina219_address(),
            voltage_min: default_voltage_min(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_root: default_local_root(),
            remote_root: String::new(),
            layout: HeaderLayout::default(),
            granularity: Granularity::default(),
            retention_days: 0,
            max_task_age_hours: 0,
            state_dir: default_state_dir(),
        }
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            enabled: default_plot_enabled(),
            wind_window_min: default_wind_window_min(),
            voltage_window_h: default_voltage_window_h(),
            voltage_interval_min: default_voltage_interval_min(),
        }
    }
}

/// Baud rates the GMX family can be configured for
const SUPPORTED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

fn invalid(msg: impl std::fmt::Display) -> WindLoggerError {
    WindLoggerError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wind_logger::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial port
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        if self.serial.read_timeout_ms == 0 || self.serial.read_timeout_ms > 60000 {
            return Err(invalid("read_timeout_ms must be between 1 and 60000"));
        }

        if self.serial.probe_timeout_ms == 0 || self.serial.probe_timeout_ms > 60000 {
            return Err(invalid("probe_timeout_ms must be between 1 and 60000"));
        }

        // Battery monitor
        if self.battery.enabled {
            if self.battery.i2c_bus.is_empty() {
                return Err(invalid("battery i2c_bus cannot be empty when enabled"));
            }

            // A0/A1 strapping gives 0x40 to 0x4F
            if !(0x40..=0x4F).contains(&self.battery.address) {
                return Err(invalid("battery address must be between 0x40 and 0x4F"));
            }
        }

        if !self.battery.voltage_min.is_finite()
            || self.battery.voltage_min < 0.0
            || self.battery.voltage_min > 26.0
        {
            return Err(invalid("voltage_min must be between 0.0 and 26.0"));
        }

        // Storage
        if self.storage.local_root.is_empty() {
            return Err(invalid("storage local_root cannot be empty"));
        }

        if self.storage.state_dir.is_empty() {
            return Err(invalid("storage state_dir cannot be empty"));
        }

        if !self.storage.remote_root.is_empty()
            && Path::new(&self.storage.remote_root) == Path::new(&self.storage.local_root)
        {
            return Err(invalid("remote_root must differ from local_root"));
        }

        // Plot feed
        if self.plot.enabled {
            if self.plot.wind_window_min == 0 {
                return Err(invalid("wind_window_min must be greater than 0"));
            }

            if self.plot.voltage_window_h == 0 {
                return Err(invalid("voltage_window_h must be greater than 0"));
            }

            if self.plot.voltage_interval_min == 0 || self.plot.voltage_interval_min > 60 {
                return Err(invalid("voltage_interval_min must be between 1 and 60"));
            }
        }

        Ok(())
    }

    /// Per-line read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.read_timeout_ms)
    }

    /// Startup probe timeout
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.probe_timeout_ms)
    }

    /// Age after which failed mirrors are dropped, `None` to retry forever
    pub fn max_task_age(&self) -> Option<chrono::Duration> {
        match self.storage.max_task_age_hours {
            0 => None,
            hours => Some(chrono::Duration::hours(hours as i64)),
        }
    }

    /// Days of local data to keep, `None` to keep everything
    pub fn retention_days(&self) -> Option<u32> {
        match self.storage.retention_days {
            0 => None,
            days => Some(days),
        }
    }

    pub fn local_root(&self) -> PathBuf {
        PathBuf::from(&self.storage.local_root)
    }
}
