//! # Sensor Module
//!
//! The two devices the station polls.
//!
//! This module handles:
//! - The anemometer on a USB serial port (line oriented text output)
//! - The INA219 battery monitor on the I2C bus

pub mod battery;
pub mod port_trait;
pub mod serial;

pub use battery::{open_ina219, Ina219, INA219_DEFAULT_ADDRESS};
pub use port_trait::{LineSource, VoltageSource};
pub use serial::{AnemometerSerial, LineReader};
