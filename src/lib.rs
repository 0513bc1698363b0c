//! # Wind Logger Library
//!
//! Record a serial weather-station anemometer and an INA219 battery monitor
//! to hourly CSV files, mirrored to a network share.
//!
//! [`record`] parses and formats rows and [`storage`] owns file rotation and
//! mirroring. [`sensor`] wraps the serial and I2C devices; [`station`] runs
//! the polling loop over all of them.

pub mod config;
pub mod error;
pub mod record;
pub mod sensor;
pub mod state;
pub mod station;
pub mod storage;
