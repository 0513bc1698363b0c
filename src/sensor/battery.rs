//! # INA219 Battery Monitor
//!
//! Minimal INA219 driver over any `embedded-hal` I2C bus. Only the two
//! voltage registers are read; no calibration is needed for those.

use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;
use tracing::info;

use super::port_trait::VoltageSource;
use crate::error::{Result, WindLoggerError};

/// Default I2C address (A0 and A1 tied to ground)
pub const INA219_DEFAULT_ADDRESS: u8 = 0x40;

/// Shunt voltage register
const REG_SHUNT_VOLTAGE: u8 = 0x01;

/// Bus voltage register
const REG_BUS_VOLTAGE: u8 = 0x02;

/// Bus voltage LSB: 4 mV, value in bits 15..3
const BUS_VOLTAGE_LSB: f64 = 0.004;

/// Shunt voltage LSB: 10 uV, two's complement
const SHUNT_VOLTAGE_LSB: f64 = 0.000_01;

/// Decimal places kept in reported voltages
const VOLTAGE_DECIMALS: i32 = 5;

/// INA219 current/voltage monitor
#[derive(Debug)]
pub struct Ina219<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Ina219<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Voltage on the load side (V-), in volts
    pub fn bus_voltage(&mut self) -> Result<f64> {
        let raw = self.read_register(REG_BUS_VOLTAGE)?;
        Ok(f64::from(raw >> 3) * BUS_VOLTAGE_LSB)
    }

    /// Voltage across the shunt (V+ to V-), in volts
    pub fn shunt_voltage(&mut self) -> Result<f64> {
        let raw = self.read_register(REG_SHUNT_VOLTAGE)? as i16;
        Ok(f64::from(raw) * SHUNT_VOLTAGE_LSB)
    }

    /// Battery voltage: bus voltage plus shunt drop, rounded to 5 decimals
    pub fn supply_voltage(&mut self) -> Result<f64> {
        let v = self.bus_voltage()? + self.shunt_voltage()?;
        Ok(round_to(v, VOLTAGE_DECIMALS))
    }

    fn read_register(&mut self, register: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(|e| {
                WindLoggerError::I2c(format!(
                    "read of register 0x{:02X} at 0x{:02X} failed: {:?}",
                    register, self.address, e
                ))
            })?;
        Ok(u16::from_be_bytes(buf))
    }
}

impl<I2C: I2c + Send> VoltageSource for Ina219<I2C> {
    fn supply_voltage(&mut self) -> Result<f64> {
        Ina219::supply_voltage(self)
    }
}

/// Open an INA219 on a Linux I2C bus and check that it answers
///
/// # Arguments
///
/// * `bus` - I2C device (e.g., "/dev/i2c-1")
/// * `address` - Chip address
///
/// # Errors
///
/// Returns `DeviceUnavailable` if the bus cannot be opened or the chip does
/// not respond.
pub fn open_ina219(bus: &str, address: u8) -> Result<Ina219<I2cdev>> {
    let i2c = I2cdev::new(bus)
        .map_err(|e| WindLoggerError::DeviceUnavailable(format!("{}: {:?}", bus, e)))?;
    let mut sensor = Ina219::new(i2c, address);

    let bus_v = sensor
        .bus_voltage()
        .map_err(|e| WindLoggerError::DeviceUnavailable(e.to_string()))?;
    let shunt_v = sensor
        .shunt_voltage()
        .map_err(|e| WindLoggerError::DeviceUnavailable(e.to_string()))?;
    info!(
        "INA219 at {} 0x{:02X}: VIN+ {:6.3} V, VIN- {:6.3} V, shunt {:8.5} V",
        bus,
        address,
        bus_v + shunt_v,
        bus_v,
        shunt_v
    );
    Ok(sensor)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
