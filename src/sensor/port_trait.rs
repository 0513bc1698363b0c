//! Trait abstraction for sensor I/O to enable testing

use async_trait::async_trait;

use crate::error::Result;

/// Source of raw text lines from the anemometer
#[async_trait]
pub trait LineSource: Send {
    /// Next complete line, without the line terminator
    async fn next_line(&mut self) -> Result<String>;
}

/// Source of battery voltage readings
pub trait VoltageSource: Send {
    /// Supply voltage in volts
    fn supply_voltage(&mut self) -> Result<f64>;
}
