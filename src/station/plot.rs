//! # Plot Feed
//!
//! Rolling windows of recent wind and battery readings, written as small
//! CSV snapshots that a separate plotting tool can poll.
//!
//! This module handles:
//! - A wind window of corrected direction and speed, one point per reading
//! - A battery window sampled at a fixed interval
//! - Clearing both windows on request

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use csv::{Terminator, WriterBuilder};
use tracing::debug;

use crate::config::PlotConfig;

/// Wind snapshot file name under the local root
pub const WIND_SNAPSHOT: &str = "tempwind.csv";

/// Battery snapshot file name under the local root
pub const VOLTAGE_SNAPSHOT: &str = "tempv.csv";

/// Wind window point: corrected direction and speed
pub type WindPoint = (u16, f64);

/// Battery window point: epoch seconds and volts
pub type VoltagePoint = (f64, f64);

/// Rolling plot windows
#[derive(Debug)]
pub struct PlotFeed {
    wind: VecDeque<WindPoint>,
    wind_capacity: usize,
    voltage: VecDeque<VoltagePoint>,
    voltage_capacity: usize,
    voltage_interval_s: f64,
    last_voltage_at: Option<f64>,
    snapshot_dir: Option<PathBuf>,
}

impl PlotFeed {
    /// Create empty windows sized from `config`
    ///
    /// The wind window assumes one reading per second. With `snapshot_dir`
    /// set, every change rewrites the snapshot files in that folder.
    pub fn new(config: &PlotConfig, snapshot_dir: Option<PathBuf>) -> Self {
        let interval_min = config.voltage_interval_min.max(1);
        let wind_capacity = (config.wind_window_min as usize * 60).max(1);
        let voltage_capacity = ((60 / interval_min) * config.voltage_window_h).max(1) as usize;

        Self {
            wind: VecDeque::with_capacity(wind_capacity),
            wind_capacity,
            voltage: VecDeque::with_capacity(voltage_capacity),
            voltage_capacity,
            voltage_interval_s: f64::from(interval_min) * 60.0,
            last_voltage_at: None,
            snapshot_dir,
        }
    }

    /// Add a wind point, dropping the oldest when full
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot file cannot be written. The point is
    /// kept either way.
    pub fn push_wind(&mut self, direction: u16, speed: f64) -> io::Result<()> {
        if self.wind.len() == self.wind_capacity {
            self.wind.pop_front();
        }
        self.wind.push_back((direction, speed));
        self.write_wind()
    }

    /// Offer a battery reading taken at `epoch`
    ///
    /// Only one point per interval is kept; the first reading after start or
    /// after a clear is always taken.
    ///
    /// # Returns
    ///
    /// * `io::Result<bool>` - Whether the reading was added to the window
    pub fn push_voltage(&mut self, epoch: f64, volts: f64) -> io::Result<bool> {
        // A clock that went backwards restarts the sampling
        if let Some(last) = self.last_voltage_at {
            if epoch >= last && epoch - last < self.voltage_interval_s {
                return Ok(false);
            }
        }

        if self.voltage.len() == self.voltage_capacity {
            self.voltage.pop_front();
        }
        self.voltage.push_back((epoch, (volts * 100.0).round() / 100.0));
        self.last_voltage_at = Some(epoch);
        self.write_voltage()?;
        Ok(true)
    }

    /// Empty both windows and their snapshots.
    pub fn clear(&mut self) -> io::Result<()> {
        self.wind.clear();
        self.voltage.clear();
        self.last_voltage_at = None;
        debug!("Plot windows cleared");
        self.write_wind()?;
        self.write_voltage()
    }

    pub fn wind_points(&self) -> impl Iterator<Item = &WindPoint> {
        self.wind.iter()
    }

    pub fn voltage_points(&self) -> impl Iterator<Item = &VoltagePoint> {
        self.voltage.iter()
    }

    pub fn snapshot_dir(&self) -> Option<&Path> {
        self.snapshot_dir.as_deref()
    }

    fn write_wind(&self) -> io::Result<()> {
        self.write_snapshot(
            WIND_SNAPSHOT,
            self.wind
                .iter()
                .map(|(direction, speed)| [direction.to_string(), speed.to_string()]),
        )
    }

    fn write_voltage(&self) -> io::Result<()> {
        self.write_snapshot(
            VOLTAGE_SNAPSHOT,
            self.voltage
                .iter()
                .map(|(epoch, volts)| [format!("{:.3}", epoch), volts.to_string()]),
        )
    }

    /// Replace a snapshot file with `rows`, no header
    fn write_snapshot<I>(&self, name: &str, rows: I) -> io::Result<()>
    where
        I: Iterator<Item = [String; 2]>,
    {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(());
        };
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .terminator(Terminator::Any(b'\n'))
            .from_path(dir.join(name))?;
        for row in rows {
            writer.write_record(&row)?;
        }
        writer.flush()
    }
}
