//! # Battery Alarm
//!
//! Watches the battery voltage and writes a warning line to a sentinel file
//! on the remote share when the battery goes flat.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Name of the sentinel file under the remote root
pub const SENTINEL_FILE: &str = "battery_warning.txt";

/// `ctime(3)` style timestamp used in warning lines
const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryState {
    Normal,
    Dead,
}

/// Low-battery detector with a sentinel file.
///
/// One warning line is appended per transition into the dead state; while
/// the battery stays flat no further lines are written. A warning that could
/// not be written is retried on every reading until it lands or the battery
/// recovers.
#[derive(Debug)]
pub struct BatteryAlarm {
    path: PathBuf,
    voltage_min: f64,
    state: BatteryState,
    unwritten: Option<String>,
}

impl BatteryAlarm {
    pub fn new(path: impl Into<PathBuf>, voltage_min: f64) -> Self {
        Self {
            path: path.into(),
            voltage_min,
            state: BatteryState::Normal,
            unwritten: None,
        }
    }

    /// Alarm writing to the sentinel file under `remote_root`.
    pub fn under(remote_root: &Path, voltage_min: f64) -> Self {
        Self::new(remote_root.join(SENTINEL_FILE), voltage_min)
    }

    /// Delete warnings left by a previous run
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be removed.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed old battery warnings at {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Feed one voltage reading
    ///
    /// # Returns
    ///
    /// * `Option<BatteryState>` - The new state, if it changed
    pub fn observe(&mut self, voltage: f64, now: NaiveDateTime) -> Option<BatteryState> {
        let next = if voltage < self.voltage_min {
            BatteryState::Dead
        } else {
            BatteryState::Normal
        };

        if next == self.state {
            if self.unwritten.is_some() {
                self.write_warning(false);
            }
            return None;
        }
        self.state = next;

        match next {
            BatteryState::Dead => {
                let message = format!("! Warning, battery is dead: {}", now.format(CTIME_FORMAT));
                warn!("{} ({} V)", message, voltage);
                self.unwritten = Some(message);
                self.write_warning(true);
            }
            BatteryState::Normal => {
                self.unwritten = None;
                info!("Battery back to {} V", voltage);
            }
        }
        Some(next)
    }

    pub fn state(&self) -> BatteryState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a warning is still waiting to reach the sentinel file.
    pub fn warning_pending(&self) -> bool {
        self.unwritten.is_some()
    }

    fn write_warning(&mut self, first_attempt: bool) {
        let Some(message) = self.unwritten.as_deref() else {
            return;
        };
        match self.append(message) {
            Ok(()) => {
                if !first_attempt {
                    info!("Battery warning written to {}", self.path.display());
                }
                self.unwritten = None;
            }
            Err(e) if first_attempt => {
                warn!("Cannot write {}, will retry: {}", self.path.display(), e)
            }
            Err(e) => debug!("Still cannot write {}: {}", self.path.display(), e),
        }
    }

    fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)
    }
}
