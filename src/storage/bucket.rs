//! # Time Buckets
//!
//! A bucket is the rotation period a reading belongs to. It is derived from
//! the local wall clock only, and names both the day folder and the file.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Deserialize;

/// Format of day folder names (`20241010`).
pub const DAY_FORMAT: &str = "%Y%m%d";

/// Extension of the data files.
pub const FILE_EXTENSION: &str = "csv";

/// How long one file covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::Hourly
    }
}

/// One rotation period.
///
/// Ordering is chronological for buckets of the same granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBucket {
    date: NaiveDate,
    hour: Option<u32>,
}

impl TimeBucket {
    /// Bucket containing the given local time.
    pub fn of(now: NaiveDateTime, granularity: Granularity) -> Self {
        let hour = match granularity {
            Granularity::Hourly => Some(now.hour()),
            Granularity::Daily => None,
        };
        Self { date: now.date(), hour }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Hour of day, `None` for daily buckets.
    pub fn hour(&self) -> Option<u32> {
        self.hour
    }

    /// Day folder name, e.g. `20241010`.
    pub fn day_name(&self) -> String {
        self.date.format(DAY_FORMAT).to_string()
    }

    /// Data file name, e.g. `20241010_14.csv` or `20241010.csv`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self, FILE_EXTENSION)
    }

    /// Day folder of this bucket under `root`.
    pub fn day_dir(&self, root: &Path) -> PathBuf {
        root.join(self.day_name())
    }

    /// Full path of this bucket's file under `root`.
    pub fn file_path(&self, root: &Path) -> PathBuf {
        self.day_dir(root).join(self.file_name())
    }

    /// Whether moving from `self` to `next` crosses into another calendar day.
    pub fn crosses_day(&self, next: &TimeBucket) -> bool {
        self.date != next.date
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hour {
            Some(hour) => write!(f, "{}_{:02}", self.day_name(), hour),
            None => write!(f, "{}", self.day_name()),
        }
    }
}
