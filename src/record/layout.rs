//! # CSV Layouts
//!
//! Column layouts of the hourly CSV files and the matching positions in the
//! anemometer's raw output line.

use serde::Deserialize;

/// Header of the full (18 column) layout.
pub const FULL_HEADER: &str = "epoch_time,local_clock_time,velocity_u_m/s,velocity_v_m/s,\
Direction,Speed_m/s,Corrected_Direction,Corrected_Speed_m/s,Pressure_hPa,\
Relative_Humidity_%,Temperature_C,Dew_point_C,GPS_Latitude,GPS_longitude,\
GPS_Height_m,GPS_Time,Supply_Voltage,Battery_V";

/// Header of the compact (15 column) layout: no raw u/v, no GPS time.
pub const COMPACT_HEADER: &str = "epoch_time,local_clock_time,Direction,Speed_m/s,\
Corrected_Direction,Corrected_Speed_m/s,Pressure_hPa,Relative_Humidity_%,\
Temperature_C,Dew_point_C,GPS_Latitude,GPS_longitude,GPS_Height_m,\
Supply_Voltage,Battery_V";

/// Separator between the GPS latitude, longitude and height in the raw line.
pub const GPS_SEPARATOR: char = ':';

/// Which columns the instrument emits and the CSV files carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLayout {
    /// 18 columns, including raw u/v velocity and GPS time
    Full,
    /// 15 columns
    Compact,
}

/// Positions of each field in the instrument's comma separated line.
///
/// Index 0 is the node letter and is never read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPositions {
    pub velocity_u: Option<usize>,
    pub velocity_v: Option<usize>,
    pub direction: usize,
    pub speed: usize,
    pub corrected_direction: usize,
    pub corrected_speed: usize,
    pub pressure: usize,
    pub humidity: usize,
    pub temperature: usize,
    pub dew_point: usize,
    pub gps: usize,
    pub gps_time: Option<usize>,
    pub supply_voltage: usize,
}

const FULL_POSITIONS: RawPositions = RawPositions {
    velocity_u: Some(1),
    velocity_v: Some(2),
    direction: 3,
    speed: 4,
    corrected_direction: 5,
    corrected_speed: 6,
    pressure: 7,
    humidity: 8,
    temperature: 9,
    dew_point: 10,
    gps: 11,
    gps_time: Some(12),
    supply_voltage: 13,
};

// Field 10 is the GPS time, which the compact files leave out.
const COMPACT_POSITIONS: RawPositions = RawPositions {
    velocity_u: None,
    velocity_v: None,
    direction: 1,
    speed: 2,
    corrected_direction: 3,
    corrected_speed: 4,
    pressure: 5,
    humidity: 6,
    temperature: 7,
    dew_point: 8,
    gps: 9,
    gps_time: None,
    supply_voltage: 11,
};

impl HeaderLayout {
    /// CSV header line, without the trailing newline.
    pub fn header(&self) -> &'static str {
        match self {
            HeaderLayout::Full => FULL_HEADER,
            HeaderLayout::Compact => COMPACT_HEADER,
        }
    }

    /// Number of columns in a written row.
    pub fn column_count(&self) -> usize {
        match self {
            HeaderLayout::Full => 18,
            HeaderLayout::Compact => 15,
        }
    }

    /// Where each field sits in the raw instrument line.
    pub fn raw_positions(&self) -> RawPositions {
        match self {
            HeaderLayout::Full => FULL_POSITIONS,
            HeaderLayout::Compact => COMPACT_POSITIONS,
        }
    }

    /// Whether rows carry raw u/v velocity and GPS time.
    pub fn is_full(&self) -> bool {
        matches!(self, HeaderLayout::Full)
    }
}

impl Default for HeaderLayout {
    fn default() -> Self {
        HeaderLayout::Full
    }
}
