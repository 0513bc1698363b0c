//! # Reading Parser
//!
//! Turns the anemometer's comma separated output into a [`Reading`], and
//! converts [`Record`]s to and from CSV rows.

use std::str::FromStr;

use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};

use super::layout::{HeaderLayout, GPS_SEPARATOR};
use super::{GpsFix, ParseError, Reading, Record, CLOCK_FORMAT};

/// Parse one raw instrument line
///
/// # Arguments
///
/// * `line` - Line as read from the serial port (trailing CR/LF allowed)
/// * `layout` - Which fields the instrument is configured to emit
///
/// # Returns
///
/// * `Result<Reading, ParseError>` - All declared fields, or the first failure
///
/// # Errors
///
/// Returns error if:
/// - The line is empty
/// - A declared field is missing
/// - A numeric field does not convert
/// - The GPS field is not a `lat:lon:height` triplet
///
/// Fields beyond the last declared position are ignored.
pub fn parse_line(line: &str, layout: HeaderLayout) -> Result<Reading, ParseError> {
    if line.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let pos = layout.raw_positions();

    let velocity_u = match pos.velocity_u {
        Some(i) => Some(number(&fields, i, "velocity_u")?),
        None => None,
    };
    let velocity_v = match pos.velocity_v {
        Some(i) => Some(number(&fields, i, "velocity_v")?),
        None => None,
    };

    let direction = number(&fields, pos.direction, "direction")?;
    let speed = number(&fields, pos.speed, "speed")?;
    let corrected_direction = number(&fields, pos.corrected_direction, "corrected_direction")?;
    let corrected_speed = number(&fields, pos.corrected_speed, "corrected_speed")?;
    let pressure_hpa = number(&fields, pos.pressure, "pressure")?;
    let relative_humidity = number(&fields, pos.humidity, "relative_humidity")?;
    let temperature_c = number(&fields, pos.temperature, "temperature")?;
    let dew_point_c = number(&fields, pos.dew_point, "dew_point")?;
    let gps = parse_gps(field(&fields, pos.gps, "gps")?)?;

    let gps_time = match pos.gps_time {
        Some(i) => Some(field(&fields, i, "gps_time")?.to_string()),
        None => None,
    };

    let supply_voltage = number(&fields, pos.supply_voltage, "supply_voltage")?;

    Ok(Reading {
        velocity_u,
        velocity_v,
        direction,
        speed,
        corrected_direction,
        corrected_speed,
        pressure_hpa,
        relative_humidity,
        temperature_c,
        dew_point_c,
        gps,
        gps_time,
        supply_voltage,
    })
}

fn field<'a>(fields: &[&'a str], index: usize, name: &'static str) -> Result<&'a str, ParseError> {
    fields
        .get(index)
        .copied()
        .ok_or(ParseError::MissingField { index, name })
}

fn number<T: FromStr>(fields: &[&str], index: usize, name: &'static str) -> Result<T, ParseError> {
    let value = field(fields, index, name)?;
    value.parse().map_err(|_| ParseError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}

fn parse_gps(value: &str) -> Result<GpsFix, ParseError> {
    let parts: Vec<&str> = value.split(GPS_SEPARATOR).map(str::trim).collect();
    match parts.as_slice() {
        [latitude, longitude, height] => Ok(GpsFix {
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
            height: height.to_string(),
        }),
        _ => Err(ParseError::MalformedGps(value.to_string())),
    }
}

impl Record {
    /// Columns of one data file row
    ///
    /// The clock column carries a leading space so spreadsheet tools keep it
    /// as text. A missing battery voltage is written as an empty field.
    pub fn to_record(&self, layout: HeaderLayout) -> StringRecord {
        let r = &self.reading;
        let mut record = StringRecord::with_capacity(256, layout.column_count());

        record.push_field(&format!("{:.3}", self.epoch));
        record.push_field(&format!(" {}", self.local_time.format(CLOCK_FORMAT)));
        if layout.is_full() {
            record.push_field(&opt_to_string(r.velocity_u));
            record.push_field(&opt_to_string(r.velocity_v));
        }
        record.push_field(&r.direction.to_string());
        record.push_field(&r.speed.to_string());
        record.push_field(&r.corrected_direction.to_string());
        record.push_field(&r.corrected_speed.to_string());
        record.push_field(&r.pressure_hpa.to_string());
        record.push_field(&r.relative_humidity.to_string());
        record.push_field(&r.temperature_c.to_string());
        record.push_field(&r.dew_point_c.to_string());
        record.push_field(&r.gps.latitude);
        record.push_field(&r.gps.longitude);
        record.push_field(&r.gps.height);
        if layout.is_full() {
            record.push_field(r.gps_time.as_deref().unwrap_or_default());
        }
        record.push_field(&r.supply_voltage.to_string());
        record.push_field(&opt_to_string(self.battery_v));

        record
    }

    /// Parse one line of a data file written through [`Record::to_record`]
    ///
    /// # Errors
    ///
    /// Returns error if the line is not valid CSV, or see
    /// [`Record::from_record`].
    pub fn from_row(row: &str, layout: HeaderLayout) -> Result<Record, ParseError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(row.as_bytes());

        match reader.records().next() {
            Some(Ok(record)) => Record::from_record(&record, layout),
            Some(Err(e)) => Err(ParseError::Csv(e.to_string())),
            None => Err(ParseError::Empty),
        }
    }

    /// Convert data file columns back into a record
    ///
    /// # Errors
    ///
    /// Returns error if the column count does not match `layout` or any
    /// typed column fails to convert.
    pub fn from_record(record: &StringRecord, layout: HeaderLayout) -> Result<Record, ParseError> {
        let fields: Vec<&str> = record.iter().map(str::trim).collect();
        if fields.len() != layout.column_count() {
            return Err(ParseError::ColumnCount {
                expected: layout.column_count(),
                found: fields.len(),
            });
        }

        let epoch = number(&fields, 0, "epoch_time")?;
        let local_time = NaiveDateTime::parse_from_str(fields[1], CLOCK_FORMAT)
            .map_err(|_| ParseError::InvalidTimestamp(fields[1].to_string()))?;

        let mut i = 2;
        let mut next = || {
            let index = i;
            i += 1;
            index
        };

        let (velocity_u, velocity_v) = if layout.is_full() {
            (
                Some(number(&fields, next(), "velocity_u")?),
                Some(number(&fields, next(), "velocity_v")?),
            )
        } else {
            (None, None)
        };
        let direction = number(&fields, next(), "direction")?;
        let speed = number(&fields, next(), "speed")?;
        let corrected_direction = number(&fields, next(), "corrected_direction")?;
        let corrected_speed = number(&fields, next(), "corrected_speed")?;
        let pressure_hpa = number(&fields, next(), "pressure")?;
        let relative_humidity = number(&fields, next(), "relative_humidity")?;
        let temperature_c = number(&fields, next(), "temperature")?;
        let dew_point_c = number(&fields, next(), "dew_point")?;
        let gps = GpsFix {
            latitude: field(&fields, next(), "gps_latitude")?.to_string(),
            longitude: field(&fields, next(), "gps_longitude")?.to_string(),
            height: field(&fields, next(), "gps_height")?.to_string(),
        };
        let gps_time = if layout.is_full() {
            Some(field(&fields, next(), "gps_time")?.to_string())
        } else {
            None
        };
        let supply_voltage = number(&fields, next(), "supply_voltage")?;

        let battery_field = field(&fields, next(), "battery_v")?;
        let battery_v = if battery_field.is_empty() {
            None
        } else {
            Some(battery_field.parse().map_err(|_| ParseError::InvalidNumber {
                name: "battery_v",
                value: battery_field.to_string(),
            })?)
        };

        Ok(Record {
            epoch,
            local_time,
            reading: Reading {
                velocity_u,
                velocity_v,
                direction,
                speed,
                corrected_direction,
                corrected_speed,
                pressure_hpa,
                relative_humidity,
                temperature_c,
                dew_point_c,
                gps,
                gps_time,
                supply_voltage,
            },
            battery_v,
        })
    }
}

fn opt_to_string(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
