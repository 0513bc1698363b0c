//! # CSV Writer
//!
//! Append-only writer for one data file. Every line is flushed as soon as it
//! is written, so a crash loses at most the line in flight.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use csv::{Terminator, WriterBuilder};

/// Open data file in append mode.
#[derive(Debug)]
pub struct CsvWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl CsvWriter {
    /// Open `path` for appending, writing `header` first if the file is new
    ///
    /// An existing non-empty file is appended to as-is, so restarting within
    /// the same bucket neither truncates data nor repeats the header.
    ///
    /// # Arguments
    ///
    /// * `path` - Data file
    /// * `header` - Comma separated column names
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or the header write fails.
    pub fn open(path: &Path, header: &str) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;

        // Column count is fixed by the layout, not checked here
        let writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(file);
        let mut writer = Self {
            writer,
            path: path.to_path_buf(),
        };

        if is_new {
            writer.append(header.split(','))?;
        }
        Ok(writer)
    }

    /// Write one record and flush it.
    pub fn append<I, T>(&mut self, fields: I) -> io::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(fields)?;
        self.writer.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_new_file_gets_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("20241010_14.csv");

        let mut writer = CsvWriter::open(&path, "a,b").unwrap();
        writer.append(["1", "2"]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n1,2\n");
        assert_eq!(writer.path(), path.as_path());
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("20241010_14.csv");

        CsvWriter::open(&path, "a,b").unwrap().append(["1", "2"]).unwrap();
        CsvWriter::open(&path, "a,b").unwrap().append(["3", "4"]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n1,2\n3,4\n");
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("20241010_14.csv");
        fs::write(&path, "").unwrap();

        CsvWriter::open(&path, "a,b").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n");
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("20241010_14.csv");

        let mut writer = CsvWriter::open(&path, "a,b,c").unwrap();
        writer.append(["1.5", " 2024-10-10 14:03:22", ""]).unwrap();
        writer.append(["NOFIX, no sats", "x", "y"]).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "a,b,c\n1.5, 2024-10-10 14:03:22,\n\"NOFIX, no sats\",x,y\n"
        );
    }

    #[test]
    fn test_record_written_and_read_back() {
        use crate::record::{parse_line, HeaderLayout, Record};
        use chrono::NaiveDate;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("20241010_14.csv");
        let line = "Q,158,1.41,201,1.38,1012.6,45.3,21.4,9.2,+51.507200:-000.127600:+00035.10,2024-10-10T14:03:22,12.4,0000";
        let record = Record {
            epoch: 1_728_568_800.0,
            local_time: NaiveDate::from_ymd_opt(2024, 10, 10)
                .unwrap()
                .and_hms_opt(14, 3, 22)
                .unwrap(),
            reading: parse_line(line, HeaderLayout::Compact).unwrap(),
            battery_v: Some(12.61),
        };

        let mut writer = CsvWriter::open(&path, HeaderLayout::Compact.header()).unwrap();
        writer.append(&record.to_record(HeaderLayout::Compact)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = contents.lines().collect();
        assert_eq!(rows[0], HeaderLayout::Compact.header());
        let back = Record::from_row(rows[1], HeaderLayout::Compact).unwrap();
        assert_eq!(back.reading, record.reading);
        assert_eq!(back.battery_v, Some(12.61));
    }

    #[test]
    fn test_open_in_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("x.csv");
        assert!(CsvWriter::open(&path, "a,b").is_err());
    }
}
