//! # Station Module
//!
//! The polling loop: one anemometer line per iteration, stamped with the
//! local clock and the battery voltage, appended to the current data file.
//!
//! This module handles:
//! - Rotation ticks before every reading
//! - Battery sampling with the dead-battery alarm
//! - Feeding the live plot windows
//! - Stop and clear requests from the controlling task

pub mod alarm;
pub mod control;
pub mod plot;

pub use alarm::{BatteryAlarm, BatteryState};
pub use control::{channel, ControlHandle, StationControl};
pub use plot::PlotFeed;

use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use crate::error::{Result, WindLoggerError};
use crate::record::{parse_line, HeaderLayout, ParseError, Record};
use crate::sensor::{LineSource, VoltageSource};
use crate::storage::scheduler::FinishReport;
use crate::storage::{FsMirror, Mirror, RotationScheduler, TickOutcome};

/// Pause after the anemometer stream goes away, before reading again
const DEFAULT_UNAVAILABLE_BACKOFF: Duration = Duration::from_secs(1);

/// Counters kept across the run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StationStats {
    pub written: u64,
    pub rejected: u64,
    pub stalls: u64,
    pub battery_failures: u64,
    pub rotations: u64,
}

/// What one iteration produced
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Written(Record),
    /// Line did not parse; nothing was written
    Rejected(ParseError),
}

/// Result of [`Station::run`]
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: StationStats,
    pub finish: FinishReport,
}

/// One anemometer, an optional battery monitor, and the data files
pub struct Station<L: LineSource, V: VoltageSource, M: Mirror = FsMirror> {
    lines: L,
    battery: Option<V>,
    scheduler: RotationScheduler<M>,
    layout: HeaderLayout,
    alarm: Option<BatteryAlarm>,
    plots: Option<PlotFeed>,
    unavailable_backoff: Duration,
    stats: StationStats,
}

impl<L: LineSource, V: VoltageSource, M: Mirror> Station<L, V, M> {
    /// Create a station
    ///
    /// # Arguments
    ///
    /// * `lines` - Anemometer line source
    /// * `battery` - Battery monitor, `None` to leave the column empty
    /// * `scheduler` - Rotation scheduler, normally already started
    /// * `layout` - Field layout of the anemometer output and data files
    pub fn new(
        lines: L,
        battery: Option<V>,
        scheduler: RotationScheduler<M>,
        layout: HeaderLayout,
    ) -> Self {
        Self {
            lines,
            battery,
            scheduler,
            layout,
            alarm: None,
            plots: None,
            unavailable_backoff: DEFAULT_UNAVAILABLE_BACKOFF,
            stats: StationStats::default(),
        }
    }

    pub fn with_alarm(mut self, alarm: BatteryAlarm) -> Self {
        self.alarm = Some(alarm);
        self
    }

    pub fn with_plots(mut self, plots: PlotFeed) -> Self {
        self.plots = Some(plots);
        self
    }

    pub fn with_unavailable_backoff(mut self, backoff: Duration) -> Self {
        self.unavailable_backoff = backoff;
        self
    }

    /// Run one iteration at `now`
    ///
    /// Ticks the scheduler, samples the battery, reads one line and appends
    /// it to the current file. A line that fails to parse writes nothing.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No line arrives within the read timeout
    /// - The anemometer stream is gone
    /// - The row cannot be written
    pub async fn step(&mut self, now: DateTime<Local>) -> Result<StepOutcome> {
        match self.scheduler.tick(now.naive_local()) {
            Ok(TickOutcome::Unchanged) => {}
            Ok(TickOutcome::Rotated(report)) => {
                self.stats.rotations += 1;
                if report.pending_mirrors > 0 {
                    warn!("{} file(s) waiting for the remote share", report.pending_mirrors);
                }
            }
            // The append below fails too; the next tick retries the open
            Err(e) => warn!("Cannot open data file for {}: {}", now.naive_local(), e),
        }

        let battery_v = self.sample_battery(now);

        let line = self.lines.next_line().await?;
        let reading = match parse_line(&line, self.layout) {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.rejected += 1;
                debug!("Invalid data ({}): {:?}", e, line);
                return Ok(StepOutcome::Rejected(e));
            }
        };

        let record = Record {
            epoch: now.timestamp_millis() as f64 / 1000.0,
            local_time: now.naive_local(),
            reading,
            battery_v,
        };
        self.scheduler.append(&record.to_record(self.layout))?;
        self.stats.written += 1;

        if let Some(plots) = self.plots.as_mut() {
            let r = &record.reading;
            if let Err(e) = plots.push_wind(r.corrected_direction, r.corrected_speed) {
                debug!("Wind snapshot not written: {}", e);
            }
        }

        Ok(StepOutcome::Written(record))
    }

    /// Poll until `control` asks to stop
    ///
    /// Errors inside an iteration are logged and the loop carries on. On
    /// exit the open file is closed and mirrored.
    pub async fn run(&mut self, control: StationControl) -> RunSummary {
        info!("Station running with {:?} layout", self.layout);

        while !control.should_stop() {
            if control.take_clear() {
                self.clear_plots();
            }

            match self.step(Local::now()).await {
                Ok(_) => {}
                Err(WindLoggerError::DeviceStalled(waited)) => {
                    self.stats.stalls += 1;
                    warn!("Anemometer sent nothing for {:?}", waited);
                }
                Err(WindLoggerError::DeviceUnavailable(msg)) => {
                    error!("Anemometer unavailable: {}", msg);
                    tokio::time::sleep(self.unavailable_backoff).await;
                }
                Err(e) => warn!("Reading skipped: {}", e),
            }
        }

        info!("Stop requested, closing {:?}", self.scheduler.active_path());
        let finish = self.scheduler.finish(Local::now().naive_local());
        info!(
            "Station stopped: {} rows written, {} rejected, {} stalls",
            self.stats.written, self.stats.rejected, self.stats.stalls
        );

        RunSummary {
            stats: self.stats.clone(),
            finish,
        }
    }

    /// Empty the plot windows, if the feed is on.
    pub fn clear_plots(&mut self) {
        if let Some(plots) = self.plots.as_mut() {
            match plots.clear() {
                Ok(()) => info!("Plots cleared"),
                Err(e) => warn!("Plots cleared, snapshots not rewritten: {}", e),
            }
        }
    }

    pub fn stats(&self) -> &StationStats {
        &self.stats
    }

    pub fn scheduler(&self) -> &RotationScheduler<M> {
        &self.scheduler
    }

    pub fn plots(&self) -> Option<&PlotFeed> {
        self.plots.as_ref()
    }

    fn sample_battery(&mut self, now: DateTime<Local>) -> Option<f64> {
        let volts = match self.battery.as_mut()?.supply_voltage() {
            Ok(v) => v,
            Err(e) => {
                self.stats.battery_failures += 1;
                warn!("Battery read failed: {}", e);
                return None;
            }
        };
        debug!("Battery {} V", volts);

        if let Some(alarm) = self.alarm.as_mut() {
            alarm.observe(volts, now.naive_local());
        }
        if let Some(plots) = self.plots.as_mut() {
            let epoch = now.timestamp_millis() as f64 / 1000.0;
            if let Err(e) = plots.push_voltage(epoch, volts) {
                debug!("Battery snapshot not written: {}", e);
            }
        }
        Some(volts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlotConfig;
    use crate::sensor::port_trait::mocks::{MockLineSource, MockVoltage, Scripted};
    use crate::storage::Granularity;
    use chrono::TimeZone;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const LINE: &str =
        "Q,-0.52,1.31,158,1.41,201,1.38,1012.6,45.3,21.4,9.2,+51.507200:-000.127600:+00035.10,2024-10-10T14:03:22,12.4,0000,2C";

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 10, 10, h, m, s).unwrap()
    }

    struct Rig {
        local: TempDir,
        remote: TempDir,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                local: TempDir::new().unwrap(),
                remote: TempDir::new().unwrap(),
            }
        }

        fn station(
            &self,
            lines: MockLineSource,
            battery: Option<MockVoltage>,
            start: DateTime<Local>,
        ) -> Station<MockLineSource, MockVoltage> {
            let mut scheduler = RotationScheduler::new(
                self.local.path(),
                self.remote.path(),
                HeaderLayout::Full,
                Granularity::Hourly,
                FsMirror,
            );
            scheduler.start(start.naive_local()).unwrap();
            Station::new(lines, battery, scheduler, HeaderLayout::Full)
        }

        fn hour_file(&self, hour: u32) -> String {
            let path = self
                .local
                .path()
                .join(format!("20241010/20241010_{:02}.csv", hour));
            fs::read_to_string(path).unwrap()
        }
    }

    fn data_rows(contents: &str) -> Vec<&str> {
        contents.lines().skip(1).collect()
    }

    #[tokio::test]
    async fn test_step_writes_stamped_row() {
        let rig = Rig::new();
        let battery = MockVoltage::new(&[12.61]);
        let mut station = rig.station(MockLineSource::new(&[LINE]), Some(battery), at(14, 3, 0));

        let outcome = station.step(at(14, 3, 22)).await.unwrap();
        let record = match outcome {
            StepOutcome::Written(record) => record,
            other => panic!("expected a written row, got {:?}", other),
        };
        assert_eq!(record.battery_v, Some(12.61));
        assert_eq!(record.epoch, at(14, 3, 22).timestamp() as f64);
        assert_eq!(record.reading.corrected_direction, 201);

        let contents = rig.hour_file(14);
        let rows = data_rows(&contents);
        assert_eq!(rows.len(), 1);
        let parsed = Record::from_row(rows[0], HeaderLayout::Full).unwrap();
        assert_eq!(parsed.local_time, at(14, 3, 22).naive_local());
        assert_eq!(parsed.battery_v, Some(12.61));
        assert_eq!(station.stats().written, 1);
    }

    #[tokio::test]
    async fn test_malformed_line_writes_nothing_and_loop_proceeds() {
        let rig = Rig::new();
        let mut station = rig.station(MockLineSource::new(&["bad,data", LINE]), None, at(14, 0, 0));
        let before = rig.hour_file(14);

        let outcome = station.step(at(14, 0, 1)).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Rejected(_)));
        assert_eq!(rig.hour_file(14), before, "no bytes written for a bad line");

        let outcome = station.step(at(14, 0, 2)).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Written(_)));
        assert_eq!(data_rows(&rig.hour_file(14)).len(), 1);
        assert_eq!(station.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_battery_failure_leaves_column_empty() {
        let rig = Rig::new();
        let battery = MockVoltage::default();
        battery.push_failure();
        let mut station = rig.station(MockLineSource::new(&[LINE]), Some(battery), at(14, 0, 0));

        station.step(at(14, 0, 1)).await.unwrap();

        let contents = rig.hour_file(14);
        let row = data_rows(&contents)[0];
        assert!(row.ends_with(','), "empty battery field: {}", row);
        assert_eq!(station.stats().battery_failures, 1);
    }

    #[tokio::test]
    async fn test_stall_is_error_without_write() {
        let rig = Rig::new();
        let lines = MockLineSource::default();
        lines.push(Scripted::Stall);
        let mut station = rig.station(lines, None, at(14, 0, 0));

        match station.step(at(14, 0, 5)).await {
            Err(WindLoggerError::DeviceStalled(_)) => {}
            other => panic!("Expected DeviceStalled, got: {:?}", other),
        }
        assert!(data_rows(&rig.hour_file(14)).is_empty());
    }

    #[tokio::test]
    async fn test_step_rotates_on_hour_boundary() {
        let rig = Rig::new();
        let mut station = rig.station(MockLineSource::new(&[LINE, LINE]), None, at(14, 59, 59));

        station.step(at(14, 59, 59)).await.unwrap();
        station.step(at(15, 0, 0)).await.unwrap();

        assert_eq!(data_rows(&rig.hour_file(14)).len(), 1);
        assert_eq!(data_rows(&rig.hour_file(15)).len(), 1);
        assert!(rig.remote.path().join("20241010/20241010_14.csv").is_file());
        assert_eq!(station.stats().rotations, 1);
    }

    #[tokio::test]
    async fn test_low_battery_raises_alarm_once() {
        let rig = Rig::new();
        let battery = MockVoltage::new(&[11.8, 11.7]);
        let alarm = BatteryAlarm::under(rig.remote.path(), 12.2);
        let sentinel = alarm.path().to_path_buf();
        let mut station = rig
            .station(MockLineSource::new(&[LINE, LINE]), Some(battery), at(14, 0, 0))
            .with_alarm(alarm);

        station.step(at(14, 0, 1)).await.unwrap();
        station.step(at(14, 0, 2)).await.unwrap();

        let warnings = fs::read_to_string(sentinel).unwrap();
        assert_eq!(warnings.lines().count(), 1);
        assert!(warnings.starts_with("! Warning, battery is dead: "));
    }

    #[tokio::test]
    async fn test_plots_fed_and_cleared() {
        let rig = Rig::new();
        let battery = MockVoltage::new(&[12.5, 12.5]);
        let plots = PlotFeed::new(&PlotConfig::default(), Some(rig.local.path().to_path_buf()));
        let mut station = rig
            .station(MockLineSource::new(&[LINE, LINE]), Some(battery), at(14, 0, 0))
            .with_plots(plots);

        station.step(at(14, 0, 1)).await.unwrap();
        station.step(at(14, 0, 2)).await.unwrap();

        let feed = station.plots().unwrap();
        assert_eq!(feed.wind_points().count(), 2);
        assert_eq!(feed.voltage_points().count(), 1, "one battery point per interval");
        assert!(rig.local.path().join(plot::WIND_SNAPSHOT).is_file());

        station.clear_plots();
        assert_eq!(station.plots().unwrap().wind_points().count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_immediately_and_mirrors_open_file() {
        let rig = Rig::new();
        let lines = MockLineSource::new(&[LINE]);
        let observed = lines.clone();
        let mut station = rig.station(lines, None, Local::now());

        let (handle, control) = channel();
        handle.stop();
        let summary = station.run(control).await;

        assert_eq!(observed.read_count(), 0);
        assert_eq!(summary.stats.written, 0);
        assert_eq!(summary.finish.mirrored, Some(true));
        assert!(station.scheduler().active_path().is_none());
    }

    #[tokio::test]
    async fn test_run_survives_bad_lines_and_stalls() {
        let rig = Rig::new();
        let lines = MockLineSource::new(&["bad,data", LINE]);
        lines.push(Scripted::Stall);
        lines.push(Scripted::Line(LINE.to_string()));
        let observed = lines.clone();

        let mut station = rig
            .station(lines, None, Local::now())
            .with_unavailable_backoff(Duration::from_millis(5));
        let (handle, control) = channel();

        let task = tokio::spawn(async move {
            let summary = station.run(control).await;
            (station, summary)
        });

        // Script is exhausted after four reads; the mock then reports closed
        while observed.read_count() < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.stop();
        let (_station, summary) = task.await.unwrap();

        assert_eq!(summary.stats.written, 2);
        assert_eq!(summary.stats.rejected, 1);
        assert_eq!(summary.stats.stalls, 1);
        assert!(summary.finish.left_over.is_empty());

        let rows: usize = csv_rows_under(rig.local.path());
        assert_eq!(rows, 2);
    }

    fn csv_rows_under(root: &Path) -> usize {
        let mut total = 0;
        for day in fs::read_dir(root).unwrap() {
            let day = day.unwrap().path();
            if !day.is_dir() {
                continue;
            }
            for file in fs::read_dir(&day).unwrap() {
                let contents = fs::read_to_string(file.unwrap().path()).unwrap();
                total += contents.lines().count().saturating_sub(1);
            }
        }
        total
    }
}
