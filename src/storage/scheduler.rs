//! # Rotation Scheduler
//!
//! Owns the open data file. On every tick it checks whether the wall clock
//! has moved into a new bucket; if so it mirrors the file it just closed,
//! retries earlier failed mirrors, prepares the new day folders and opens
//! the next file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use super::bucket::{Granularity, TimeBucket};
use super::ensure_dir;
use super::mirror::{DrainReport, FsMirror, Mirror, MirrorQueue, MirrorTask};
use super::writer::CsvWriter;
use crate::error::{Result, WindLoggerError};
use crate::record::HeaderLayout;

/// What a tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still in the current bucket, nothing touched
    Unchanged,
    /// A new file was opened
    Rotated(RotationReport),
}

/// Details of one rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    /// Bucket that was closed, if any
    pub previous: Option<TimeBucket>,
    /// Bucket now being written
    pub current: TimeBucket,
    /// Result of mirroring the closed file (`None` if no file was closed)
    pub mirrored: Option<bool>,
    /// Retries of earlier failed mirrors
    pub retried: DrainReport,
    /// Whether day folders were prepared for this bucket
    pub day_prepared: bool,
    /// Mirror tasks pending after this rotation
    pub pending_mirrors: usize,
}

/// Outcome of [`RotationScheduler::finish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishReport {
    /// Result of mirroring the last open file (`None` if none was open)
    pub mirrored: Option<bool>,
    /// Files that never reached the remote share
    pub left_over: Vec<PathBuf>,
}

struct ActiveFile {
    bucket: TimeBucket,
    writer: CsvWriter,
}

/// Decides which file readings go to and mirrors completed files.
///
/// At most one file is open at a time. Directory and copy failures are
/// logged and never stop the caller; failed copies wait in a [`MirrorQueue`]
/// and are retried once per later rotation.
pub struct RotationScheduler<M: Mirror = FsMirror> {
    local_root: PathBuf,
    remote_root: PathBuf,
    layout: HeaderLayout,
    granularity: Granularity,
    mirror: M,
    queue: MirrorQueue,
    current: Option<TimeBucket>,
    active: Option<ActiveFile>,
}

impl<M: Mirror> RotationScheduler<M> {
    /// Create a scheduler
    ///
    /// # Arguments
    ///
    /// * `local_root` - Folder holding the local day folders
    /// * `remote_root` - Mounted share receiving the mirrored copies
    /// * `layout` - Header written at the top of each new file
    /// * `granularity` - Hourly or daily files
    /// * `mirror` - Copy implementation
    pub fn new(
        local_root: impl Into<PathBuf>,
        remote_root: impl Into<PathBuf>,
        layout: HeaderLayout,
        granularity: Granularity,
        mirror: M,
    ) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            layout,
            granularity,
            mirror,
            queue: MirrorQueue::new(),
            current: None,
            active: None,
        }
    }

    /// Drop failed mirrors older than `max_age` instead of retrying forever.
    pub fn with_max_task_age(mut self, max_age: Option<Duration>) -> Self {
        self.queue = MirrorQueue::with_max_age(max_age);
        self
    }

    /// Create the local root and open the first file
    ///
    /// # Errors
    ///
    /// Returns error if the local root or the first file cannot be created.
    pub fn start(&mut self, now: NaiveDateTime) -> Result<TimeBucket> {
        fs::create_dir_all(&self.local_root)?;
        self.tick(now)?;
        self.current
            .ok_or_else(|| WindLoggerError::Io(io::Error::new(io::ErrorKind::Other, "no bucket after start")))
    }

    /// Move to the bucket containing `now`, rotating if it changed
    ///
    /// # Returns
    ///
    /// * `Result<TickOutcome>` - `Unchanged` within the current bucket
    ///
    /// # Errors
    ///
    /// Returns error only if the new file cannot be opened. The next tick in
    /// the same bucket tries to open it again.
    pub fn tick(&mut self, now: NaiveDateTime) -> Result<TickOutcome> {
        let bucket = TimeBucket::of(now, self.granularity);
        let previous = self.current;

        if previous == Some(bucket) && self.active.is_some() {
            return Ok(TickOutcome::Unchanged);
        }

        let mut report = RotationReport {
            previous: None,
            current: bucket,
            mirrored: None,
            retried: DrainReport::default(),
            day_prepared: false,
            pending_mirrors: 0,
        };

        if let Some(prev) = previous.filter(|p| *p != bucket) {
            if bucket < prev {
                warn!("Clock moved backwards from {} to {}, reopening", prev, bucket);
            }
            report.previous = Some(prev);

            let mut failed = None;
            if let Some(closed) = self.active.take() {
                debug!("Closed {}", closed.writer.path().display());
                drop(closed);
                failed = self.mirror_closed(prev, now);
                report.mirrored = Some(failed.is_none());
            }

            // Retry what was queued before this rotation, then queue the
            // fresh failure, so each file gets one attempt per rotation.
            report.retried = self.queue.drain(&self.mirror, now);
            if let Some(task) = failed {
                self.queue.enqueue(task);
            }
        }

        let needs_day = match previous {
            None => true,
            Some(prev) => prev == bucket || prev.crosses_day(&bucket),
        };
        if needs_day {
            self.prepare_day(bucket);
            report.day_prepared = true;
        }

        self.current = Some(bucket);
        report.pending_mirrors = self.queue.len();

        let path = bucket.file_path(&self.local_root);
        let writer = CsvWriter::open(&path, self.layout.header())?;
        info!("Writing to {}", path.display());
        self.active = Some(ActiveFile { bucket, writer });

        Ok(TickOutcome::Rotated(report))
    }

    /// Append one record to the active file
    ///
    /// # Errors
    ///
    /// Returns error if no file is open or the write fails.
    pub fn append<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        match self.active.as_mut() {
            Some(file) => Ok(file.writer.append(fields)?),
            None => Err(WindLoggerError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no data file open",
            ))),
        }
    }

    /// Close the active file, mirror it, and retry the queue once more
    ///
    /// Files still queued afterwards are logged so they can be copied by
    /// hand.
    pub fn finish(&mut self, now: NaiveDateTime) -> FinishReport {
        let mut mirrored = None;
        if let Some(closed) = self.active.take() {
            let bucket = closed.bucket;
            drop(closed);
            let failed = self.mirror_closed(bucket, now);
            mirrored = Some(failed.is_none());
            self.queue.drain(&self.mirror, now);
            if let Some(task) = failed {
                self.queue.enqueue(task);
            }
        } else {
            self.queue.drain(&self.mirror, now);
        }

        let left_over: Vec<PathBuf> = self.queue.iter().map(|t| t.source.clone()).collect();
        for path in &left_over {
            warn!("Not mirrored, please copy manually: {}", path.display());
        }

        FinishReport { mirrored, left_over }
    }

    /// Bucket currently being written.
    pub fn current_bucket(&self) -> Option<TimeBucket> {
        self.current
    }

    /// Path of the open file.
    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|f| f.writer.path())
    }

    /// Failed mirrors waiting for the next rotation.
    pub fn pending_mirrors(&self) -> &MirrorQueue {
        &self.queue
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn remote_root(&self) -> &Path {
        &self.remote_root
    }

    fn mirror_closed(&self, bucket: TimeBucket, now: NaiveDateTime) -> Option<MirrorTask> {
        let source = bucket.file_path(&self.local_root);
        let dest_dir = bucket.day_dir(&self.remote_root);

        match self.mirror.copy(&source, &dest_dir) {
            Ok(()) => {
                info!("Mirrored {} to {}", source.display(), dest_dir.display());
                None
            }
            Err(e) => {
                warn!("Mirror of {} failed, will try again later: {}", source.display(), e);
                Some(MirrorTask::new(source, dest_dir, now))
            }
        }
    }

    fn prepare_day(&self, bucket: TimeBucket) {
        for root in [&self.local_root, &self.remote_root] {
            let dir = bucket.day_dir(root);
            match ensure_dir(&dir) {
                Ok(true) => info!("Created day folder {}", dir.display()),
                Ok(false) => debug!("Day folder {} already exists", dir.display()),
                Err(e) => warn!("Cannot create day folder {}: {}", dir.display(), e),
            }
        }
    }
}
