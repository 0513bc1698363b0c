//! # Mirror Queue
//!
//! Copies completed files to the remote share and remembers the copies that
//! failed, so they can be retried at the next rotation.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use super::ensure_dir;

/// Copies one file into a destination directory
#[cfg_attr(test, mockall::automock)]
pub trait Mirror {
    /// Copy `source` into `dest_dir`, keeping its file name.
    fn copy(&self, source: &Path, dest_dir: &Path) -> io::Result<()>;
}

/// Mirror backed by the local filesystem (network mounts included).
///
/// The destination day folder is created when missing, but never its
/// parents: a missing remote root means the share is not mounted, and the
/// copy must fail rather than write onto the bare mount point.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMirror;

impl Mirror for FsMirror {
    fn copy(&self, source: &Path, dest_dir: &Path) -> io::Result<()> {
        let name = source.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no file name in {}", source.display()),
            )
        })?;

        ensure_dir(dest_dir)?;
        let dest = dest_dir.join(name);
        fs::copy(source, &dest)?;

        // Keep the modification time, like `cp -p`
        let modified = fs::metadata(source)?.modified()?;
        fs::File::options().write(true).open(&dest)?.set_modified(modified)?;
        Ok(())
    }
}

/// A copy that failed and waits for a retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTask {
    /// Completed local file
    pub source: PathBuf,
    /// Remote day folder
    pub dest_dir: PathBuf,
    /// Local time of the first failed attempt
    pub enqueued_at: NaiveDateTime,
}

impl MirrorTask {
    pub fn new(source: PathBuf, dest_dir: PathBuf, enqueued_at: NaiveDateTime) -> Self {
        Self {
            source,
            dest_dir,
            enqueued_at,
        }
    }
}

/// Outcome of one pass over the queue
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Files copied in this pass, in queue order
    pub copied: Vec<PathBuf>,
    /// Files dropped because they exceeded the maximum task age
    pub evicted: Vec<PathBuf>,
    /// Tasks still waiting after this pass
    pub remaining: usize,
}

/// FIFO of failed copies.
///
/// Retry order is insertion order and a failed retry never moves a task.
/// Without a maximum age, tasks are retried forever.
#[derive(Debug, Default)]
pub struct MirrorQueue {
    tasks: VecDeque<MirrorTask>,
    max_age: Option<Duration>,
}

impl MirrorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue whose tasks are dropped once older than `max_age`.
    pub fn with_max_age(max_age: Option<Duration>) -> Self {
        Self {
            tasks: VecDeque::new(),
            max_age,
        }
    }

    /// Append a task to the end of the queue.
    pub fn enqueue(&mut self, task: MirrorTask) {
        debug!("Queued mirror of {} ({} pending)", task.source.display(), self.tasks.len() + 1);
        self.tasks.push_back(task);
    }

    /// Retry every pending task once, in order
    ///
    /// # Arguments
    ///
    /// * `mirror` - Performs the copies
    /// * `now` - Local time, used for age-based eviction
    ///
    /// # Returns
    ///
    /// * `DrainReport` - What was copied, evicted, and how many remain
    pub fn drain<M: Mirror + ?Sized>(&mut self, mirror: &M, now: NaiveDateTime) -> DrainReport {
        let mut report = DrainReport::default();
        let pending = std::mem::take(&mut self.tasks);

        for task in pending {
            if let Some(max_age) = self.max_age {
                if now - task.enqueued_at > max_age {
                    warn!(
                        "Giving up on mirror of {} (queued since {})",
                        task.source.display(),
                        task.enqueued_at
                    );
                    report.evicted.push(task.source);
                    continue;
                }
            }

            match mirror.copy(&task.source, &task.dest_dir) {
                Ok(()) => {
                    info!("Mirror retry succeeded: {}", task.source.display());
                    report.copied.push(task.source);
                }
                Err(e) => {
                    debug!("Mirror retry failed for {}: {}", task.source.display(), e);
                    self.tasks.push_back(task);
                }
            }
        }

        report.remaining = self.tasks.len();
        report
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Pending tasks, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MirrorTask> {
        self.tasks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn t(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, 10)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn task(name: &str) -> MirrorTask {
        MirrorTask::new(PathBuf::from(name), PathBuf::from("/remote/20241010"), t(1))
    }

    fn offline() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "share offline")
    }

    /// Mirror that fails for the listed sources and records every attempt
    struct ScriptedMirror {
        failing: Vec<PathBuf>,
        attempts: RefCell<Vec<PathBuf>>,
    }

    impl ScriptedMirror {
        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(PathBuf::from).collect(),
                attempts: RefCell::new(Vec::new()),
            }
        }
    }

    impl Mirror for ScriptedMirror {
        fn copy(&self, source: &Path, _dest_dir: &Path) -> io::Result<()> {
            self.attempts.borrow_mut().push(source.to_path_buf());
            if self.failing.iter().any(|f| f == source) {
                Err(offline())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_failed_task_stays_then_clears() {
        let mut queue = MirrorQueue::new();
        queue.enqueue(task("a.csv"));

        let mut mirror = MockMirror::new();
        mirror
            .expect_copy()
            .withf(|source, _| source == Path::new("a.csv"))
            .times(1)
            .returning(|_, _| Err(offline()));
        let report = queue.drain(&mirror, t(2));
        assert!(report.copied.is_empty());
        assert_eq!(report.remaining, 1);
        assert_eq!(queue.len(), 1);

        let mut mirror = MockMirror::new();
        mirror.expect_copy().times(1).returning(|_, _| Ok(()));
        let report = queue.drain(&mirror, t(3));
        assert_eq!(report.copied, vec![PathBuf::from("a.csv")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_partial_failure_keeps_order() {
        let mut queue = MirrorQueue::new();
        for name in ["a.csv", "b.csv", "c.csv", "d.csv"] {
            queue.enqueue(task(name));
        }

        let mirror = ScriptedMirror::failing(&["a.csv", "c.csv"]);
        let report = queue.drain(&mirror, t(2));

        assert_eq!(
            *mirror.attempts.borrow(),
            vec![
                PathBuf::from("a.csv"),
                PathBuf::from("b.csv"),
                PathBuf::from("c.csv"),
                PathBuf::from("d.csv"),
            ],
            "each task attempted exactly once, in order"
        );
        assert_eq!(report.copied, vec![PathBuf::from("b.csv"), PathBuf::from("d.csv")]);

        let left: Vec<&Path> = queue.iter().map(|t| t.source.as_path()).collect();
        assert_eq!(left, vec![Path::new("a.csv"), Path::new("c.csv")]);
    }

    #[test]
    fn test_drain_empty_queue_makes_no_attempts() {
        let mut queue = MirrorQueue::new();
        let mut mirror = MockMirror::new();
        mirror.expect_copy().never();

        let report = queue.drain(&mirror, t(2));
        assert_eq!(report, DrainReport::default());
    }

    #[test]
    fn test_no_max_age_retries_forever() {
        let mut queue = MirrorQueue::new();
        queue.enqueue(task("a.csv"));

        let mirror = ScriptedMirror::failing(&["a.csv"]);
        let much_later = t(1) + Duration::days(365);
        let report = queue.drain(&mirror, much_later);

        assert!(report.evicted.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_max_age_evicts_without_copying() {
        let mut queue = MirrorQueue::with_max_age(Some(Duration::hours(24)));
        queue.enqueue(task("old.csv"));
        queue.enqueue(MirrorTask::new(
            PathBuf::from("new.csv"),
            PathBuf::from("/remote/20241011"),
            t(1) + Duration::hours(20),
        ));

        let mirror = ScriptedMirror::failing(&["new.csv"]);
        let report = queue.drain(&mirror, t(1) + Duration::hours(30));

        assert_eq!(report.evicted, vec![PathBuf::from("old.csv")]);
        assert_eq!(*mirror.attempts.borrow(), vec![PathBuf::from("new.csv")]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_fs_mirror_copies_into_existing_root() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();

        let source = local.path().join("20241010_14.csv");
        fs::write(&source, "epoch_time\n1,2\n").unwrap();

        let dest_dir = remote.path().join("20241010");
        FsMirror.copy(&source, &dest_dir).unwrap();

        let copied = dest_dir.join("20241010_14.csv");
        assert_eq!(fs::read_to_string(&copied).unwrap(), "epoch_time\n1,2\n");
        assert_eq!(
            fs::metadata(&copied).unwrap().modified().unwrap(),
            fs::metadata(&source).unwrap().modified().unwrap()
        );
    }

    #[test]
    fn test_fs_mirror_fails_when_remote_root_missing() {
        let local = TempDir::new().unwrap();
        let source = local.path().join("20241010_14.csv");
        fs::write(&source, "x\n").unwrap();

        let unmounted = local.path().join("not-mounted").join("20241010");
        assert!(FsMirror.copy(&source, &unmounted).is_err());
        assert!(!local.path().join("not-mounted").exists());
    }

    #[test]
    fn test_fs_mirror_missing_source_fails() {
        let remote = TempDir::new().unwrap();
        let result = FsMirror.copy(Path::new("/nonexistent/20241010_14.csv"), remote.path());
        assert!(result.is_err());
    }
}
