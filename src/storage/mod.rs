//! # Storage Module
//!
//! Local data files and their mirror on the remote share.
//!
//! This module handles:
//! - Naming hourly (or daily) files and day folders from the wall clock
//! - Opening, appending and rotating the active file
//! - Mirroring completed files, with a retry queue for failed copies
//! - Pruning old local day folders

pub mod bucket;
pub mod mirror;
pub mod retention;
pub mod scheduler;
pub mod writer;

use std::fs;
use std::io;
use std::path::Path;

pub use bucket::{Granularity, TimeBucket};
pub use mirror::{FsMirror, Mirror, MirrorQueue, MirrorTask};
pub use scheduler::{RotationScheduler, TickOutcome};
pub use writer::CsvWriter;

/// Create a single directory level, treating an existing one as success
///
/// Parents are never created: on a network share a missing parent means
/// the share is not mounted.
///
/// # Returns
///
/// * `io::Result<bool>` - `true` if the directory was created by this call
pub fn ensure_dir(path: &Path) -> io::Result<bool> {
    match fs::create_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let root = TempDir::new().unwrap();
        let day = root.path().join("20241010");

        assert!(ensure_dir(&day).unwrap());
        assert!(!ensure_dir(&day).unwrap());
        assert!(day.is_dir());
    }

    #[test]
    fn test_ensure_dir_does_not_create_parents() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("share").join("20241010");

        assert!(ensure_dir(&nested).is_err());
        assert!(!root.path().join("share").exists());
    }

    #[test]
    fn test_ensure_dir_rejects_existing_file() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("20241010");
        fs::write(&path, "").unwrap();

        assert!(ensure_dir(&path).is_err());
    }
}
