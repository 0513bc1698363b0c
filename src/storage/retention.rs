//! Pruning of old local day folders.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use super::bucket::DAY_FORMAT;

/// Delete day folders under `local_root` older than `keep_days`
///
/// Only folders named like `20241010` are considered; anything else is
/// left alone. The remote share is never touched.
///
/// # Returns
///
/// * `io::Result<Vec<PathBuf>>` - Deleted folders, oldest first
pub fn prune(local_root: &Path, today: NaiveDate, keep_days: u32) -> io::Result<Vec<PathBuf>> {
    let cutoff = today - Duration::days(i64::from(keep_days));

    let mut days: Vec<(NaiveDate, PathBuf)> = Vec::new();
    for entry in fs::read_dir(local_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(date) = name
            .to_str()
            .and_then(|n| NaiveDate::parse_from_str(n, DAY_FORMAT).ok())
        else {
            debug!("Skipping non-day folder {:?}", name);
            continue;
        };
        days.push((date, entry.path()));
    }
    days.sort();

    let mut deleted = Vec::new();
    for (date, path) in days {
        if date >= cutoff {
            break;
        }
        fs::remove_dir_all(&path)?;
        info!("Deleted old data folder {}", path.display());
        deleted.push(path);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: &str) -> NaiveDate {
        NaiveDate::parse_from_str(d, DAY_FORMAT).unwrap()
    }

    #[test]
    fn test_prune_old_day_folders() {
        let root = TempDir::new().unwrap();
        for name in ["20240601", "20240905", "20241001", "20241010"] {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        fs::write(root.path().join("20240601/20240601_00.csv"), "x\n").unwrap();

        let deleted = prune(root.path(), day("20241010"), 30).unwrap();

        assert_eq!(
            deleted,
            vec![root.path().join("20240601"), root.path().join("20240905")]
        );
        assert!(root.path().join("20241001").is_dir());
        assert!(root.path().join("20241010").is_dir());
    }

    #[test]
    fn test_prune_skips_other_entries() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("archive")).unwrap();
        fs::write(root.path().join("tempwind.csv"), "").unwrap();
        fs::write(root.path().join("20200101"), "a file, not a folder").unwrap();

        let deleted = prune(root.path(), day("20241010"), 1).unwrap();

        assert!(deleted.is_empty());
        assert!(root.path().join("archive").is_dir());
        assert!(root.path().join("20200101").is_file());
    }

    #[test]
    fn test_prune_keeps_boundary_day() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("20241009")).unwrap();

        let deleted = prune(root.path(), day("20241010"), 1).unwrap();
        assert!(deleted.is_empty());
    }
}
