//! # Last-Used Settings
//!
//! The serial port and remote root that last passed the startup checks,
//! kept in two small text files so the next run can reuse them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

/// File holding the last confirmed serial port
pub const PORT_FILE: &str = "port.txt";

/// File holding the last confirmed remote root
pub const REMOTE_ROOT_FILE: &str = "remote_root.txt";

/// Values read back from the state folder
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LastUsed {
    pub port: Option<String>,
    pub remote_root: Option<PathBuf>,
}

/// Reads and writes the last-used settings
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Read both files. Missing or empty files yield `None`.
    pub fn load(&self) -> LastUsed {
        LastUsed {
            port: self.read(PORT_FILE),
            remote_root: self.read(REMOTE_ROOT_FILE).map(PathBuf::from),
        }
    }

    /// Remember a serial port that answered.
    pub fn save_port(&self, port: &str) -> Result<()> {
        self.write(PORT_FILE, port)
    }

    /// Remember a remote root that exists.
    pub fn save_remote_root(&self, remote_root: &Path) -> Result<()> {
        self.write(REMOTE_ROOT_FILE, &remote_root.to_string_lossy())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read(&self, name: &str) -> Option<String> {
        let path = self.dir.join(name);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let value = contents.trim();
                (!value.is_empty()).then(|| value.to_string())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No saved value in {}", path.display());
                None
            }
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write(&self, name: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(name), value)?;
        Ok(())
    }
}
