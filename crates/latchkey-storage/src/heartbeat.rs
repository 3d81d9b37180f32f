//! Liveness heartbeat file.
//!
//! A single line holding the RFC 3339 time of the last beat. External
//! supervision reads the file and restarts the service when it goes stale.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct HeartbeatFile {
    path: PathBuf,
}

impl HeartbeatFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `at`.
    ///
    /// The new contents are written to a temporary file and renamed into
    /// place, so readers never observe a partial timestamp.
    pub fn write(&self, at: DateTime<Local>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, format!("{}\n", at.to_rfc3339()))
            .map_err(|e| StorageError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StorageError::io(&self.path, e))
    }

    /// Time of the last persisted beat, if any.
    pub fn read(&self) -> StorageResult<Option<DateTime<Local>>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        DateTime::parse_from_rfc3339(text.trim())
            .map(|at| Some(at.with_timezone(&Local)))
            .map_err(|e| StorageError::InvalidData(format!("heartbeat timestamp: {e}")))
    }
}
