//! Last-known-good copy of the authorized badge list.
//!
//! Plain text, one identifier per line. Blank lines and lines starting with
//! `#` are ignored. Writes go to a sibling temporary file that is renamed over
//! the real one, so a crash mid-write never leaves a truncated list.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Contents of the fallback file plus its modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackSnapshot {
    pub entries: Vec<String>,
    pub modified_at: DateTime<Local>,
}

/// Handle on the fallback file location.
#[derive(Debug, Clone)]
pub struct FallbackFile {
    path: PathBuf,
}

impl FallbackFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(&self) -> StorageResult<Option<FallbackSnapshot>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        let modified_at = std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map(DateTime::<Local>::from)
            .map_err(|e| StorageError::io(&self.path, e))?;

        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        Ok(Some(FallbackSnapshot {
            entries,
            modified_at,
        }))
    }

    /// Modification time of the file, if it exists.
    pub fn modified_at(&self) -> StorageResult<Option<DateTime<Local>>> {
        match std::fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(time) => Ok(Some(DateTime::<Local>::from(time))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }

    /// Atomically replace the file with `entries`.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be written or renamed.
    /// The previous contents are left intact in that case.
    pub fn store<I, S>(&self, entries: I) -> StorageResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let tmp = self.tmp_path();
        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            for entry in entries {
                writeln!(file, "{}", entry.as_ref())?;
            }
            file.sync_all()
        };
        write().map_err(|e| StorageError::io(&tmp, e))?;

        std::fs::rename(&tmp, &self.path).map_err(|e| StorageError::io(&self.path, e))?;
        debug!(path = %self.path.display(), "Fallback badge list written");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
