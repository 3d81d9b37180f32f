//! Local durable access log.
//!
//! One JSON object per line, one file per calendar day named
//! `<stem>-YYYY-MM-DD.jsonl`. Files older than the retention window are
//! removed whenever the log rolls over to a new day. The log never rolls
//! back: an event stamped before the current day lands in the current file.
//!
//! A day file left with a torn last line by a crash is terminated before the
//! first new append, so the torn line never swallows a good record.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use latchkey_core::AccessEvent;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

const EXTENSION: &str = "jsonl";

/// Where an append landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub path: PathBuf,
    /// File size after the append, in bytes.
    pub size: u64,
}

/// Daily-rotating append-only event log.
///
/// Not internally synchronized: callers serialize access (the access logger
/// holds it behind a mutex).
///
/// # Examples
///
/// ```no_run
/// use chrono::Local;
/// use latchkey_core::AccessEvent;
/// use latchkey_storage::LocalAccessLog;
///
/// # fn example() -> latchkey_storage::StorageResult<()> {
/// let mut log = LocalAccessLog::new("logs", "door_controller_action", 7);
/// let receipt = log.append(&AccessEvent::manual_lock(Local::now()))?;
/// println!("wrote {} ({} bytes)", receipt.path.display(), receipt.size);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LocalAccessLog {
    dir: PathBuf,
    stem: String,
    retention_days: u32,
    current: Option<OpenDay>,
}

#[derive(Debug)]
struct OpenDay {
    date: NaiveDate,
    path: PathBuf,
    file: File,
}

impl LocalAccessLog {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>, retention_days: u32) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            retention_days,
            current: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds events for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{}-{}.{EXTENSION}",
            self.stem,
            date.format("%Y-%m-%d")
        ))
    }

    /// File currently open for appends, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|day| day.path.as_path())
    }

    /// Append one event and flush it to disk.
    ///
    /// The day file is chosen from the event's own timestamp, unless the log
    /// has already moved on to a later day.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created or written.
    /// The event must then be considered not persisted.
    pub fn append(&mut self, event: &AccessEvent) -> StorageResult<AppendReceipt> {
        let date = match &self.current {
            Some(day) if day.date > event.timestamp.date_naive() => day.date,
            _ => event.timestamp.date_naive(),
        };
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let day = self.open_day(date)?;
        day.file
            .write_all(&line)
            .and_then(|_| day.file.sync_data())
            .map_err(|e| StorageError::io(&day.path, e))?;

        let size = day
            .file
            .metadata()
            .map_err(|e| StorageError::io(&day.path, e))?
            .len();

        Ok(AppendReceipt {
            path: day.path.clone(),
            size,
        })
    }

    fn open_day(&mut self, date: NaiveDate) -> StorageResult<&mut OpenDay> {
        let needs_open = self.current.as_ref().is_none_or(|day| day.date != date);

        if needs_open {
            std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;

            let path = self.path_for(date);
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&path)
                .map_err(|e| StorageError::io(&path, e))?;
            terminate_torn_line(&mut file).map_err(|e| StorageError::io(&path, e))?;

            info!(path = %path.display(), "Opened access log");
            self.current = Some(OpenDay { date, path, file });

            if let Err(e) = self.cleanup(date) {
                warn!(error = %e, "Access log retention cleanup failed");
            }
        }

        self.current
            .as_mut()
            .ok_or_else(|| StorageError::Configuration("access log not open".to_string()))
    }

    /// Delete day files older than the retention window relative to `today`.
    ///
    /// Returns the number of files removed. Files that do not follow the
    /// naming scheme are left alone.
    pub fn cleanup(&self, today: NaiveDate) -> StorageResult<usize> {
        let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(self.retention_days)))
        else {
            return Ok(0);
        };

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(&self.dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(date) = name.to_str().and_then(|n| self.parse_file_date(n)) else {
                continue;
            };
            if date < cutoff {
                let path = entry.path();
                std::fs::remove_file(&path).map_err(|e| StorageError::io(&path, e))?;
                debug!(path = %path.display(), "Removed expired access log");
                removed += 1;
            }
        }

        Ok(removed)
    }

    fn parse_file_date(&self, file_name: &str) -> Option<NaiveDate> {
        let rest = file_name.strip_prefix(&self.stem)?.strip_prefix('-')?;
        let date = rest.strip_suffix(&format!(".{EXTENSION}"))?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }

    /// Read back every event recorded for `date`.
    ///
    /// Lines that fail to decode are skipped with a warning; a partially
    /// written last line after a power loss must not hide the rest of the day.
    pub fn read_day(&self, date: NaiveDate) -> StorageResult<Vec<AccessEvent>> {
        read_log_file(&self.path_for(date))
    }
}

/// End a non-empty file with a newline if its last line was cut short.
fn terminate_torn_line(file: &mut File) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!("Access log ends with a torn line; terminating it");
        file.write_all(b"\n")?;
        file.sync_data()?;
    }
    Ok(())
}

/// Decode a JSON-lines access log file.
///
/// A missing file yields an empty list.
pub fn read_log_file(path: &Path) -> StorageResult<Vec<AccessEvent>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(path, e)),
    };

    let mut events = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| StorageError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AccessEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "Skipping undecodable access log line"
            ),
        }
    }
    Ok(events)
}
