//! Liveness heartbeat.
//!
//! The watchdog touches nothing but its own file, so a wedged door or logger
//! still shows up as a stale heartbeat to external supervision.

use std::sync::Arc;

use chrono::{DateTime, Local};
use latchkey_core::{FaultKind, FaultRecord, SharedClock};
use latchkey_storage::{HeartbeatFile, StorageError};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{trace, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeartbeatStatus {
    pub last_beat_at: Option<DateTime<Local>>,
    pub last_error: Option<FaultRecord>,
    pub beats: u64,
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    inner: Arc<WatchdogInner>,
}

#[derive(Debug)]
struct WatchdogInner {
    file: HeartbeatFile,
    clock: SharedClock,
    status: Mutex<HeartbeatStatus>,
}

impl Watchdog {
    pub fn new(file: HeartbeatFile, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(WatchdogInner {
                file,
                clock,
                status: Mutex::new(HeartbeatStatus::default()),
            }),
        }
    }

    /// Write one heartbeat.
    ///
    /// # Errors
    ///
    /// Returns the write error after recording it in the status. Callers are
    /// expected to keep ticking.
    pub fn tick(&self) -> Result<DateTime<Local>, StorageError> {
        let now = self.inner.clock.now();
        match self.inner.file.write(now) {
            Ok(()) => {
                let mut status = self.inner.status.lock();
                status.last_beat_at = Some(now);
                status.beats += 1;
                trace!(at = %now, "Heartbeat written");
                Ok(now)
            }
            Err(e) => {
                warn!(
                    path = %self.inner.file.path().display(),
                    error = %e,
                    "Heartbeat write failed"
                );
                self.inner.status.lock().last_error =
                    Some(FaultRecord::new(now, FaultKind::LocalStorage, e.to_string()));
                Err(e)
            }
        }
    }

    pub fn status(&self) -> HeartbeatStatus {
        self.inner.status.lock().clone()
    }
}
