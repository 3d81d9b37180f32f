//! Read-only status surface.
//!
//! A [`StatusSnapshot`] is an owned copy assembled on demand from each
//! subsystem's own status. Building one never waits on a door transition or
//! a network call.

use std::sync::Arc;

use chrono::{DateTime, Local};
use latchkey_core::{DoorState, FaultKind, FaultRecord, SharedClock, VERSION};
use parking_lot::Mutex;
use serde::Serialize;

use crate::authorization::{AuthorizationCache, AuthorizationStatus};
use crate::door::DoorController;
use crate::logger::{AccessLogStatus, AccessLogger};
use crate::watchdog::{HeartbeatStatus, Watchdog};

/// Last success and last error of a polled device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub last_success_at: Option<DateTime<Local>>,
    pub last_error: Option<FaultRecord>,
    pub consecutive_errors: u32,
}

/// Shared tracker a polling loop updates and the reporter reads.
#[derive(Debug, Clone, Default)]
pub struct DeviceHealth {
    inner: Arc<Mutex<DeviceStatus>>,
}

impl DeviceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, at: DateTime<Local>) {
        let mut status = self.inner.lock();
        status.last_success_at = Some(at);
        status.consecutive_errors = 0;
    }

    /// Record a failed read. Returns the length of the current error streak.
    pub fn record_error(&self, at: DateTime<Local>, message: impl Into<String>) -> u32 {
        let mut status = self.inner.lock();
        status.last_error = Some(FaultRecord::new(at, FaultKind::Hardware, message));
        status.consecutive_errors = status.consecutive_errors.saturating_add(1);
        status.consecutive_errors
    }

    pub fn status(&self) -> DeviceStatus {
        self.inner.lock().clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoorStatus {
    #[serde(flatten)]
    pub state: DoorState,
    pub seconds_until_relock: Option<i64>,
}

/// Point-in-time view of the whole controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub taken_at: DateTime<Local>,
    pub started_at: DateTime<Local>,
    pub uptime_secs: i64,
    pub version: String,
    pub door: DoorStatus,
    pub authorization: AuthorizationStatus,
    pub access_log: AccessLogStatus,
    pub reader: DeviceStatus,
    pub buttons: DeviceStatus,
    pub heartbeat: HeartbeatStatus,
}

/// Assembles [`StatusSnapshot`]s. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    door: DoorController,
    cache: AuthorizationCache,
    logger: AccessLogger,
    watchdog: Watchdog,
    reader: DeviceHealth,
    buttons: DeviceHealth,
    clock: SharedClock,
    started_at: DateTime<Local>,
}

impl StatusReporter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        door: DoorController,
        cache: AuthorizationCache,
        logger: AccessLogger,
        watchdog: Watchdog,
        reader: DeviceHealth,
        buttons: DeviceHealth,
        clock: SharedClock,
    ) -> Self {
        let started_at = clock.now();
        Self {
            door,
            cache,
            logger,
            watchdog,
            reader,
            buttons,
            clock,
            started_at,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let now = self.clock.now();
        let state = self.door.current_state();
        StatusSnapshot {
            taken_at: now,
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds().max(0),
            version: VERSION.to_string(),
            door: DoorStatus {
                seconds_until_relock: state.seconds_until_relock(now),
                state,
            },
            authorization: self.cache.status(),
            access_log: self.logger.status(),
            reader: self.reader.status(),
            buttons: self.buttons.status(),
            heartbeat: self.watchdog.status(),
        }
    }
}
