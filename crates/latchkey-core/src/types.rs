use crate::{
    Result,
    constants::{MAX_UID_LENGTH, MIN_UID_LENGTH, REMOTE_TIMESTAMP_FORMAT},
    error::Error,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Badge identifier as read from a tag (normalized lower-case hex or opaque text).
///
/// # Security
/// This type implements constant-time comparison to prevent timing attacks
/// when comparing badge identifiers during authorization.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BadgeUid(String);

impl BadgeUid {
    /// Create a new badge UID with validation.
    ///
    /// The identifier is normalized (trimmed and converted to lowercase) before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidBadgeUid` if:
    /// - The identifier is empty or longer than 64 characters after trimming
    /// - The identifier contains non-ASCII or whitespace characters
    pub fn new(uid: &str) -> Result<Self> {
        let uid = uid.trim().to_ascii_lowercase();

        let len = uid.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&len) {
            return Err(Error::InvalidBadgeUid(format!(
                "UID must be {MIN_UID_LENGTH}-{MAX_UID_LENGTH} chars, got {len}"
            )));
        }

        if !uid.is_ascii() || uid.chars().any(|c| c.is_ascii_whitespace() || c.is_control()) {
            return Err(Error::InvalidBadgeUid(
                "UID must be printable ASCII without whitespace".to_string(),
            ));
        }

        Ok(BadgeUid(uid))
    }

    /// Build a UID from the raw bytes returned by a tag reader.
    ///
    /// Bytes are rendered as lower-case hex without separators, e.g.
    /// `[0x04, 0xA1, 0xB2, 0xC3]` becomes `04a1b2c3`.
    ///
    /// # Errors
    /// Returns `Error::InvalidBadgeUid` if `bytes` is empty or too long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        BadgeUid::new(&hex)
    }

    /// Get the UID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BadgeUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BadgeUid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BadgeUid::new(s)
    }
}

impl TryFrom<String> for BadgeUid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        BadgeUid::new(&value)
    }
}

impl From<BadgeUid> for String {
    fn from(uid: BadgeUid) -> Self {
        uid.0
    }
}

/// Constant-time comparison implementation for BadgeUid
impl PartialEq for BadgeUid {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for BadgeUid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Physical lock position as commanded to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    Locked,
    Unlocked,
}

impl LockState {
    /// Relay level for this state (energized releases the strike).
    #[must_use]
    pub fn relay_energized(&self) -> bool {
        matches!(self, LockState::Unlocked)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LockState::Locked => write!(f, "LOCKED"),
            LockState::Unlocked => write!(f, "UNLOCKED"),
        }
    }
}

/// Reason the door is in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DoorCause {
    Badge,
    ManualUnlock,
    ManualLock,
    AutoRelock,
    Startup,
}

impl fmt::Display for DoorCause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            DoorCause::Badge => "BADGE",
            DoorCause::ManualUnlock => "MANUAL_UNLOCK",
            DoorCause::ManualLock => "MANUAL_LOCK",
            DoorCause::AutoRelock => "AUTO_RELOCK",
            DoorCause::Startup => "STARTUP",
        };
        write!(f, "{s}")
    }
}

/// Logical door state owned by the door controller.
///
/// `auto_relock_at` is only set while unlocked with an armed relock timer.
/// `relay_in_sync` turns false when the last relay drive failed, meaning the
/// physical output may not match `lock_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorState {
    pub lock_state: LockState,
    pub cause: DoorCause,
    pub unlocked_at: Option<DateTime<Local>>,
    pub auto_relock_at: Option<DateTime<Local>>,
    pub relay_in_sync: bool,
}

impl DoorState {
    /// Initial state at process start.
    pub fn startup() -> Self {
        Self {
            lock_state: LockState::Locked,
            cause: DoorCause::Startup,
            unlocked_at: None,
            auto_relock_at: None,
            relay_in_sync: true,
        }
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.lock_state == LockState::Unlocked
    }

    /// Whole seconds until the armed relock, if any, measured from `now`.
    #[must_use]
    pub fn seconds_until_relock(&self, now: DateTime<Local>) -> Option<i64> {
        self.auto_relock_at
            .map(|at| (at - now).num_seconds().max(0))
    }
}

/// Kind of access event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    BadgeScan,
    ManualUnlock,
    ManualLock,
    SystemError,
}

impl EventType {
    /// Stable label used in the aggregate store.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BadgeScan => "BADGE_SCAN",
            EventType::ManualUnlock => "MANUAL_UNLOCK",
            EventType::ManualLock => "MANUAL_LOCK",
            EventType::SystemError => "SYSTEM_ERROR",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BADGE_SCAN" => Ok(EventType::BadgeScan),
            "MANUAL_UNLOCK" => Ok(EventType::ManualUnlock),
            "MANUAL_LOCK" => Ok(EventType::ManualLock),
            "SYSTEM_ERROR" => Ok(EventType::SystemError),
            other => Err(Error::Config(format!("Unknown event type: {other}"))),
        }
    }
}

/// Outcome recorded with an access event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Granted,
    Denied,
    Success,
    Failure,
}

impl EventStatus {
    /// Human label used in remote log rows and raw messages.
    pub fn label(&self) -> &'static str {
        match self {
            EventStatus::Granted => "Granted",
            EventStatus::Denied => "Denied",
            EventStatus::Success => "Success",
            EventStatus::Failure => "Failure",
        }
    }

    /// Stable label used in the aggregate store.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Granted => "GRANTED",
            EventStatus::Denied => "DENIED",
            EventStatus::Success => "SUCCESS",
            EventStatus::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GRANTED" => Ok(EventStatus::Granted),
            "DENIED" => Ok(EventStatus::Denied),
            "SUCCESS" => Ok(EventStatus::Success),
            "FAILURE" => Ok(EventStatus::Failure),
            other => Err(Error::Config(format!("Unknown event status: {other}"))),
        }
    }
}

/// Immutable audit record for one door-related occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub timestamp: DateTime<Local>,
    pub event_type: EventType,
    pub subject_id: String,
    pub status: EventStatus,
    pub raw_message: String,
}

impl AccessEvent {
    /// Badge scan outcome.
    pub fn badge_scan(timestamp: DateTime<Local>, uid: &BadgeUid, granted: bool) -> Self {
        let status = if granted {
            EventStatus::Granted
        } else {
            EventStatus::Denied
        };
        Self {
            timestamp,
            event_type: EventType::BadgeScan,
            subject_id: uid.to_string(),
            raw_message: format!("Badge Scan - Badge: {uid} - Status: {}", status.label()),
            status,
        }
    }

    /// Unlock button accepted; `label` describes the dwell, e.g. `Manual Unlock (1 hour)`.
    pub fn manual_unlock(timestamp: DateTime<Local>, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            timestamp,
            event_type: EventType::ManualUnlock,
            raw_message: format!("{label} - Status: Success"),
            subject_id: label,
            status: EventStatus::Success,
        }
    }

    /// Lock button accepted.
    pub fn manual_lock(timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            event_type: EventType::ManualLock,
            subject_id: "Manual Lock".to_string(),
            status: EventStatus::Success,
            raw_message: "Manual Lock - Status: Success".to_string(),
        }
    }

    /// Hardware or internal failure worth auditing.
    pub fn system_error(
        timestamp: DateTime<Local>,
        subject: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        let subject = subject.into();
        Self {
            timestamp,
            event_type: EventType::SystemError,
            raw_message: format!("System Error - {subject}: {message}"),
            subject_id: subject,
            status: EventStatus::Failure,
        }
    }

    /// Timestamp in the layout used by the remote log.
    pub fn remote_timestamp(&self) -> String {
        self.timestamp.format(REMOTE_TIMESTAMP_FORMAT).to_string()
    }
}

/// Failure taxonomy used across the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Reader, relay or button failure. Absorbed; polling continues.
    Hardware,
    /// Remote store slow or unreachable. Absorbed; fallback data is used.
    RemoteUnavailable,
    /// Local durable log or fallback file unwritable. Fatal.
    LocalStorage,
    /// Invalid configuration. Rejected at load time.
    Configuration,
}

impl FaultKind {
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, FaultKind::LocalStorage | FaultKind::Configuration)
    }
}

/// Most recent error seen by a subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub at: DateTime<Local>,
    pub kind: FaultKind,
    pub message: String,
}

impl FaultRecord {
    pub fn new(at: DateTime<Local>, kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            at,
            kind,
            message: message.into(),
        }
    }
}
