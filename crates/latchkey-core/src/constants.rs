//! Default operating parameters for the door controller.
//!
//! These values reproduce the behavior of the deployed controller and are used
//! as the defaults for [`Config`](crate::config::Config). Every one of them can be
//! overridden from the configuration file or the environment.
//!
//! # Timing
//!
//! | Constant | Value | Purpose |
//! |----------|-------|---------|
//! | `DEFAULT_BADGE_UNLOCK_SECS` | 5 | Dwell time after a granted badge scan |
//! | `DEFAULT_MANUAL_UNLOCK_SECS` | 3600 | Dwell time after the unlock button |
//! | `DEFAULT_DEBOUNCE_MS` | 500 | Minimum time between two accepted button presses |
//! | `DEFAULT_WATCHDOG_INTERVAL_SECS` | 10 | Heartbeat period |
//! | `DEFAULT_BADGE_REFRESH_SECS` | 86400 | Remote authorization refresh period |

// Door timing
pub const DEFAULT_BADGE_UNLOCK_SECS: u64 = 5;
pub const DEFAULT_MANUAL_UNLOCK_SECS: u64 = 3600;
/// Longest a single relay drive may take before it counts as failed.
pub const RELAY_DRIVE_TIMEOUT_MS: u64 = 2000;

// Button handling
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_BUTTON_POLL_MS: u64 = 100;
/// Delay before the second read that confirms an unlock button press.
pub const BUTTON_CONFIRM_MS: u64 = 50;

// Badge reader
pub const DEFAULT_READER_POLL_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_SCAN_COOLDOWN_MS: u64 = 1000;
pub const DEFAULT_READER_ERROR_BACKOFF_MS: u64 = 1000;

// Authorization refresh
pub const DEFAULT_BADGE_REFRESH_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_MANUAL_REFRESH_COOLDOWN_SECS: u64 = 300;
pub const DEFAULT_MIN_REMOTE_BADGES: usize = 1;

// Remote calls
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_AGGREGATE_TIMEOUT_SECS: u64 = 5;

// Watchdog
pub const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 10;

// Local access log
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_RECENT_EVENTS: usize = 50;

// GPIO wiring (BCM numbering)
pub const DEFAULT_RELAY_PIN: u8 = 17;
pub const DEFAULT_UNLOCK_BUTTON_PIN: u8 = 27;
pub const DEFAULT_LOCK_BUTTON_PIN: u8 = 22;

// Identifier limits
pub const MIN_UID_LENGTH: usize = 1;
pub const MAX_UID_LENGTH: usize = 64;

/// Remote log timestamp layout.
pub const REMOTE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Subject used for events raised by the badge reader itself.
pub const READER_SUBJECT: &str = "reader";
/// Subject used for events raised by the button panel itself.
pub const BUTTONS_SUBJECT: &str = "buttons";
/// Subject used for events raised by the door relay.
pub const RELAY_SUBJECT: &str = "relay";
