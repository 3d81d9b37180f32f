//! Wall-clock source.
//!
//! Timers and timeouts run on the tokio clock (monotonic, pausable in tests).
//! The [`Clock`] trait only supplies the wall-clock timestamps that end up in
//! door state, access events and file names, so tests can pin them.

use chrono::{DateTime, Duration, Local};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;

/// Source of wall-clock timestamps.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Local>;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to.
///
/// Cloning shares the underlying instant, so a test can keep one clone and
/// hand the other to the component under test.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Local, TimeZone};
/// use latchkey_core::clock::{Clock, ManualClock};
///
/// let start = Local.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
/// let clock = ManualClock::new(start);
/// clock.advance(Duration::seconds(5));
/// assert_eq!(clock.now(), start + Duration::seconds(5));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock()
    }
}

/// Shared clock handle used by the runtime components.
pub type SharedClock = Arc<dyn Clock>;
