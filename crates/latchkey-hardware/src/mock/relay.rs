//! Mock lock relay.
//!
//! Records every drive so tests can assert on the exact sequence of relay
//! toggles, and can be told to fail or stall drives.

use crate::{HardwareError, Result, traits::Relay, types::DeviceInfo};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_RELAY_PIN: u8 = 17;

#[derive(Debug, Default)]
struct RelayState {
    energized: bool,
    drives: Vec<bool>,
    failures_remaining: usize,
    failing: bool,
    delay: Option<Duration>,
}

/// Mock relay for testing and development.
///
/// # Examples
///
/// ```
/// use latchkey_hardware::mock::MockRelay;
/// use latchkey_hardware::traits::Relay;
///
/// #[tokio::main]
/// async fn main() -> latchkey_hardware::Result<()> {
///     let (mut relay, handle) = MockRelay::new();
///
///     relay.set_energized(true).await?;
///     relay.set_energized(false).await?;
///
///     assert_eq!(handle.drives(), vec![true, false]);
///     assert!(!handle.is_energized());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockRelay {
    state: Arc<Mutex<RelayState>>,
    pin: u8,
}

impl MockRelay {
    /// Create a mock relay on the default pin.
    pub fn new() -> (Self, MockRelayHandle) {
        Self::on_pin(DEFAULT_RELAY_PIN)
    }

    /// Create a mock relay labelled with `pin`.
    pub fn on_pin(pin: u8) -> (Self, MockRelayHandle) {
        let state = Arc::new(Mutex::new(RelayState::default()));
        let handle = MockRelayHandle {
            state: Arc::clone(&state),
        };
        (Self { state, pin }, handle)
    }
}

impl Relay for MockRelay {
    async fn set_energized(&mut self, energized: bool) -> Result<()> {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.failing || state.failures_remaining > 0 {
            state.failures_remaining = state.failures_remaining.saturating_sub(1);
            return Err(HardwareError::relay_drive(format!(
                "GPIO{} write failed",
                self.pin
            )));
        }
        state.energized = energized;
        state.drives.push(energized);
        Ok(())
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new("Mock Relay", format!("GPIO{}", self.pin)))
    }
}

/// Handle for observing and controlling a mock relay.
#[derive(Debug, Clone)]
pub struct MockRelayHandle {
    state: Arc<Mutex<RelayState>>,
}

impl MockRelayHandle {
    /// Every successful drive, oldest first.
    pub fn drives(&self) -> Vec<bool> {
        self.state.lock().drives.clone()
    }

    /// Number of successful drives.
    pub fn drive_count(&self) -> usize {
        self.state.lock().drives.len()
    }

    /// Current physical output.
    pub fn is_energized(&self) -> bool {
        self.state.lock().energized
    }

    /// Fail the next `count` drives.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().failures_remaining = count;
    }

    /// Fail every drive until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Make every drive take `delay` before it lands. `None` restores
    /// instant drives.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    /// Forget recorded drives, keeping the current output.
    pub fn clear_history(&self) {
        self.state.lock().drives.clear();
    }
}
