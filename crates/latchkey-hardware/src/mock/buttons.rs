//! Mock two-button panel.

use crate::{
    HardwareError, Result,
    traits::ButtonPanel,
    types::{Button, DeviceInfo},
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct PanelState {
    unlock_pressed: bool,
    lock_pressed: bool,
    failing: bool,
    reads: usize,
}

impl PanelState {
    fn pressed_mut(&mut self, button: Button) -> &mut bool {
        match button {
            Button::Unlock => &mut self.unlock_pressed,
            Button::Lock => &mut self.lock_pressed,
        }
    }
}

/// Mock button panel. Buttons stay pressed until released through the handle.
///
/// # Examples
///
/// ```
/// use latchkey_hardware::mock::MockButtonPanel;
/// use latchkey_hardware::traits::ButtonPanel;
/// use latchkey_hardware::types::Button;
///
/// #[tokio::main]
/// async fn main() -> latchkey_hardware::Result<()> {
///     let (mut panel, handle) = MockButtonPanel::new();
///
///     handle.press(Button::Unlock);
///     assert!(panel.is_pressed(Button::Unlock).await?);
///     assert!(!panel.is_pressed(Button::Lock).await?);
///
///     handle.release(Button::Unlock);
///     assert!(!panel.is_pressed(Button::Unlock).await?);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockButtonPanel {
    state: Arc<Mutex<PanelState>>,
}

impl MockButtonPanel {
    pub fn new() -> (Self, MockButtonPanelHandle) {
        let state = Arc::new(Mutex::new(PanelState::default()));
        let handle = MockButtonPanelHandle {
            state: Arc::clone(&state),
        };
        (Self { state }, handle)
    }
}

impl ButtonPanel for MockButtonPanel {
    async fn is_pressed(&mut self, button: Button) -> Result<bool> {
        let mut state = self.state.lock();
        state.reads += 1;
        if state.failing {
            return Err(HardwareError::button_read(format!(
                "{button} input unreadable"
            )));
        }
        Ok(*state.pressed_mut(button))
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new("Mock Button Panel", "GPIO27/GPIO22"))
    }
}

/// Handle for pressing and releasing mock buttons.
#[derive(Debug, Clone)]
pub struct MockButtonPanelHandle {
    state: Arc<Mutex<PanelState>>,
}

impl MockButtonPanelHandle {
    pub fn press(&self, button: Button) {
        *self.state.lock().pressed_mut(button) = true;
    }

    pub fn release(&self, button: Button) {
        *self.state.lock().pressed_mut(button) = false;
    }

    /// Make every read fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Number of samples taken by the panel so far.
    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }
}
