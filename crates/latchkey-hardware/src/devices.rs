//! Enum wrappers for hardware device dispatch.
//!
//! Native `async fn` in traits (RPITIT - Rust Edition 2024) are not object-safe,
//! so we cannot use `Box<dyn Relay>`. These enums provide concrete type dispatch
//! instead, which also keeps the returned futures `Send` so the runtime can
//! drive devices from spawned tasks.
//!
//! # Examples
//!
//! ```
//! use latchkey_hardware::devices::AnyRelay;
//! use latchkey_hardware::mock::MockRelay;
//!
//! let (relay, _handle) = MockRelay::new();
//! let any_relay = AnyRelay::Mock(relay);
//!
//! // Can now be used polymorphically through the Relay trait
//! ```

use std::time::Duration;

use crate::mock::{MockButtonPanel, MockRelay, MockTagReader};
use crate::traits::{ButtonPanel, Relay, TagReader};
use crate::types::{Button, DeviceInfo, TagData};
use crate::Result;

/// Enum wrapper for tag reader dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTagReader {
    /// Mock reader for development and testing.
    Mock(MockTagReader),
    // TODO: add a Pn532 variant behind `hardware-pn532` once the SPI driver lands
}

impl TagReader for AnyTagReader {
    async fn poll_for_tag(&mut self, timeout: Duration) -> Result<Option<TagData>> {
        match self {
            Self::Mock(device) => device.poll_for_tag(timeout).await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
        }
    }
}

impl From<MockTagReader> for AnyTagReader {
    fn from(device: MockTagReader) -> Self {
        Self::Mock(device)
    }
}

/// Enum wrapper for relay dispatch.
///
/// # Examples
///
/// ```
/// use latchkey_hardware::devices::AnyRelay;
/// use latchkey_hardware::traits::Relay;
/// use latchkey_hardware::mock::MockRelay;
///
/// #[tokio::main]
/// async fn main() -> latchkey_hardware::Result<()> {
///     let (relay, handle) = MockRelay::new();
///     let mut relay = AnyRelay::Mock(relay);
///
///     relay.set_energized(true).await?;
///     assert!(handle.is_energized());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyRelay {
    /// Mock relay for development and testing.
    Mock(MockRelay),
}

impl Relay for AnyRelay {
    async fn set_energized(&mut self, energized: bool) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_energized(energized).await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
        }
    }
}

impl From<MockRelay> for AnyRelay {
    fn from(device: MockRelay) -> Self {
        Self::Mock(device)
    }
}

/// Enum wrapper for button panel dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyButtonPanel {
    /// Mock panel for development and testing.
    Mock(MockButtonPanel),
}

impl ButtonPanel for AnyButtonPanel {
    async fn is_pressed(&mut self, button: Button) -> Result<bool> {
        match self {
            Self::Mock(device) => device.is_pressed(button).await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
        }
    }
}

impl From<MockButtonPanel> for AnyButtonPanel {
    fn from(device: MockButtonPanel) -> Self {
        Self::Mock(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_any_reader_dispatch() {
        let (reader, handle) = MockTagReader::new();
        let mut reader = AnyTagReader::from(reader);

        handle.present_tag(vec![0xAA, 0xBB, 0xCC, 0xDD]).await.unwrap();
        let tag = reader
            .poll_for_tag(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tag.uid_hex(), "aabbccdd");
        assert_eq!(reader.get_info().await.unwrap().name, "Mock PN532");
    }

    #[tokio::test]
    async fn test_any_relay_dispatch() {
        let (relay, handle) = MockRelay::new();
        let mut relay = AnyRelay::from(relay);

        relay.set_energized(true).await.unwrap();
        relay.set_energized(false).await.unwrap();
        assert_eq!(handle.drives(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_any_button_panel_dispatch() {
        let (panel, handle) = MockButtonPanel::new();
        let mut panel = AnyButtonPanel::from(panel);

        handle.press(Button::Unlock);
        assert!(panel.is_pressed(Button::Unlock).await.unwrap());
    }

    #[test]
    fn test_any_relay_future_is_send() {
        fn assert_send<T: Send>(_: T) {}
        let (relay, _handle) = MockRelay::new();
        let mut relay = AnyRelay::from(relay);
        assert_send(relay.set_energized(true));
    }
}
