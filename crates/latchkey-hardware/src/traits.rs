//! Hardware device trait definitions.
//!
//! These traits are the contract between the door runtime and its peripherals:
//! a tag reader that may time out or fail, a relay that drives the strike, and
//! a two-button panel. They let the runtime run unchanged against mocks and
//! real drivers.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use crate::error::Result;
use crate::types::{Button, DeviceInfo, TagData};

/// Tag (RFID/NFC) reader abstraction.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generic parameters, or the enum wrapper from the
/// [`devices`](crate::devices) module when a concrete type is needed:
///
/// ```no_run
/// use latchkey_hardware::devices::AnyTagReader;
/// use latchkey_hardware::traits::TagReader;
/// use latchkey_hardware::mock::MockTagReader;
/// use std::time::Duration;
///
/// # async fn example() -> latchkey_hardware::Result<()> {
/// let (reader, _handle) = MockTagReader::new();
/// let mut reader = AnyTagReader::Mock(reader);
///
/// if let Some(tag) = reader.poll_for_tag(Duration::from_millis(100)).await? {
///     println!("tag {}", tag.uid_hex());
/// }
/// # Ok(())
/// # }
/// ```
pub trait TagReader: Send + Sync {
    /// Wait up to `timeout` for a tag.
    ///
    /// # Returns
    ///
    /// `Ok(Some(tag))` when a tag was read, `Ok(None)` when no tag was presented
    /// within the timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader failed to communicate or returned a
    /// corrupted frame.
    async fn poll_for_tag(&mut self, timeout: Duration) -> Result<Option<TagData>>;

    /// Get device information.
    async fn get_info(&self) -> Result<DeviceInfo>;
}

/// Lock relay abstraction.
///
/// Energized releases the strike (door unlocked); de-energized locks.
pub trait Relay: Send + Sync {
    /// Drive the relay output.
    ///
    /// # Errors
    ///
    /// Returns an error if the output could not be written. The physical state
    /// is then unknown.
    async fn set_energized(&mut self, energized: bool) -> Result<()>;

    /// Get device information.
    async fn get_info(&self) -> Result<DeviceInfo>;
}

/// Door button panel abstraction.
pub trait ButtonPanel: Send + Sync {
    /// Sample whether `button` is currently pressed.
    ///
    /// # Errors
    ///
    /// Returns an error if the input could not be read.
    async fn is_pressed(&mut self, button: Button) -> Result<bool>;

    /// Get device information.
    async fn get_info(&self) -> Result<DeviceInfo>;
}
