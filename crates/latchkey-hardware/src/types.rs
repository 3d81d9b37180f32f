//! Common types shared across hardware device implementations.
//!
//! This module defines types used by multiple device traits, such as
//! device information, tag reads and button identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{HardwareError, Result};

/// Minimum UID length in bytes (ISO 14443 single-size UID).
pub const MIN_UID_LENGTH: usize = 4;

/// Maximum UID length in bytes (ISO 14443 triple-size UID).
pub const MAX_UID_LENGTH: usize = 10;

/// Generic device information.
///
/// Contains metadata about a hardware device such as name, model,
/// serial number, and firmware version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name (e.g., "PN532", "Mock Relay").
    pub name: String,

    /// Device model identifier.
    pub model: String,

    /// Optional device serial number.
    pub serial_number: Option<String>,

    /// Optional firmware version string.
    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    /// Create a new DeviceInfo with required fields.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            serial_number: None,
            firmware_version: None,
        }
    }

    /// Set the serial number.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set the firmware version.
    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.model)?;
        if let Some(fw) = &self.firmware_version {
            write!(f, " fw {fw}")?;
        }
        Ok(())
    }
}

/// A tag presented to the reader.
///
/// # Examples
///
/// ```
/// use latchkey_hardware::types::TagData;
///
/// let tag = TagData::new(vec![0x04, 0xA1, 0xB2, 0xC3]).unwrap();
/// assert_eq!(tag.uid_hex(), "04a1b2c3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagData {
    uid: Vec<u8>,
}

impl TagData {
    /// Create tag data from a raw UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID length is outside 4-10 bytes.
    pub fn new(uid: Vec<u8>) -> Result<Self> {
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&uid.len()) {
            return Err(HardwareError::invalid_data(format!(
                "UID must be {}-{} bytes, got {}",
                MIN_UID_LENGTH,
                MAX_UID_LENGTH,
                uid.len()
            )));
        }
        Ok(Self { uid })
    }

    /// Raw UID bytes.
    pub fn uid(&self) -> &[u8] {
        &self.uid
    }

    /// UID rendered as lower-case hex without separators.
    pub fn uid_hex(&self) -> String {
        self.uid.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Physical buttons on the door panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Unlock,
    Lock,
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Button::Unlock => write!(f, "unlock"),
            Button::Lock => write!(f, "lock"),
        }
    }
}
