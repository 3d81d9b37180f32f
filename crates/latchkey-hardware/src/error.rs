//! Errors raised by the door peripherals.
//!
//! None of these stop the runtime: the polling loops record them as
//! `SYSTEM_ERROR` access events and keep polling.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The device went away and will not answer until reattached.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// The reader returned a UID outside the accepted length range.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("Tag read error: {message}")]
    TagReadError { message: String },

    /// Relay output could not be written; the strike position is unknown.
    #[error("Relay drive error: {message}")]
    RelayDriveError { message: String },

    #[error("Button read error: {message}")]
    ButtonReadError { message: String },
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn tag_read(message: impl Into<String>) -> Self {
        Self::TagReadError {
            message: message.into(),
        }
    }

    pub fn relay_drive(message: impl Into<String>) -> Self {
        Self::RelayDriveError {
            message: message.into(),
        }
    }

    pub fn button_read(message: impl Into<String>) -> Self {
        Self::ButtonReadError {
            message: message.into(),
        }
    }

    /// Whether the next poll can be expected to succeed.
    ///
    /// A disconnected device needs operator action.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Disconnected { .. })
    }
}
