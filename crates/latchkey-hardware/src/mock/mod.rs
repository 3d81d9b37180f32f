//! Mock device implementations for testing and development.
//!
//! This module provides simulated device implementations that can be controlled
//! programmatically without requiring physical hardware.

pub mod buttons;
pub mod reader;
pub mod relay;

// Re-export commonly used types
pub use buttons::{MockButtonPanel, MockButtonPanelHandle};
pub use reader::{MockTagReader, MockTagReaderHandle};
pub use relay::{MockRelay, MockRelayHandle};
