//! Shared vocabulary for the Latchkey door controller.
//!
//! Badge identifiers, door state, access events, the fault taxonomy, the
//! wall-clock abstraction and the layered configuration live here so every
//! other crate speaks the same types.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, StartupRelayPolicy};
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
