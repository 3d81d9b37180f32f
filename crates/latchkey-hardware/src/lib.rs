//! Hardware device abstraction layer for the Latchkey door controller.
//!
//! This crate provides trait-based abstractions for the door peripherals: a
//! tag reader, a lock relay and a two-button panel. The traits allow easy
//! substitution between mock implementations (for development and testing)
//! and real drivers.
//!
//! # Design Philosophy
//!
//! - **Async-first**: All I/O operations are asynchronous using native `async fn`
//!   in traits (Rust 1.90 + Edition 2024 RPITIT).
//! - **Enum dispatch**: The [`devices`] wrappers give the runtime concrete types
//!   whose futures are `Send`.
//! - **Error-aware**: All operations return `Result<T>` with detailed error information.
//!
//! # Example
//!
//! ```no_run
//! use latchkey_hardware::traits::{Relay, TagReader};
//! use latchkey_hardware::error::Result;
//! use std::time::Duration;
//!
//! async fn open_for_known_tag<R: TagReader, L: Relay>(reader: &mut R, relay: &mut L) -> Result<()> {
//!     if let Some(tag) = reader.poll_for_tag(Duration::from_millis(100)).await? {
//!         if tag.uid_hex() == "04a1b2c3" {
//!             relay.set_energized(true).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Mock Implementations
//!
//! The [`mock`] module provides simulated devices paired with control handles
//! for injecting tags, button presses and failures.

pub mod devices;
pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use devices::{AnyButtonPanel, AnyRelay, AnyTagReader};
pub use error::{HardwareError, Result};
pub use traits::{ButtonPanel, Relay, TagReader};
pub use types::{Button, DeviceInfo, MAX_UID_LENGTH, MIN_UID_LENGTH, TagData};
