//! Door runtime coordination.
//!
//! This crate ties the door hardware, the authorization list and the access
//! log together:
//!
//! - [`DoorController`]: the lock state machine and only writer of the relay
//! - [`AuthorizationCache`]: lock-free badge lookups with remote refresh
//! - [`AccessLogger`]: durable local audit log with remote and aggregate mirrors
//! - [`Watchdog`]: liveness heartbeat
//! - [`loops`]: the polling loops that feed them
//! - [`DoorRuntime`]: assembly and supervision of everything above
//! - [`StatusReporter`]: read-only snapshots for observers

pub mod authorization;
pub mod door;
pub mod error;
pub mod feed;
pub mod logger;
pub mod loops;
pub mod runtime;
pub mod status;
pub mod watchdog;

mod timer;

pub use authorization::{
    AuthorizationCache, AuthorizationStatus, AuthorizedSet, RefreshRejected, RefreshResult,
    RefreshTrigger, SetSource,
};
pub use door::{DoorController, DoorTransition, EventSink};
pub use error::{ControllerError, Result};
pub use feed::EventFeed;
pub use logger::{AccessLogStatus, AccessLogger, MirrorHandle, MirrorOutcome, MirrorReport};
pub use runtime::{DoorRuntime, RuntimeBuilder};
pub use status::{DeviceHealth, DeviceStatus, StatusReporter, StatusSnapshot};
pub use watchdog::{HeartbeatStatus, Watchdog};
