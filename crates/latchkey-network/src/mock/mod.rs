//! Scriptable in-memory stand-ins for the remote service.
//!
//! Each mock is paired with a handle that changes its answers, adds latency
//! or makes it fail, so outage behavior can be exercised deterministically.

pub mod sink;
pub mod source;

pub use sink::{MockLogSink, MockLogSinkHandle};
pub use source::{MockAuthorizationSource, MockAuthorizationSourceHandle};
