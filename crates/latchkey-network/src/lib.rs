//! Remote service access for the Latchkey door controller.
//!
//! The door talks to a single spreadsheet-like service for two things: the
//! list of authorized badges and an append-only access log. Both are reached
//! through narrow traits so the runtime can swap in mocks, and every failure
//! surfaces as a [`RemoteError`] the caller absorbs.
//!
//! # Architecture
//!
//! ```text
//! AuthorizationCache ──> AuthorizationSource ──(HTTP GET)──> {base}/badges
//! AccessLogger       ──> LogSink             ──(HTTP POST)─> {base}/log
//! ```
//!
//! # Design Principles
//!
//! - **No automatic retry**: the caller decides when to try again
//! - **Bounded calls**: the HTTP client enforces a request timeout
//! - **No business logic**: normalization and validation live with the cache

pub mod error;
pub mod mock;
pub mod sheet;
pub mod sources;
pub mod traits;

pub use error::{RemoteError, Result};
pub use sheet::{HttpSheetClient, SheetClientConfig};
pub use sources::{AnyAuthorizationSource, AnyLogSink};
pub use traits::{AuthorizationSource, LogRow, LogSink};
