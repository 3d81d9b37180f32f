//! Persistence for the Latchkey door controller.
//!
//! Everything the controller keeps on disk lives here:
//!
//! - [`LocalAccessLog`] - the durable, daily-rotating JSON-lines audit log
//! - [`FallbackFile`] - the last-known-good authorized badge list
//! - [`HeartbeatFile`] - the watchdog liveness file
//! - [`MonthlyMetricsStore`] - the SQLite aggregate store, one database per month
//!
//! The first three are plain files written synchronously; their failures are
//! fatal to the runtime. The aggregate store is reached through the
//! [`AggregateStore`] trait and treated as best effort.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Local;
//! use latchkey_core::AccessEvent;
//! use latchkey_storage::{AggregateStore, LocalAccessLog, MonthlyMetricsStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event = AccessEvent::manual_lock(Local::now());
//!
//! let mut log = LocalAccessLog::new("logs", "door_controller_action", 7);
//! log.append(&event)?;
//!
//! let metrics = MonthlyMetricsStore::new("data/metrics");
//! metrics.record_event(&event).await?;
//! # Ok(())
//! # }
//! ```

pub mod access_log;
pub mod aggregate;
pub mod error;
pub mod fallback;
pub mod heartbeat;
pub mod metrics;
pub mod mock;

pub use access_log::{AppendReceipt, LocalAccessLog, read_log_file};
pub use aggregate::{AggregateStore, AnyAggregateStore};
pub use error::{StorageError, StorageResult};
pub use fallback::{FallbackFile, FallbackSnapshot};
pub use heartbeat::HeartbeatFile;
pub use metrics::{Month, MonthSummary, MonthlyMetricsStore, StoredEvent};
