//! Seams to the remote store.
//!
//! Both traits use native `async fn`; the [`sources`](crate::sources) enums give
//! the runtime concrete, `Send` futures.

#![allow(async_fn_in_trait)]

use latchkey_core::AccessEvent;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One row appended to the remote access log: `[timestamp, subject, status]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRow {
    /// `YYYY-MM-DD HH:MM:SS` in local time.
    pub timestamp: String,
    pub subject: String,
    pub status: String,
}

impl LogRow {
    /// Row as an ordered list of cell values.
    pub fn to_values(&self) -> [&str; 3] {
        [&self.timestamp, &self.subject, &self.status]
    }
}

impl From<&AccessEvent> for LogRow {
    fn from(event: &AccessEvent) -> Self {
        Self {
            timestamp: event.remote_timestamp(),
            subject: event.subject_id.clone(),
            status: event.status.label().to_string(),
        }
    }
}

/// Remote source of the authorized badge list.
pub trait AuthorizationSource: Send + Sync {
    /// Fetch the raw authorized identifiers.
    ///
    /// The caller normalizes and validates the entries; implementations only
    /// strip transport framing.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`](crate::RemoteError) when the service is
    /// unreachable, slow, or answers with something unusable.
    async fn fetch_authorized(&self) -> Result<Vec<String>>;
}

/// Remote append-only access log.
pub trait LogSink: Send + Sync {
    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`](crate::RemoteError) if the row was not accepted.
    async fn append_row(&self, row: &LogRow) -> Result<()>;
}
