//! Aggregate store seam.
//!
//! The access logger mirrors every event into an aggregate store on a
//! best-effort basis. [`AnyAggregateStore`] provides concrete dispatch over
//! the SQLite store and the mock, following the enum dispatch pattern used for
//! hardware devices.

#![allow(async_fn_in_trait)]

use latchkey_core::AccessEvent;

use crate::error::StorageResult;
use crate::metrics::MonthlyMetricsStore;
use crate::mock::MockAggregateStore;

/// Destination for aggregated access events.
pub trait AggregateStore: Send + Sync {
    /// Record one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be stored. Callers treat this
    /// as a degraded mirror, never as a lost audit record.
    async fn record_event(&self, event: &AccessEvent) -> StorageResult<()>;
}

#[derive(Debug)]
#[non_exhaustive]
pub enum AnyAggregateStore {
    Sqlite(MonthlyMetricsStore),
    Mock(MockAggregateStore),
}

impl AggregateStore for AnyAggregateStore {
    async fn record_event(&self, event: &AccessEvent) -> StorageResult<()> {
        match self {
            Self::Sqlite(store) => store.record_event(event).await,
            Self::Mock(store) => store.record_event(event).await,
        }
    }
}

impl From<MonthlyMetricsStore> for AnyAggregateStore {
    fn from(store: MonthlyMetricsStore) -> Self {
        Self::Sqlite(store)
    }
}

impl From<MockAggregateStore> for AnyAggregateStore {
    fn from(store: MockAggregateStore) -> Self {
        Self::Mock(store)
    }
}
