//! In-memory aggregate store for tests and hardware-less runs.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use latchkey_core::AccessEvent;

use crate::aggregate::AggregateStore;
use crate::error::{StorageError, StorageResult};

#[derive(Debug, Default)]
struct StoreState {
    events: Vec<AccessEvent>,
    failure: Option<String>,
    delay: Option<Duration>,
}

/// Aggregate store that keeps events in memory.
///
/// # Examples
///
/// ```
/// use chrono::Local;
/// use latchkey_core::AccessEvent;
/// use latchkey_storage::AggregateStore;
/// use latchkey_storage::mock::MockAggregateStore;
///
/// #[tokio::main]
/// async fn main() {
///     let (store, handle) = MockAggregateStore::new();
///     store.record_event(&AccessEvent::manual_lock(Local::now())).await.unwrap();
///     assert_eq!(handle.events().len(), 1);
/// }
/// ```
#[derive(Debug)]
pub struct MockAggregateStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockAggregateStore {
    pub fn new() -> (Self, MockAggregateStoreHandle) {
        let state = Arc::new(Mutex::new(StoreState::default()));
        let handle = MockAggregateStoreHandle {
            state: Arc::clone(&state),
        };
        (Self { state }, handle)
    }
}

impl AggregateStore for MockAggregateStore {
    async fn record_event(&self, event: &AccessEvent) -> StorageResult<()> {
        let (failure, delay) = {
            let state = self.state.lock();
            (state.failure.clone(), state.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = failure {
            return Err(StorageError::Unavailable(message));
        }

        self.state.lock().events.push(event.clone());
        Ok(())
    }
}

/// Handle for inspecting and scripting a [`MockAggregateStore`].
#[derive(Debug, Clone)]
pub struct MockAggregateStoreHandle {
    state: Arc<Mutex<StoreState>>,
}

impl MockAggregateStoreHandle {
    pub fn events(&self) -> Vec<AccessEvent> {
        self.state.lock().events.clone()
    }

    pub fn set_failure(&self, message: Option<&str>) {
        self.state.lock().failure = message.map(str::to_string);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }
}
