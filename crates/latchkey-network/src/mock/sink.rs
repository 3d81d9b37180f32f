use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RemoteError, Result};
use crate::traits::{LogRow, LogSink};

#[derive(Debug, Default)]
struct SinkState {
    rows: Vec<LogRow>,
    failure: Option<String>,
    delay: Option<Duration>,
    attempts: usize,
}

/// Mock remote log that keeps accepted rows in memory.
#[derive(Debug)]
pub struct MockLogSink {
    state: Arc<Mutex<SinkState>>,
}

impl MockLogSink {
    pub fn new() -> (Self, MockLogSinkHandle) {
        let state = Arc::new(Mutex::new(SinkState::default()));
        let handle = MockLogSinkHandle {
            state: Arc::clone(&state),
        };
        (Self { state }, handle)
    }
}

impl LogSink for MockLogSink {
    async fn append_row(&self, row: &LogRow) -> Result<()> {
        let (failure, delay) = {
            let mut state = self.state.lock();
            state.attempts += 1;
            (state.failure.clone(), state.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = failure {
            return Err(RemoteError::unavailable(message));
        }

        self.state.lock().rows.push(row.clone());
        Ok(())
    }
}

/// Handle for inspecting and scripting a [`MockLogSink`].
#[derive(Debug, Clone)]
pub struct MockLogSinkHandle {
    state: Arc<Mutex<SinkState>>,
}

impl MockLogSinkHandle {
    /// Rows accepted so far, oldest first.
    pub fn rows(&self) -> Vec<LogRow> {
        self.state.lock().rows.clone()
    }

    /// Append calls made so far, including failed ones.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Fail subsequent appends, or accept them again with `None`.
    pub fn set_failure(&self, message: Option<&str>) {
        self.state.lock().failure = message.map(str::to_string);
    }

    /// Delay every append by `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }
}
