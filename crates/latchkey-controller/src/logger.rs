//! Access logger: local durable log plus best-effort mirrors.
//!
//! [`AccessLogger::record`] appends to the local log before returning, in the
//! order callers arrive. Only then is the event published to the feed and
//! handed to a spawned mirror job, which writes the remote log row and the
//! aggregate store record, each under its own timeout. Mirror failures are
//! kept in the per-sink status and never reach the caller.
//!
//! A local write failure is fatal: it is returned to the caller and also
//! cancels the fault token so the runtime stops even when the caller could
//! not propagate it.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use latchkey_core::constants::{
    DEFAULT_AGGREGATE_TIMEOUT_SECS, DEFAULT_RECENT_EVENTS, DEFAULT_REMOTE_TIMEOUT_SECS,
};
use latchkey_core::{AccessEvent, FaultKind, FaultRecord, SharedClock, SystemClock};
use latchkey_network::{AnyLogSink, LogRow, LogSink};
use latchkey_storage::{
    AggregateStore, AnyAggregateStore, LocalAccessLog, StorageError, StorageResult,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::door::EventSink;
use crate::feed::EventFeed;

/// Result of one best-effort mirror write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum MirrorOutcome {
    Success,
    /// The sink is not configured.
    Skipped(String),
    Failed(String),
}

impl MirrorOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Outcome of both mirrors for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub remote: MirrorOutcome,
    pub aggregate: MirrorOutcome,
}

/// Pending mirror job for one recorded event.
///
/// Dropping the handle leaves the job running in the background.
#[derive(Debug)]
pub struct MirrorHandle(MirrorState);

#[derive(Debug)]
enum MirrorState {
    Spawned(JoinHandle<MirrorReport>),
    Ready(MirrorReport),
}

impl MirrorHandle {
    /// Wait for both mirror writes to finish.
    pub async fn wait(self) -> MirrorReport {
        match self.0 {
            MirrorState::Ready(report) => report,
            MirrorState::Spawned(handle) => handle.await.unwrap_or_else(|e| {
                let reason = format!("mirror task failed: {e}");
                MirrorReport {
                    remote: MirrorOutcome::Failed(reason.clone()),
                    aggregate: MirrorOutcome::Failed(reason),
                }
            }),
        }
    }
}

/// Health of one mirror sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SinkStatus {
    pub last_success_at: Option<DateTime<Local>>,
    pub last_error: Option<FaultRecord>,
    pub last_outcome: Option<MirrorOutcome>,
    pub attempts: u64,
    pub failures: u64,
}

/// Health of the local durable log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalLogStatus {
    pub last_write_at: Option<DateTime<Local>>,
    pub current_file: Option<PathBuf>,
    /// Size of the current day file in bytes.
    pub current_size: u64,
    pub writes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessLogStatus {
    pub local: LocalLogStatus,
    pub remote: SinkStatus,
    pub aggregate: SinkStatus,
}

struct LoggerInner {
    local: Mutex<LocalAccessLog>,
    local_status: Mutex<LocalLogStatus>,
    remote: Option<AnyLogSink>,
    aggregate: Option<AnyAggregateStore>,
    remote_timeout: Duration,
    aggregate_timeout: Duration,
    remote_status: Mutex<SinkStatus>,
    aggregate_status: Mutex<SinkStatus>,
    feed: EventFeed,
    fault: CancellationToken,
    fault_reason: Mutex<Option<String>>,
    clock: SharedClock,
}

impl LoggerInner {
    fn note(&self, status: &Mutex<SinkStatus>, sink: &'static str, outcome: &MirrorOutcome) {
        let now = self.clock.now();
        let mut status = status.lock();
        match outcome {
            MirrorOutcome::Success => {
                status.attempts += 1;
                status.last_success_at = Some(now);
            }
            MirrorOutcome::Failed(message) => {
                status.attempts += 1;
                status.failures += 1;
                status.last_error = Some(FaultRecord::new(
                    now,
                    FaultKind::RemoteUnavailable,
                    message.clone(),
                ));
                warn!(sink, error = %message, "Mirror write failed");
            }
            MirrorOutcome::Skipped(_) => {}
        }
        status.last_outcome = Some(outcome.clone());
    }
}

/// Shared access logger. Cheap to clone.
#[derive(Clone)]
pub struct AccessLogger {
    inner: Arc<LoggerInner>,
}

impl fmt::Debug for AccessLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessLogger")
            .field("remote", &self.inner.remote.is_some())
            .field("aggregate", &self.inner.aggregate.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AccessLogger`].
#[derive(Debug)]
pub struct AccessLoggerBuilder {
    local: LocalAccessLog,
    remote: Option<AnyLogSink>,
    aggregate: Option<AnyAggregateStore>,
    remote_timeout: Duration,
    aggregate_timeout: Duration,
    feed: Option<EventFeed>,
    fault: CancellationToken,
    clock: SharedClock,
}

impl AccessLoggerBuilder {
    pub fn with_remote(mut self, sink: impl Into<AnyLogSink>) -> Self {
        self.remote = Some(sink.into());
        self
    }

    pub fn with_aggregate(mut self, store: impl Into<AnyAggregateStore>) -> Self {
        self.aggregate = Some(store.into());
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_aggregate_timeout(mut self, timeout: Duration) -> Self {
        self.aggregate_timeout = timeout;
        self
    }

    pub fn with_feed(mut self, feed: EventFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Token cancelled on the first local write failure.
    pub fn with_fault_token(mut self, fault: CancellationToken) -> Self {
        self.fault = fault;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Build the logger, pruning expired day files first.
    pub fn build(self) -> AccessLogger {
        let today = self.clock.now().date_naive();
        match self.local.cleanup(today) {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Expired access logs removed"),
            Err(e) => warn!(error = %e, "Access log retention cleanup failed"),
        }

        AccessLogger {
            inner: Arc::new(LoggerInner {
                local: Mutex::new(self.local),
                local_status: Mutex::new(LocalLogStatus::default()),
                remote: self.remote,
                aggregate: self.aggregate,
                remote_timeout: self.remote_timeout,
                aggregate_timeout: self.aggregate_timeout,
                remote_status: Mutex::new(SinkStatus::default()),
                aggregate_status: Mutex::new(SinkStatus::default()),
                feed: self
                    .feed
                    .unwrap_or_else(|| EventFeed::new(DEFAULT_RECENT_EVENTS)),
                fault: self.fault,
                fault_reason: Mutex::new(None),
                clock: self.clock,
            }),
        }
    }
}

impl AccessLogger {
    pub fn builder(local: LocalAccessLog) -> AccessLoggerBuilder {
        AccessLoggerBuilder {
            local,
            remote: None,
            aggregate: None,
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            aggregate_timeout: Duration::from_secs(DEFAULT_AGGREGATE_TIMEOUT_SECS),
            feed: None,
            fault: CancellationToken::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Record one event.
    ///
    /// Returns once the event is durable locally. The returned handle can be
    /// awaited for the mirror results or dropped.
    ///
    /// # Errors
    ///
    /// Returns the local write error. The fault token is cancelled as well.
    pub fn record(&self, event: AccessEvent) -> Result<MirrorHandle, StorageError> {
        let appended = self.inner.local.lock().append(&event);
        match appended {
            Ok(receipt) => {
                let mut status = self.inner.local_status.lock();
                status.last_write_at = Some(self.inner.clock.now());
                status.current_file = Some(receipt.path);
                status.current_size = receipt.size;
                status.writes += 1;
            }
            Err(e) => {
                self.signal_fault(&e);
                return Err(e);
            }
        }
        debug!(
            event_type = %event.event_type,
            subject = %event.subject_id,
            status = %event.status,
            "Access event recorded"
        );

        self.inner.feed.publish(event.clone());

        let job = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                MirrorState::Spawned(runtime.spawn(mirror(Arc::clone(&self.inner), event)))
            }
            Err(_) => {
                let reason = "no async runtime".to_string();
                MirrorState::Ready(MirrorReport {
                    remote: MirrorOutcome::Skipped(reason.clone()),
                    aggregate: MirrorOutcome::Skipped(reason),
                })
            }
        };
        Ok(MirrorHandle(job))
    }

    fn signal_fault(&self, e: &StorageError) {
        error!(error = %e, "Local access log write failed");
        self.inner
            .fault_reason
            .lock()
            .get_or_insert_with(|| e.to_string());
        self.inner.fault.cancel();
    }

    /// Cancelled on the first local write failure.
    pub fn fault_token(&self) -> CancellationToken {
        self.inner.fault.clone()
    }

    /// Message of the first local write failure, if any.
    pub fn fault_reason(&self) -> Option<String> {
        self.inner.fault_reason.lock().clone()
    }

    pub fn feed(&self) -> &EventFeed {
        &self.inner.feed
    }

    pub fn status(&self) -> AccessLogStatus {
        AccessLogStatus {
            local: self.inner.local_status.lock().clone(),
            remote: self.inner.remote_status.lock().clone(),
            aggregate: self.inner.aggregate_status.lock().clone(),
        }
    }

    /// Size of the day file written last, in bytes.
    pub fn local_log_size(&self) -> u64 {
        self.inner.local_status.lock().current_size
    }

    pub fn current_log_path(&self) -> Option<PathBuf> {
        self.inner.local_status.lock().current_file.clone()
    }

    /// Read back the local log for `date`.
    pub fn read_day(&self, date: NaiveDate) -> StorageResult<Vec<AccessEvent>> {
        self.inner.local.lock().read_day(date)
    }
}

impl EventSink for AccessLogger {
    fn emit(&self, event: AccessEvent) {
        // Failures already cancelled the fault token.
        let _ = self.record(event);
    }
}

async fn mirror(inner: Arc<LoggerInner>, event: AccessEvent) -> MirrorReport {
    let remote = match &inner.remote {
        None => MirrorOutcome::Skipped("remote log not configured".to_string()),
        Some(sink) => {
            let row = LogRow::from(&event);
            bounded(inner.remote_timeout, sink.append_row(&row)).await
        }
    };
    inner.note(&inner.remote_status, "remote", &remote);

    let aggregate = match &inner.aggregate {
        None => MirrorOutcome::Skipped("aggregate store not configured".to_string()),
        Some(store) => bounded(inner.aggregate_timeout, store.record_event(&event)).await,
    };
    inner.note(&inner.aggregate_status, "aggregate", &aggregate);

    MirrorReport { remote, aggregate }
}

async fn bounded<F, E>(timeout: Duration, write: F) -> MirrorOutcome
where
    F: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    match tokio::time::timeout(timeout, write).await {
        Ok(Ok(())) => MirrorOutcome::Success,
        Ok(Err(e)) => MirrorOutcome::Failed(e.to_string()),
        Err(_) => MirrorOutcome::Failed(format!("timed out after {}ms", timeout.as_millis())),
    }
}
