//! Door runtime: wires the components together and supervises the loops.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐
//! │ Badge scan │──►│             │      ┌───────┐
//! │ loop       │   │    Door     │─────►│ Relay │
//! └────────────┘   │ controller  │      └───────┘
//! ┌────────────┐   │             │
//! │ Button     │──►│             │
//! │ loop       │   └─────────────┘
//! └────────────┘          │ relay faults
//!       │                 ▼
//!       │           ┌─────────────┐     ┌─────────────────┐
//!       └──────────►│   Access    │────►│ remote log,     │
//!                   │   logger    │     │ aggregate store │
//! ┌────────────┐    └─────────────┘     └─────────────────┘
//! │ Refresh    │──► authorization cache
//! │ loop       │
//! └────────────┘
//! ┌────────────┐
//! │ Watchdog   │──► heartbeat file
//! └────────────┘
//! ```
//!
//! Every loop runs in its own task of one `JoinSet`. The first loop error,
//! panic or local storage fault stops the others and is returned from
//! [`DoorRuntime::run`]. Shutdown never drives the relay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use latchkey_core::{Config, SharedClock, SystemClock};
use latchkey_hardware::{
    AnyButtonPanel, AnyRelay, AnyTagReader, ButtonPanel, DeviceInfo, Relay, TagReader,
};
use latchkey_network::{AnyAuthorizationSource, AnyLogSink};
use latchkey_storage::{AnyAggregateStore, FallbackFile, HeartbeatFile, LocalAccessLog};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::authorization::{AuthorizationCache, RefreshTrigger};
use crate::door::DoorController;
use crate::error::{ControllerError, Result};
use crate::feed::EventFeed;
use crate::logger::AccessLogger;
use crate::loops::{
    BadgeScanLoop, BadgeScanSettings, ButtonLoop, ButtonSettings, LoopContext, RefreshLoop,
    WatchdogLoop, first_refresh_delay,
};
use crate::status::{DeviceHealth, StatusReporter};
use crate::watchdog::Watchdog;

/// Builder for [`DoorRuntime`].
///
/// The three devices are required. Without an authorization source every
/// refresh fails over to the fallback file; without a log sink or aggregate
/// store the matching mirror is skipped.
#[derive(Debug)]
pub struct RuntimeBuilder {
    config: Config,
    reader: Option<AnyTagReader>,
    relay: Option<AnyRelay>,
    buttons: Option<AnyButtonPanel>,
    authorization: Option<AnyAuthorizationSource>,
    log_sink: Option<AnyLogSink>,
    aggregate: Option<AnyAggregateStore>,
    clock: SharedClock,
}

impl RuntimeBuilder {
    pub fn with_reader(mut self, reader: impl Into<AnyTagReader>) -> Self {
        self.reader = Some(reader.into());
        self
    }

    pub fn with_relay(mut self, relay: impl Into<AnyRelay>) -> Self {
        self.relay = Some(relay.into());
        self
    }

    pub fn with_buttons(mut self, buttons: impl Into<AnyButtonPanel>) -> Self {
        self.buttons = Some(buttons.into());
        self
    }

    pub fn with_authorization_source(
        mut self,
        source: impl Into<AnyAuthorizationSource>,
    ) -> Self {
        self.authorization = Some(source.into());
        self
    }

    pub fn with_log_sink(mut self, sink: impl Into<AnyLogSink>) -> Self {
        self.log_sink = Some(sink.into());
        self
    }

    pub fn with_aggregate(mut self, store: impl Into<AnyAggregateStore>) -> Self {
        self.aggregate = Some(store.into());
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and assemble every component.
    ///
    /// The relay is driven here according to the startup policy, and the
    /// fallback badge list is loaded if present.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Config`] for an invalid configuration and
    /// [`ControllerError::MissingComponent`] when a device was not supplied.
    pub async fn build(self) -> Result<DoorRuntime> {
        let config = self.config;
        config.validate()?;

        let reader = self
            .reader
            .ok_or(ControllerError::MissingComponent("tag reader"))?;
        let relay = self.relay.ok_or(ControllerError::MissingComponent("relay"))?;
        let buttons = self
            .buttons
            .ok_or(ControllerError::MissingComponent("button panel"))?;

        log_device("tag reader", reader.get_info().await);
        log_device("relay", relay.get_info().await);
        log_device("button panel", buttons.get_info().await);

        let clock = self.clock;
        let feed = EventFeed::new(config.recent_events);

        let mut logger = AccessLogger::builder(LocalAccessLog::new(
            config.log_dir.clone(),
            config.log_file_stem.clone(),
            config.log_retention_days,
        ))
        .with_remote_timeout(config.remote_timeout())
        .with_aggregate_timeout(config.aggregate_timeout())
        .with_feed(feed.clone())
        .with_clock(clock.clone());
        if let Some(sink) = self.log_sink {
            logger = logger.with_remote(sink);
        }
        if let Some(store) = self.aggregate {
            logger = logger.with_aggregate(store);
        }
        let logger = logger.build();

        let door = DoorController::builder(relay)
            .with_clock(clock.clone())
            .with_startup_policy(config.startup_relay_policy)
            .with_event_sink(Arc::new(logger.clone()))
            .build()
            .await;

        let fallback = FallbackFile::new(config.fallback_file.clone());
        let mut cache = AuthorizationCache::builder(fallback)
            .with_fetch_timeout(config.remote_timeout())
            .with_min_remote_badges(config.min_remote_badges)
            .with_clock(clock.clone());
        if let Some(source) = self.authorization {
            cache = cache.with_source(source);
        } else {
            warn!("No remote authorization source; serving the fallback list only");
        }
        let cache = cache.build();

        let fallback_modified_at = cache.warm_start();
        let initial_refresh_delay = first_refresh_delay(
            config.badge_refresh_interval(),
            fallback_modified_at,
            clock.now(),
        );

        let heartbeat = HeartbeatFile::new(config.heartbeat_file.clone());
        let watchdog = Watchdog::new(heartbeat, clock.clone());
        let reader_health = DeviceHealth::new();
        let button_health = DeviceHealth::new();
        let reporter = StatusReporter::new(
            door.clone(),
            cache.clone(),
            logger.clone(),
            watchdog.clone(),
            reader_health.clone(),
            button_health.clone(),
            clock.clone(),
        );
        let trigger = RefreshTrigger::new(config.manual_refresh_cooldown());

        info!(
            badges = cache.current().len(),
            first_refresh_in_secs = initial_refresh_delay.as_secs(),
            "Door runtime ready"
        );

        Ok(DoorRuntime {
            config,
            reader,
            buttons,
            door,
            cache,
            logger,
            watchdog,
            reporter,
            feed,
            trigger,
            reader_health,
            button_health,
            initial_refresh_delay,
            clock,
        })
    }
}

fn log_device(role: &str, info: latchkey_hardware::Result<DeviceInfo>) {
    match info {
        Ok(info) => info!(role, device = %info, "Device attached"),
        Err(e) => warn!(role, error = %e, "Device info unavailable"),
    }
}

/// Assembled door runtime.
#[derive(Debug)]
pub struct DoorRuntime {
    config: Config,
    reader: AnyTagReader,
    buttons: AnyButtonPanel,
    door: DoorController,
    cache: AuthorizationCache,
    logger: AccessLogger,
    watchdog: Watchdog,
    reporter: StatusReporter,
    feed: EventFeed,
    trigger: RefreshTrigger,
    reader_health: DeviceHealth,
    button_health: DeviceHealth,
    initial_refresh_delay: Duration,
    clock: SharedClock,
}

impl DoorRuntime {
    pub fn builder(config: Config) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            reader: None,
            relay: None,
            buttons: None,
            authorization: None,
            log_sink: None,
            aggregate: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn door(&self) -> &DoorController {
        &self.door
    }

    pub fn authorization(&self) -> &AuthorizationCache {
        &self.cache
    }

    pub fn logger(&self) -> &AccessLogger {
        &self.logger
    }

    pub fn status_reporter(&self) -> StatusReporter {
        self.reporter.clone()
    }

    pub fn event_feed(&self) -> EventFeed {
        self.feed.clone()
    }

    pub fn refresh_trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    /// Delay before the first scheduled remote refresh.
    pub fn initial_refresh_delay(&self) -> Duration {
        self.initial_refresh_delay
    }

    /// Run every loop until `shutdown` is cancelled or a fatal error occurs.
    ///
    /// # Errors
    ///
    /// Returns the first loop error, a reported local storage fault, or
    /// [`ControllerError::TaskPanicked`].
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let stop = shutdown.child_token();
        let fault = self.logger.fault_token();
        let ctx = LoopContext {
            door: self.door.clone(),
            cache: self.cache.clone(),
            logger: self.logger.clone(),
            clock: self.clock.clone(),
        };

        let mut tasks = JoinSet::new();
        let mut names: HashMap<Id, &'static str> = HashMap::new();

        let scan = BadgeScanLoop::new(
            self.reader,
            ctx.clone(),
            self.reader_health,
            BadgeScanSettings::from_config(&self.config),
        );
        names.insert(tasks.spawn(scan.run(stop.clone())).id(), "badge scan");

        let buttons = ButtonLoop::new(
            self.buttons,
            ctx,
            self.button_health,
            ButtonSettings::from_config(&self.config),
        );
        names.insert(tasks.spawn(buttons.run(stop.clone())).id(), "buttons");

        let refresh = RefreshLoop::new(
            self.cache,
            self.trigger,
            self.config.badge_refresh_interval(),
        )
        .with_initial_delay(self.initial_refresh_delay);
        names.insert(tasks.spawn(refresh.run(stop.clone())).id(), "badge refresh");

        let watchdog = WatchdogLoop::new(self.watchdog, self.config.watchdog_interval());
        names.insert(tasks.spawn(watchdog.run(stop.clone())).id(), "watchdog");

        info!(tasks = tasks.len(), "Door runtime started");

        let mut first_error: Option<ControllerError> = None;
        let mut fault_seen = false;
        loop {
            tokio::select! {
                _ = fault.cancelled(), if !fault_seen => {
                    fault_seen = true;
                    let reason = self
                        .logger
                        .fault_reason()
                        .unwrap_or_else(|| "access log write failed".to_string());
                    error!(reason = %reason, "Local storage fault, stopping");
                    first_error.get_or_insert(ControllerError::LocalStorageReported(reason));
                    stop.cancel();
                }
                joined = tasks.join_next_with_id() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((id, Ok(()))) => {
                            let task = names.get(&id).copied().unwrap_or("unknown");
                            debug!(task, "Task finished");
                        }
                        Ok((id, Err(e))) => {
                            let task = names.get(&id).copied().unwrap_or("unknown");
                            error!(task, error = %e, "Task failed, stopping");
                            first_error.get_or_insert(e);
                            stop.cancel();
                        }
                        Err(e) => {
                            let task = names.get(&e.id()).copied().unwrap_or("unknown");
                            if e.is_panic() {
                                error!(task, "Task panicked, stopping");
                                first_error.get_or_insert(ControllerError::TaskPanicked {
                                    task: task.to_string(),
                                });
                            }
                            stop.cancel();
                        }
                    }
                }
            }
        }

        let state = self.door.current_state();
        info!(
            lock_state = %state.lock_state,
            cause = %state.cause,
            "Door runtime stopped; relay left as driven"
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_core::LockState;
    use latchkey_hardware::mock::{MockButtonPanel, MockRelay, MockTagReader};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config::default()
            .with_data_root(dir.path())
            .with_aggregate_enabled(false)
    }

    #[tokio::test]
    async fn test_build_requires_devices() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, _) = MockRelay::new();

        let err = DoorRuntime::builder(config(&dir))
            .with_relay(relay)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::MissingComponent("tag reader")));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.watchdog_interval_secs = 0;

        let err = DoorRuntime::builder(config).build().await.unwrap_err();
        assert!(matches!(err, ControllerError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown_and_leaves_relay() {
        let dir = tempfile::tempdir().unwrap();
        let (reader, _reader) = MockTagReader::new();
        let (relay, relay_handle) = MockRelay::new();
        let (buttons, _buttons) = MockButtonPanel::new();

        let runtime = DoorRuntime::builder(config(&dir))
            .with_reader(reader)
            .with_relay(relay)
            .with_buttons(buttons)
            .build()
            .await
            .unwrap();
        assert_eq!(runtime.initial_refresh_delay(), Duration::ZERO);

        let door = runtime.door().clone();
        let reporter = runtime.status_reporter();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(runtime.run(shutdown.clone()));

        door.request_unlock(latchkey_core::DoorCause::ManualUnlock, Duration::from_secs(3600))
            .await;
        tokio::time::sleep(Duration::from_secs(15)).await;
        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(door.current_state().lock_state, LockState::Unlocked);
        assert!(relay_handle.is_energized());
        assert_eq!(reporter.snapshot().heartbeat.beats, 2);
    }
}
