//! Shared fixtures for the controller integration tests.
//!
//! [`Rig`] assembles a door, authorization cache and access logger over mock
//! devices and mock remote services, all on one [`ManualClock`], and keeps
//! every control handle so tests can script the outside world.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeZone};
use latchkey_controller::loops::{
    BadgeScanLoop, BadgeScanSettings, ButtonLoop, ButtonSettings, LoopContext,
};
use latchkey_controller::{AccessLogger, AuthorizationCache, DeviceHealth, DoorController};
use latchkey_core::{AccessEvent, Clock, ManualClock, SharedClock};
use latchkey_hardware::mock::{
    MockButtonPanel, MockButtonPanelHandle, MockRelay, MockRelayHandle, MockTagReader,
    MockTagReaderHandle,
};
use latchkey_network::mock::{
    MockAuthorizationSource, MockAuthorizationSourceHandle, MockLogSink, MockLogSinkHandle,
};
use latchkey_storage::mock::{MockAggregateStore, MockAggregateStoreHandle};
use latchkey_storage::{FallbackFile, LocalAccessLog};
use tempfile::TempDir;

pub const BADGE_A: [u8; 4] = [0x04, 0xA1, 0xB2, 0xC3];
pub const BADGE_A_UID: &str = "04a1b2c3";
pub const BADGE_B: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Rig {
    pub dir: TempDir,
    pub clock: ManualClock,
    pub door: DoorController,
    pub cache: AuthorizationCache,
    pub logger: AccessLogger,
    pub relay: MockRelayHandle,
    pub source: MockAuthorizationSourceHandle,
    pub remote_log: MockLogSinkHandle,
    pub aggregate: MockAggregateStoreHandle,
}

impl Rig {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(Local.with_ymd_and_hms(2025, 3, 14, 8, 30, 0).unwrap());
        let shared: SharedClock = Arc::new(clock.clone());

        let (sink, remote_log) = MockLogSink::new();
        let (store, aggregate) = MockAggregateStore::new();
        let logger = AccessLogger::builder(LocalAccessLog::new(dir.path().join("logs"), "door", 7))
            .with_remote(sink)
            .with_aggregate(store)
            .with_remote_timeout(REMOTE_TIMEOUT)
            .with_clock(shared.clone())
            .build();

        let (relay, relay_handle) = MockRelay::new();
        let door = DoorController::builder(relay.into())
            .with_clock(shared.clone())
            .with_event_sink(Arc::new(logger.clone()))
            .build()
            .await;

        let (source, source_handle) = MockAuthorizationSource::new();
        let cache = AuthorizationCache::builder(FallbackFile::new(dir.path().join("badges.txt")))
            .with_source(source)
            .with_fetch_timeout(REMOTE_TIMEOUT)
            .with_clock(shared)
            .build();

        Self {
            dir,
            clock,
            door,
            cache,
            logger,
            relay: relay_handle,
            source: source_handle,
            remote_log,
            aggregate,
        }
    }

    /// Authorize `uids` through a successful remote refresh.
    pub async fn authorize(&self, uids: &[&str]) {
        self.source.set_badges(uids.iter().copied());
        self.cache.refresh().await.unwrap();
    }

    pub fn ctx(&self) -> LoopContext {
        LoopContext {
            door: self.door.clone(),
            cache: self.cache.clone(),
            logger: self.logger.clone(),
            clock: Arc::new(self.clock.clone()),
        }
    }

    pub fn scanner(&self) -> (BadgeScanLoop, MockTagReaderHandle) {
        let (reader, handle) = MockTagReader::new();
        let scan = BadgeScanLoop::new(
            reader.into(),
            self.ctx(),
            DeviceHealth::new(),
            BadgeScanSettings::default(),
        );
        (scan, handle)
    }

    pub fn buttons(&self) -> (ButtonLoop, MockButtonPanelHandle) {
        let (panel, handle) = MockButtonPanel::new();
        let buttons = ButtonLoop::new(
            panel.into(),
            self.ctx(),
            DeviceHealth::new(),
            ButtonSettings::default(),
        );
        (buttons, handle)
    }

    /// Local log lines written today, oldest first.
    pub fn local_events(&self) -> Vec<AccessEvent> {
        self.logger
            .read_day(self.clock.now().date_naive())
            .unwrap()
    }

    /// Advance both the tokio clock and the wall clock.
    pub async fn advance(&self, by: Duration) {
        self.clock.advance(chrono::Duration::from_std(by).unwrap());
        tokio::time::advance(by).await;
        settle().await;
    }
}

/// Let spawned timer and mirror tasks run.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
