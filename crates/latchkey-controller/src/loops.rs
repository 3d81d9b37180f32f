//! Polling loops driving the door.
//!
//! Each loop owns its device and runs as its own task until the stop token
//! is cancelled. Hardware and remote failures are absorbed here. Only a
//! local storage fault ends a loop with an error.

use std::time::Duration;

use chrono::{DateTime, Local};
use latchkey_core::constants::{BUTTON_CONFIRM_MS, BUTTONS_SUBJECT, READER_SUBJECT};
use latchkey_core::{AccessEvent, BadgeUid, Config, DoorCause, SharedClock};
use latchkey_hardware::{AnyButtonPanel, AnyTagReader, Button, ButtonPanel, TagData, TagReader};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::authorization::{AuthorizationCache, RefreshTrigger};
use crate::door::DoorController;
use crate::error::Result;
use crate::logger::AccessLogger;
use crate::status::DeviceHealth;
use crate::watchdog::Watchdog;

/// Handles every input loop needs.
#[derive(Debug, Clone)]
pub struct LoopContext {
    pub door: DoorController,
    pub cache: AuthorizationCache,
    pub logger: AccessLogger,
    pub clock: SharedClock,
}

/// Sleep for `duration` unless stopped first. Returns `false` when stopped.
async fn pause(duration: Duration, stop: &CancellationToken) -> bool {
    tokio::select! {
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn deadline(now: DateTime<Local>, duration: Duration) -> Option<DateTime<Local>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
}

// ── Badge scan ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeScanSettings {
    pub poll_timeout: Duration,
    /// Pause after a scan so one presentation is not read twice.
    pub cooldown: Duration,
    pub error_backoff: Duration,
    pub unlock_duration: Duration,
}

impl BadgeScanSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_timeout: config.reader_poll_timeout(),
            cooldown: config.scan_cooldown(),
            error_backoff: config.reader_error_backoff(),
            unlock_duration: config.badge_unlock_duration(),
        }
    }
}

impl Default for BadgeScanSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of one reader poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No tag in range.
    Idle,
    Granted(BadgeUid),
    Denied(BadgeUid),
    ReaderError,
}

#[derive(Debug)]
pub struct BadgeScanLoop {
    reader: AnyTagReader,
    ctx: LoopContext,
    health: DeviceHealth,
    settings: BadgeScanSettings,
}

impl BadgeScanLoop {
    pub fn new(
        reader: AnyTagReader,
        ctx: LoopContext,
        health: DeviceHealth,
        settings: BadgeScanSettings,
    ) -> Self {
        Self {
            reader,
            ctx,
            health,
            settings,
        }
    }

    pub async fn run(mut self, stop: CancellationToken) -> Result<()> {
        info!("Badge scan loop started");
        loop {
            let polled = tokio::select! {
                _ = stop.cancelled() => break,
                polled = self.reader.poll_for_tag(self.settings.poll_timeout) => polled,
            };

            let wait = match self.handle(polled).await? {
                ScanOutcome::Idle => continue,
                ScanOutcome::ReaderError => self.settings.error_backoff,
                ScanOutcome::Granted(_) | ScanOutcome::Denied(_) => self.settings.cooldown,
            };
            if !pause(wait, &stop).await {
                break;
            }
        }
        info!("Badge scan loop stopped");
        Ok(())
    }

    /// Poll the reader once and act on the result.
    pub async fn poll_once(&mut self) -> Result<ScanOutcome> {
        let polled = self.reader.poll_for_tag(self.settings.poll_timeout).await;
        self.handle(polled).await
    }

    async fn handle(
        &self,
        polled: latchkey_hardware::Result<Option<TagData>>,
    ) -> Result<ScanOutcome> {
        let now = self.ctx.clock.now();
        let tag = match polled {
            Ok(None) => {
                self.health.record_success(now);
                return Ok(ScanOutcome::Idle);
            }
            Ok(Some(tag)) => tag,
            Err(e) => {
                self.health.record_error(now, e.to_string());
                if e.is_transient() {
                    warn!(error = %e, "Tag reader error");
                } else {
                    error!(error = %e, "Tag reader unavailable");
                }
                self.ctx
                    .logger
                    .record(AccessEvent::system_error(now, READER_SUBJECT, &e))?;
                return Ok(ScanOutcome::ReaderError);
            }
        };
        self.health.record_success(now);

        let uid = match BadgeUid::from_bytes(tag.uid()) {
            Ok(uid) => uid,
            Err(e) => {
                warn!(error = %e, "Unusable tag UID");
                self.ctx
                    .logger
                    .record(AccessEvent::system_error(now, READER_SUBJECT, &e))?;
                return Ok(ScanOutcome::ReaderError);
            }
        };

        let granted = self.ctx.cache.is_authorized_uid(&uid);
        if granted {
            self.grant(now).await;
        }
        info!(uid = %uid, granted, "Badge scanned");
        self.ctx
            .logger
            .record(AccessEvent::badge_scan(now, &uid, granted))?;

        Ok(if granted {
            ScanOutcome::Granted(uid)
        } else {
            ScanOutcome::Denied(uid)
        })
    }

    async fn grant(&self, now: DateTime<Local>) {
        let state = self.ctx.door.current_state();
        let wanted = deadline(now, self.settings.unlock_duration);
        let covered = state.is_unlocked()
            && match (state.auto_relock_at, wanted) {
                (None, _) => true,
                (Some(at), Some(wanted)) => at >= wanted,
                (Some(_), None) => false,
            };

        if covered {
            debug!("Door already unlocked past the badge dwell");
            return;
        }
        self.ctx
            .door
            .request_unlock(DoorCause::Badge, self.settings.unlock_duration)
            .await;
    }
}

// ── Buttons ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonSettings {
    pub poll_interval: Duration,
    pub debounce: Duration,
    /// Delay before the second read that confirms an unlock press.
    pub confirm_delay: Duration,
    pub manual_unlock_duration: Duration,
}

impl ButtonSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.button_poll_interval(),
            debounce: config.debounce(),
            confirm_delay: Duration::from_millis(BUTTON_CONFIRM_MS),
            manual_unlock_duration: config.manual_unlock_duration(),
        }
    }
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    ManualUnlock,
    ManualLock,
    ReadError(Button),
}

/// Subject recorded for a manual unlock, e.g. `Manual Unlock (1 hour)`.
pub fn manual_unlock_label(duration: Duration) -> String {
    fn count(n: u64, unit: &str) -> String {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    }

    let secs = duration.as_secs();
    let span = if secs > 0 && secs % 3600 == 0 {
        count(secs / 3600, "hour")
    } else if secs > 0 && secs % 60 == 0 {
        count(secs / 60, "minute")
    } else {
        count(secs, "second")
    };
    format!("Manual Unlock ({span})")
}

#[derive(Debug)]
pub struct ButtonLoop {
    panel: AnyButtonPanel,
    ctx: LoopContext,
    health: DeviceHealth,
    settings: ButtonSettings,
    last_unlock: Option<Instant>,
    last_lock: Option<Instant>,
}

impl ButtonLoop {
    pub fn new(
        panel: AnyButtonPanel,
        ctx: LoopContext,
        health: DeviceHealth,
        settings: ButtonSettings,
    ) -> Self {
        Self {
            panel,
            ctx,
            health,
            settings,
            last_unlock: None,
            last_lock: None,
        }
    }

    pub async fn run(mut self, stop: CancellationToken) -> Result<()> {
        info!("Button loop started");
        while !stop.is_cancelled() {
            self.poll_once().await?;
            if !pause(self.settings.poll_interval, &stop).await {
                break;
            }
        }
        info!("Button loop stopped");
        Ok(())
    }

    /// Read both buttons once and act on presses.
    pub async fn poll_once(&mut self) -> Result<Vec<ButtonAction>> {
        let mut actions = Vec::new();
        if let Some(action) = self.check_unlock().await? {
            actions.push(action);
        }
        if let Some(action) = self.check_lock().await? {
            actions.push(action);
        }
        Ok(actions)
    }

    async fn check_unlock(&mut self) -> Result<Option<ButtonAction>> {
        match self.read(Button::Unlock).await? {
            Some(true) => {}
            Some(false) => return Ok(None),
            None => return Ok(Some(ButtonAction::ReadError(Button::Unlock))),
        }
        if !self.debounced(self.last_unlock) {
            return Ok(None);
        }

        tokio::time::sleep(self.settings.confirm_delay).await;
        if self.read(Button::Unlock).await? != Some(true) {
            debug!("Unlock press not confirmed");
            return Ok(None);
        }
        self.last_unlock = Some(Instant::now());

        let state = self.ctx.door.current_state();
        if state.is_unlocked() && state.cause == DoorCause::ManualUnlock {
            debug!("Door already in manual unlock");
            return Ok(None);
        }

        self.ctx
            .door
            .request_unlock(DoorCause::ManualUnlock, self.settings.manual_unlock_duration)
            .await;
        let label = manual_unlock_label(self.settings.manual_unlock_duration);
        self.ctx
            .logger
            .record(AccessEvent::manual_unlock(self.ctx.clock.now(), label))?;
        Ok(Some(ButtonAction::ManualUnlock))
    }

    async fn check_lock(&mut self) -> Result<Option<ButtonAction>> {
        match self.read(Button::Lock).await? {
            Some(true) => {}
            Some(false) => return Ok(None),
            None => return Ok(Some(ButtonAction::ReadError(Button::Lock))),
        }
        if !self.debounced(self.last_lock) {
            return Ok(None);
        }
        self.last_lock = Some(Instant::now());

        if !self.ctx.door.current_state().is_unlocked() {
            debug!("Lock pressed while already locked");
            return Ok(None);
        }

        self.ctx.door.request_lock().await;
        self.ctx
            .logger
            .record(AccessEvent::manual_lock(self.ctx.clock.now()))?;
        Ok(Some(ButtonAction::ManualLock))
    }

    /// Read one button. `None` means the read failed.
    ///
    /// Only the first failure of a streak is written to the access log; at
    /// the poll rate a stuck panel would otherwise flood it.
    async fn read(&mut self, button: Button) -> Result<Option<bool>> {
        let now = self.ctx.clock.now();
        match self.panel.is_pressed(button).await {
            Ok(pressed) => {
                self.health.record_success(now);
                Ok(Some(pressed))
            }
            Err(e) => {
                let streak = self.health.record_error(now, e.to_string());
                if streak == 1 {
                    warn!(%button, error = %e, "Button read failed");
                    self.ctx.logger.record(AccessEvent::system_error(
                        now,
                        BUTTONS_SUBJECT,
                        format!("{button}: {e}"),
                    ))?;
                } else {
                    debug!(%button, streak, error = %e, "Button read still failing");
                }
                Ok(None)
            }
        }
    }

    fn debounced(&self, last: Option<Instant>) -> bool {
        last.is_none_or(|at| at.elapsed() >= self.settings.debounce)
    }
}

// ── Authorization refresh ───────────────────────────────────────────

/// Delay before the first remote refresh given the fallback file's age.
///
/// A fallback younger than `interval` postpones the refresh by the remaining
/// time. A missing or future-dated file refreshes immediately.
pub fn first_refresh_delay(
    interval: Duration,
    fallback_modified_at: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> Duration {
    fallback_modified_at
        .and_then(|modified| (now - modified).to_std().ok())
        .map_or(Duration::ZERO, |age| interval.saturating_sub(age))
}

#[derive(Debug)]
pub struct RefreshLoop {
    cache: AuthorizationCache,
    trigger: RefreshTrigger,
    interval: Duration,
    initial_delay: Duration,
}

impl RefreshLoop {
    pub fn new(cache: AuthorizationCache, trigger: RefreshTrigger, interval: Duration) -> Self {
        Self {
            cache,
            trigger,
            interval,
            initial_delay: Duration::ZERO,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub async fn run(self, stop: CancellationToken) -> Result<()> {
        info!(
            first_in_secs = self.initial_delay.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Badge refresh loop started"
        );
        let mut next = Instant::now() + self.initial_delay;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep_until(next) => debug!("Scheduled badge refresh"),
                _ = self.trigger.requested() => debug!("On-demand badge refresh"),
            }

            let result = tokio::select! {
                _ = stop.cancelled() => break,
                result = self.cache.refresh() => result?,
            };
            debug!(?result, "Badge refresh finished");
            next = Instant::now() + self.interval;
        }
        info!("Badge refresh loop stopped");
        Ok(())
    }
}

// ── Watchdog ────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct WatchdogLoop {
    watchdog: Watchdog,
    interval: Duration,
}

impl WatchdogLoop {
    pub fn new(watchdog: Watchdog, interval: Duration) -> Self {
        Self { watchdog, interval }
    }

    /// Beat immediately, then every interval. Write failures are logged by
    /// the watchdog and never end the loop.
    pub async fn run(self, stop: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let _ = self.watchdog.tick();
                }
            }
        }
        debug!("Watchdog loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use latchkey_core::{EventType, LockState, ManualClock};
    use latchkey_hardware::mock::{
        MockButtonPanel, MockButtonPanelHandle, MockRelay, MockRelayHandle, MockTagReader,
        MockTagReaderHandle,
    };
    use latchkey_network::mock::MockAuthorizationSource;
    use latchkey_storage::{FallbackFile, HeartbeatFile, LocalAccessLog};
    use rstest::rstest;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        ctx: LoopContext,
        relay: MockRelayHandle,
    }

    impl Harness {
        fn events(&self) -> Vec<AccessEvent> {
            let today = self.ctx.clock.now().date_naive();
            self.ctx.logger.read_day(today).unwrap()
        }
    }

    async fn harness(authorized: &[&str]) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let clock: SharedClock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap(),
        ));
        let (relay, relay_handle) = MockRelay::new();
        let door = DoorController::builder(relay.into())
            .with_clock(clock.clone())
            .build()
            .await;

        let (source, remote) = MockAuthorizationSource::new();
        remote.set_badges(authorized.iter().copied());
        let cache = AuthorizationCache::builder(FallbackFile::new(dir.path().join("badges.txt")))
            .with_source(source)
            .with_clock(clock.clone())
            .build();
        if !authorized.is_empty() {
            cache.refresh().await.unwrap();
        }

        let logger = AccessLogger::builder(LocalAccessLog::new(dir.path().join("logs"), "door", 7))
            .with_clock(clock.clone())
            .build();

        Harness {
            _dir: dir,
            ctx: LoopContext {
                door,
                cache,
                logger,
                clock,
            },
            relay: relay_handle,
        }
    }

    fn scanner(h: &Harness) -> (BadgeScanLoop, MockTagReaderHandle, DeviceHealth) {
        let (reader, handle) = MockTagReader::new();
        let health = DeviceHealth::new();
        let scan = BadgeScanLoop::new(
            reader.into(),
            h.ctx.clone(),
            health.clone(),
            BadgeScanSettings::default(),
        );
        (scan, handle, health)
    }

    fn buttons(h: &Harness) -> (ButtonLoop, MockButtonPanelHandle) {
        let (panel, handle) = MockButtonPanel::new();
        let buttons = ButtonLoop::new(
            panel.into(),
            h.ctx.clone(),
            DeviceHealth::new(),
            ButtonSettings::default(),
        );
        (buttons, handle)
    }

    // ── Badge scan ──

    #[tokio::test(start_paused = true)]
    async fn test_granted_scan_unlocks_and_logs() {
        let h = harness(&["04a1b2c3"]).await;
        let (mut scan, reader, health) = scanner(&h);

        reader.present_tag(vec![0x04, 0xA1, 0xB2, 0xC3]).await.unwrap();
        let outcome = scan.poll_once().await.unwrap();

        assert_eq!(outcome, ScanOutcome::Granted(BadgeUid::new("04a1b2c3").unwrap()));
        let state = h.ctx.door.current_state();
        assert_eq!(state.lock_state, LockState::Unlocked);
        assert_eq!(state.cause, DoorCause::Badge);
        assert!(h.relay.is_energized());

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject_id, "04a1b2c3");
        assert_eq!(events[0].raw_message, "Badge Scan - Badge: 04a1b2c3 - Status: Granted");
        assert!(health.status().last_success_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_scan_leaves_door_locked() {
        let h = harness(&["04a1b2c3"]).await;
        let (mut scan, reader, _) = scanner(&h);

        reader.present_tag(vec![0xDE, 0xAD, 0xBE, 0xEF]).await.unwrap();
        let outcome = scan.poll_once().await.unwrap();

        assert!(matches!(outcome, ScanOutcome::Denied(_)));
        assert!(!h.ctx.door.current_state().is_unlocked());
        assert_eq!(h.relay.drives(), vec![false]);
        assert_eq!(h.events()[0].status.as_str(), "DENIED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_poll_records_nothing() {
        let h = harness(&[]).await;
        let (mut scan, _reader, _) = scanner(&h);

        assert_eq!(scan.poll_once().await.unwrap(), ScanOutcome::Idle);
        assert!(h.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_fault_is_logged_and_tracked() {
        let h = harness(&[]).await;
        let (mut scan, reader, health) = scanner(&h);

        reader.inject_fault("CRC mismatch").await.unwrap();
        assert_eq!(scan.poll_once().await.unwrap(), ScanOutcome::ReaderError);

        let events = h.events();
        assert_eq!(events[0].event_type, EventType::SystemError);
        assert_eq!(events[0].subject_id, READER_SUBJECT);
        assert_eq!(health.status().consecutive_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_badge_does_not_shorten_manual_unlock() {
        let h = harness(&["04a1b2c3"]).await;
        let (mut scan, reader, _) = scanner(&h);
        h.ctx
            .door
            .request_unlock(DoorCause::ManualUnlock, Duration::from_secs(3600))
            .await;

        reader.present_tag(vec![0x04, 0xA1, 0xB2, 0xC3]).await.unwrap();
        scan.poll_once().await.unwrap();

        let state = h.ctx.door.current_state();
        assert_eq!(state.cause, DoorCause::ManualUnlock);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(h.ctx.door.current_state().is_unlocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let h = harness(&[]).await;
        let (scan, _reader, _) = scanner(&h);
        let stop = CancellationToken::new();

        let task = tokio::spawn(scan.run(stop.clone()));
        tokio::time::sleep(Duration::from_millis(350)).await;
        stop.cancel();
        task.await.unwrap().unwrap();
    }

    // ── Buttons ──

    #[tokio::test(start_paused = true)]
    async fn test_unlock_press_unlocks_for_an_hour() {
        let h = harness(&[]).await;
        let (mut loop_, panel) = buttons(&h);

        panel.press(Button::Unlock);
        let actions = loop_.poll_once().await.unwrap();
        assert_eq!(actions, vec![ButtonAction::ManualUnlock]);

        let state = h.ctx.door.current_state();
        assert_eq!(state.cause, DoorCause::ManualUnlock);
        assert_eq!(
            state.auto_relock_at,
            Some(h.ctx.clock.now() + chrono::Duration::seconds(3600))
        );
        assert_eq!(h.events()[0].subject_id, "Manual Unlock (1 hour)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_unlock_button_triggers_once() {
        let h = harness(&[]).await;
        let (mut loop_, panel) = buttons(&h);

        panel.press(Button::Unlock);
        for _ in 0..20 {
            loop_.poll_once().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        assert_eq!(h.events().len(), 1);
        assert_eq!(h.relay.drives(), vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_press_only_acts_when_unlocked() {
        let h = harness(&[]).await;
        let (mut loop_, panel) = buttons(&h);

        panel.press(Button::Lock);
        assert!(loop_.poll_once().await.unwrap().is_empty());
        panel.release(Button::Lock);

        h.ctx
            .door
            .request_unlock(DoorCause::Badge, Duration::from_secs(5))
            .await;
        tokio::time::advance(Duration::from_millis(600)).await;
        panel.press(Button::Lock);
        assert_eq!(loop_.poll_once().await.unwrap(), vec![ButtonAction::ManualLock]);

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ManualLock);
        assert_eq!(h.ctx.door.current_state().cause, DoorCause::ManualLock);
    }

    #[tokio::test(start_paused = true)]
    async fn test_button_errors_logged_once_per_streak() {
        let h = harness(&[]).await;
        let (mut loop_, panel) = buttons(&h);

        panel.set_failing(true);
        for _ in 0..5 {
            loop_.poll_once().await.unwrap();
        }
        assert_eq!(h.events().len(), 1);
        assert_eq!(h.events()[0].subject_id, BUTTONS_SUBJECT);

        panel.set_failing(false);
        loop_.poll_once().await.unwrap();
        panel.set_failing(true);
        loop_.poll_once().await.unwrap();
        assert_eq!(h.events().len(), 2);
    }

    #[rstest]
    #[case(3600, "Manual Unlock (1 hour)")]
    #[case(7200, "Manual Unlock (2 hours)")]
    #[case(1800, "Manual Unlock (30 minutes)")]
    #[case(60, "Manual Unlock (1 minute)")]
    #[case(45, "Manual Unlock (45 seconds)")]
    fn test_manual_unlock_label(#[case] secs: u64, #[case] expected: &str) {
        assert_eq!(manual_unlock_label(Duration::from_secs(secs)), expected);
    }

    // ── Refresh ──

    #[test]
    fn test_first_refresh_delay() {
        let now = Local.with_ymd_and_hms(2025, 9, 2, 12, 0, 0).unwrap();
        let day = Duration::from_secs(86_400);

        assert_eq!(first_refresh_delay(day, None, now), Duration::ZERO);
        assert_eq!(
            first_refresh_delay(day, Some(now - chrono::Duration::hours(20)), now),
            Duration::from_secs(4 * 3600)
        );
        assert_eq!(
            first_refresh_delay(day, Some(now - chrono::Duration::hours(30)), now),
            Duration::ZERO
        );
        assert_eq!(
            first_refresh_delay(day, Some(now + chrono::Duration::hours(1)), now),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_runs_on_schedule_and_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let (source, remote) = MockAuthorizationSource::new();
        remote.set_badges(["04a1b2c3"]);
        let cache = AuthorizationCache::builder(FallbackFile::new(dir.path().join("badges.txt")))
            .with_source(source)
            .build();
        let trigger = RefreshTrigger::new(Duration::from_secs(300));
        let stop = CancellationToken::new();

        let refresh = RefreshLoop::new(cache.clone(), trigger.clone(), Duration::from_secs(3600))
            .with_initial_delay(Duration::from_secs(60));
        let task = tokio::spawn(refresh.run(stop.clone()));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(remote.calls(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(remote.calls(), 1);
        assert!(cache.is_authorized("04a1b2c3"));

        trigger.request().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(remote.calls(), 2);

        stop.cancel();
        task.await.unwrap().unwrap();
    }

    // ── Watchdog ──

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_loop_beats_every_interval() {
        let dir = tempfile::tempdir().unwrap();
        let watchdog = Watchdog::new(
            HeartbeatFile::new(dir.path().join("watchdog.txt")),
            Arc::new(latchkey_core::SystemClock),
        );
        let stop = CancellationToken::new();
        let task = tokio::spawn(
            WatchdogLoop::new(watchdog.clone(), Duration::from_secs(10)).run(stop.clone()),
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        stop.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(watchdog.status().beats, 3);
        assert!(dir.path().join("watchdog.txt").exists());
    }
}
