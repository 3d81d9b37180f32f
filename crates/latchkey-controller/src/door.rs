//! Door state machine and sole commander of the lock relay.
//!
//! # States
//!
//! - `LOCKED` with cause `STARTUP`, `MANUAL_LOCK` or `AUTO_RELOCK`
//! - `UNLOCKED` with cause `BADGE` or `MANUAL_UNLOCK`, optionally with an
//!   armed relock deadline
//!
//! # Transitions
//!
//! - `request_unlock(cause, duration)`: any state → `UNLOCKED`. A non-zero
//!   duration arms the relock timer, replacing any pending one.
//! - `request_lock()`: any state → `LOCKED` with `MANUAL_LOCK`. Cancels the
//!   timer.
//! - timer fired: `UNLOCKED` (timer armed) → `LOCKED` with `AUTO_RELOCK`.
//!   No-op in every other state.
//!
//! Transitions are serialized by one async mutex, and the relay is driven
//! while it is held, so drive order always equals transition order. The relay
//! is only driven when the requested level differs from the last level that
//! was driven successfully. A drive that does not finish within the drive
//! timeout counts as failed.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use latchkey_controller::DoorController;
//! use latchkey_core::{DoorCause, LockState};
//! use latchkey_hardware::mock::MockRelay;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (relay, handle) = MockRelay::new();
//! let door = DoorController::builder(relay.into()).build().await;
//!
//! let state = door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
//! assert_eq!(state.lock_state, LockState::Unlocked);
//! assert!(handle.is_energized());
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Local};
use latchkey_core::constants::{RELAY_DRIVE_TIMEOUT_MS, RELAY_SUBJECT};
use latchkey_core::{
    AccessEvent, DoorCause, DoorState, LockState, SharedClock, StartupRelayPolicy, SystemClock,
};
use latchkey_hardware::{AnyRelay, HardwareError, Relay};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::timer::{Generation, RelockTimer};

/// Maximum number of transitions kept in history.
const MAX_HISTORY_SIZE: usize = 100;

/// Receiver of events the door produces on its own (relay faults).
///
/// Called after the door lock is released, so implementations may block
/// briefly but must not call back into the door.
pub trait EventSink: Send + Sync + fmt::Debug {
    fn emit(&self, event: AccessEvent);
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoorTransition {
    pub at: DateTime<Local>,
    pub from: LockState,
    pub to: LockState,
    pub cause: DoorCause,
    /// Whether this transition issued a relay drive (successful or not).
    pub relay_driven: bool,
}

enum DriveOutcome {
    /// Relay was already at the requested level.
    Unchanged,
    Driven,
    Failed(HardwareError),
}

impl DriveOutcome {
    fn attempted(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    fn in_sync(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

struct DoorMachine {
    state: DoorState,
    relay: AnyRelay,
    /// Last level driven successfully. `None` when unknown.
    driven: Option<bool>,
    drive_timeout: Duration,
    timer: RelockTimer,
    history: VecDeque<DoorTransition>,
}

impl DoorMachine {
    async fn drive(&mut self, target: LockState) -> DriveOutcome {
        let level = target.relay_energized();
        if self.driven == Some(level) {
            return DriveOutcome::Unchanged;
        }

        // Unknown until the drive completes, so a cancelled drive is retried.
        self.driven = None;
        match tokio::time::timeout(self.drive_timeout, self.relay.set_energized(level)).await {
            Ok(Ok(())) => {
                self.driven = Some(level);
                DriveOutcome::Driven
            }
            Ok(Err(e)) => DriveOutcome::Failed(e),
            Err(_) => DriveOutcome::Failed(HardwareError::relay_drive(format!(
                "timed out after {}ms",
                self.drive_timeout.as_millis()
            ))),
        }
    }

    fn record(&mut self, transition: DoorTransition) {
        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition);
    }
}

struct DoorInner {
    machine: Mutex<DoorMachine>,
    state_tx: watch::Sender<DoorState>,
    clock: SharedClock,
    events: Option<Arc<dyn EventSink>>,
}

/// Handle on the door state machine. Cheap to clone.
#[derive(Clone)]
pub struct DoorController {
    inner: Arc<DoorInner>,
}

impl fmt::Debug for DoorController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoorController")
            .field("state", &*self.inner.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

/// Builder for [`DoorController`].
#[derive(Debug)]
pub struct DoorControllerBuilder {
    relay: AnyRelay,
    clock: SharedClock,
    policy: StartupRelayPolicy,
    drive_timeout: Duration,
    events: Option<Arc<dyn EventSink>>,
}

impl DoorControllerBuilder {
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_startup_policy(mut self, policy: StartupRelayPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_drive_timeout(mut self, timeout: Duration) -> Self {
        self.drive_timeout = timeout;
        self
    }

    /// Where relay fault events go.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the controller in `LOCKED`/`STARTUP` and apply the startup policy.
    pub async fn build(self) -> DoorController {
        let mut state = DoorState::startup();
        let mut machine = DoorMachine {
            state: state.clone(),
            relay: self.relay,
            driven: None,
            drive_timeout: self.drive_timeout,
            timer: RelockTimer::default(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        };

        let mut fault = None;
        match self.policy {
            StartupRelayPolicy::ForceLocked => match machine.drive(LockState::Locked).await {
                DriveOutcome::Failed(e) => {
                    state.relay_in_sync = false;
                    fault = Some(e);
                }
                _ => debug!("Relay forced to locked at startup"),
            },
            StartupRelayPolicy::LeaveAsIs => {
                state.relay_in_sync = false;
                debug!("Relay left untouched at startup");
            }
        }
        machine.state = state.clone();

        let (state_tx, _) = watch::channel(state);
        let door = DoorController {
            inner: Arc::new(DoorInner {
                machine: Mutex::new(machine),
                state_tx,
                clock: self.clock,
                events: self.events,
            }),
        };

        if let Some(e) = fault {
            door.report_drive_failure(e, door.inner.clock.now());
        }
        door
    }
}

impl DoorController {
    pub fn builder(relay: AnyRelay) -> DoorControllerBuilder {
        DoorControllerBuilder {
            relay,
            clock: Arc::new(SystemClock),
            policy: StartupRelayPolicy::default(),
            drive_timeout: Duration::from_millis(RELAY_DRIVE_TIMEOUT_MS),
            events: None,
        }
    }

    /// Latest committed state. Never waits on a transition in progress.
    pub fn current_state(&self) -> DoorState {
        self.inner.state_tx.borrow().clone()
    }

    /// Watch every committed state.
    pub fn subscribe(&self) -> watch::Receiver<DoorState> {
        self.inner.state_tx.subscribe()
    }

    /// Recorded transitions, oldest first.
    pub async fn history(&self) -> Vec<DoorTransition> {
        self.inner.machine.lock().await.history.iter().cloned().collect()
    }

    /// Unlock the door.
    ///
    /// A non-zero `duration` arms the relock timer for `now + duration`,
    /// cancelling any pending one. A zero duration holds the door open with no
    /// timer. Relay failures do not fail the call: the returned state has
    /// `relay_in_sync == false` and a system error event is emitted.
    pub async fn request_unlock(&self, cause: DoorCause, duration: Duration) -> DoorState {
        let mut machine = self.inner.machine.lock().await;
        let now = self.inner.clock.now();
        let drive = machine.drive(LockState::Unlocked).await;

        let unlocked_at = if machine.state.is_unlocked() {
            machine.state.unlocked_at.or(Some(now))
        } else {
            Some(now)
        };

        let auto_relock_at = if duration.is_zero() {
            machine.timer.cancel();
            None
        } else {
            let weak = Arc::downgrade(&self.inner);
            machine
                .timer
                .arm(duration, move |generation| fire_relock(weak, generation));
            relock_deadline(now, duration)
        };

        let next = DoorState {
            lock_state: LockState::Unlocked,
            cause,
            unlocked_at,
            auto_relock_at,
            relay_in_sync: drive.in_sync(),
        };
        let state = self.commit(&mut machine, next, &drive, now);
        drop(machine);

        info!(
            cause = %cause,
            duration_secs = duration.as_secs(),
            "Door unlocked"
        );
        if let DriveOutcome::Failed(e) = drive {
            self.report_drive_failure(e, now);
        }
        state
    }

    /// Lock the door with cause `MANUAL_LOCK` and cancel any pending relock.
    /// Idempotent.
    pub async fn request_lock(&self) -> DoorState {
        let mut machine = self.inner.machine.lock().await;
        machine.timer.cancel();
        let (state, drive, now) = self.relock(&mut machine, DoorCause::ManualLock).await;
        drop(machine);

        info!("Door locked");
        if let DriveOutcome::Failed(e) = drive {
            self.report_drive_failure(e, now);
        }
        state
    }

    /// Relock if the door is unlocked with an armed timer; otherwise no-op.
    ///
    /// The timer calls this on its own; calling it directly behaves as if the
    /// pending timer fired now.
    pub async fn on_timer_expired(&self) -> DoorState {
        self.expire(None).await
    }

    async fn expire(&self, generation: Option<Generation>) -> DoorState {
        let mut machine = self.inner.machine.lock().await;
        let armed = match generation {
            Some(generation) => machine.timer.is_current(generation),
            None => machine.timer.is_armed(),
        };
        if !armed || !machine.state.is_unlocked() {
            debug!(?generation, "Stale relock timer ignored");
            return machine.state.clone();
        }

        match generation {
            Some(_) => machine.timer.disarm(),
            None => machine.timer.cancel(),
        }
        let (state, drive, now) = self.relock(&mut machine, DoorCause::AutoRelock).await;
        drop(machine);

        info!("Door auto-relocked");
        if let DriveOutcome::Failed(e) = drive {
            self.report_drive_failure(e, now);
        }
        state
    }

    async fn relock(
        &self,
        machine: &mut DoorMachine,
        cause: DoorCause,
    ) -> (DoorState, DriveOutcome, DateTime<Local>) {
        let now = self.inner.clock.now();
        let drive = machine.drive(LockState::Locked).await;
        let next = DoorState {
            lock_state: LockState::Locked,
            cause,
            unlocked_at: None,
            auto_relock_at: None,
            relay_in_sync: drive.in_sync(),
        };
        let state = self.commit(machine, next, &drive, now);
        (state, drive, now)
    }

    fn commit(
        &self,
        machine: &mut DoorMachine,
        next: DoorState,
        drive: &DriveOutcome,
        at: DateTime<Local>,
    ) -> DoorState {
        machine.record(DoorTransition {
            at,
            from: machine.state.lock_state,
            to: next.lock_state,
            cause: next.cause,
            relay_driven: drive.attempted(),
        });
        machine.state = next.clone();
        self.inner.state_tx.send_replace(next.clone());
        next
    }

    fn report_drive_failure(&self, e: HardwareError, at: DateTime<Local>) {
        error!(error = %e, "Relay drive failed; physical lock state may diverge");
        match &self.inner.events {
            Some(events) => events.emit(AccessEvent::system_error(at, RELAY_SUBJECT, &e)),
            None => warn!("No event sink attached; relay fault not recorded"),
        }
    }
}

async fn fire_relock(door: Weak<DoorInner>, generation: Generation) {
    if let Some(inner) = door.upgrade() {
        DoorController { inner }.expire(Some(generation)).await;
    }
}

fn relock_deadline(now: DateTime<Local>, duration: Duration) -> Option<DateTime<Local>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use latchkey_core::{EventType, ManualClock};
    use latchkey_hardware::mock::{MockRelay, MockRelayHandle};

    #[derive(Debug, Default)]
    struct CollectingSink {
        events: parking_lot::Mutex<Vec<AccessEvent>>,
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: AccessEvent) {
            self.events.lock().push(event);
        }
    }

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
    }

    async fn door() -> (DoorController, MockRelayHandle, ManualClock, Arc<CollectingSink>) {
        let (relay, handle) = MockRelay::new();
        let clock = ManualClock::new(start());
        let sink = Arc::new(CollectingSink::default());
        let door = DoorController::builder(relay.into())
            .with_clock(Arc::new(clock.clone()))
            .with_event_sink(sink.clone())
            .build()
            .await;
        (door, handle, clock, sink)
    }

    /// Let spawned timer tasks run after the paused clock moved.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_locked_and_forces_relay() {
        let (door, relay, _clock, _) = door().await;

        let state = door.current_state();
        assert_eq!(state.lock_state, LockState::Locked);
        assert_eq!(state.cause, DoorCause::Startup);
        assert!(state.relay_in_sync);
        assert_eq!(relay.drives(), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_as_is_skips_startup_drive() {
        let (relay, handle) = MockRelay::new();
        let door = DoorController::builder(relay.into())
            .with_startup_policy(StartupRelayPolicy::LeaveAsIs)
            .build()
            .await;

        assert!(!door.current_state().relay_in_sync);
        assert_eq!(handle.drive_count(), 0);

        let state = door.request_lock().await;
        assert!(state.relay_in_sync);
        assert_eq!(handle.drives(), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_badge_unlock_then_auto_relock() {
        let (door, relay, clock, sink) = door().await;

        let state = door
            .request_unlock(DoorCause::Badge, Duration::from_secs(5))
            .await;
        assert_eq!(state.lock_state, LockState::Unlocked);
        assert_eq!(state.cause, DoorCause::Badge);
        assert_eq!(state.unlocked_at, Some(start()));
        assert_eq!(state.auto_relock_at, Some(start() + chrono::Duration::seconds(5)));
        assert_eq!(relay.drives(), vec![false, true]);

        clock.advance(chrono::Duration::seconds(5));
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;

        let state = door.current_state();
        assert_eq!(state.lock_state, LockState::Locked);
        assert_eq!(state.cause, DoorCause::AutoRelock);
        assert_eq!(state.unlocked_at, None);
        assert_eq!(state.auto_relock_at, None);
        assert_eq!(relay.drives(), vec![false, true, false]);
        assert!(sink.events.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_lock_cancels_timer() {
        let (door, relay, _clock, _) = door().await;

        door.request_unlock(DoorCause::ManualUnlock, Duration::from_secs(3600))
            .await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let state = door.request_lock().await;
        assert_eq!(state.cause, DoorCause::ManualLock);
        assert_eq!(state.auto_relock_at, None);

        tokio::time::advance(Duration::from_secs(3600)).await;
        settle().await;

        assert_eq!(door.current_state().cause, DoorCause::ManualLock);
        assert_eq!(relay.drives(), vec![false, true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_requests_do_not_toggle_relay() {
        let (door, relay, _clock, _) = door().await;

        door.request_lock().await;
        door.request_lock().await;
        door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
        door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;

        assert_eq!(relay.drives(), vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reunlock_extends_deadline() {
        let (door, relay, clock, _) = door().await;

        door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
        clock.advance(chrono::Duration::seconds(3));
        tokio::time::advance(Duration::from_secs(3)).await;

        let state = door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
        assert_eq!(state.unlocked_at, Some(start()));
        assert_eq!(state.auto_relock_at, Some(start() + chrono::Duration::seconds(8)));

        // The first timer would have fired here.
        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert!(door.current_state().is_unlocked());

        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert!(!door.current_state().is_unlocked());
        assert_eq!(relay.drives(), vec![false, true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_holds_open() {
        let (door, _relay, _clock, _) = door().await;

        door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
        let state = door.request_unlock(DoorCause::ManualUnlock, Duration::ZERO).await;
        assert_eq!(state.auto_relock_at, None);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert!(door.current_state().is_unlocked());

        // Nothing armed, so expiry is a no-op.
        let state = door.on_timer_expired().await;
        assert!(state.is_unlocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_timer_expired_when_locked_is_noop() {
        let (door, relay, _clock, _) = door().await;

        let state = door.on_timer_expired().await;
        assert_eq!(state.cause, DoorCause::Startup);
        assert_eq!(relay.drive_count(), 1);
        assert!(door.history().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_expiry_relocks_and_cancels_timer() {
        let (door, relay, _clock, _) = door().await;

        door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
        let state = door.on_timer_expired().await;
        assert_eq!(state.cause, DoorCause::AutoRelock);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(relay.drives(), vec![false, true, false]);
        assert_eq!(door.history().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_failure_marks_out_of_sync_and_emits_event() {
        let (door, relay, _clock, sink) = door().await;
        relay.fail_next(1);

        let state = door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
        assert_eq!(state.lock_state, LockState::Unlocked);
        assert!(!state.relay_in_sync);
        assert!(!relay.is_energized());

        let events = sink.events.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::SystemError);
        assert_eq!(events[0].subject_id, RELAY_SUBJECT);

        // The next request for the same level retries the drive.
        let state = door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
        assert!(state.relay_in_sync);
        assert!(relay.is_energized());
        assert_eq!(relay.drives(), vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_drive_failure_is_reported() {
        let (relay, handle) = MockRelay::new();
        handle.fail_next(1);
        let sink = Arc::new(CollectingSink::default());
        let door = DoorController::builder(relay.into())
            .with_event_sink(sink.clone())
            .build()
            .await;

        assert!(!door.current_state().relay_in_sync);
        assert_eq!(sink.events.lock().len(), 1);

        door.request_lock().await;
        assert!(door.current_state().relay_in_sync);
        assert_eq!(handle.drives(), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_sees_transitions() {
        let (door, _relay, _clock, _) = door().await;
        let mut rx = door.subscribe();

        door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_unlocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded() {
        let (door, _relay, _clock, _) = door().await;

        for _ in 0..(MAX_HISTORY_SIZE + 10) {
            door.request_unlock(DoorCause::Badge, Duration::ZERO).await;
            door.request_lock().await;
        }

        let history = door.history().await;
        assert_eq!(history.len(), MAX_HISTORY_SIZE);
        assert_eq!(history.last().unwrap().to, LockState::Locked);
        assert!(history.iter().all(|t| t.relay_driven));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_relay_times_out_as_drive_failure() {
        let (door, relay, _clock, sink) = door().await;
        relay.set_delay(Some(Duration::from_secs(60)));

        let started = tokio::time::Instant::now();
        let state = door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(state.is_unlocked());
        assert!(!state.relay_in_sync);

        let events = sink.events.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject_id, RELAY_SUBJECT);
        assert!(events[0].raw_message.contains("timed out after 2000ms"));

        // Status reads are not held up by the stalled drive.
        assert!(door.current_state().is_unlocked());

        relay.set_delay(None);
        let state = door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;
        assert!(state.relay_in_sync);
        assert_eq!(relay.drives(), vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_lock_racing_auto_relock_drives_once() {
        let (door, relay, _clock, _) = door().await;
        door.request_unlock(DoorCause::Badge, Duration::from_secs(5)).await;

        // Slow drives keep the door lock held while the other side waits on it.
        relay.set_delay(Some(Duration::from_millis(500)));
        let locker = tokio::spawn({
            let door = door.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                door.request_lock().await
            }
        });

        let state = locker.await.unwrap();
        assert_eq!(state.lock_state, LockState::Locked);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;

        let state = door.current_state();
        assert_eq!(state.lock_state, LockState::Locked);
        assert_eq!(state.auto_relock_at, None);
        assert!(state.relay_in_sync);
        assert_eq!(relay.drives(), vec![false, true, false]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_callers_drive_only_effective_transitions() {
        let (door, relay, _clock, _) = door().await;

        // Zero durations keep timers out so every transition stays in history.
        let mut callers = tokio::task::JoinSet::new();
        for caller in 0..2u64 {
            let door = door.clone();
            callers.spawn(async move {
                for i in 0..48u64 {
                    match (i + caller) % 3 {
                        0 => {
                            door.request_unlock(DoorCause::Badge, Duration::ZERO).await;
                        }
                        1 => {
                            door.request_unlock(DoorCause::ManualUnlock, Duration::ZERO)
                                .await;
                        }
                        _ => {
                            door.request_lock().await;
                        }
                    }
                    tokio::task::yield_now().await;
                }
            });
        }
        while let Some(joined) = callers.join_next().await {
            joined.unwrap();
        }

        let state = door.request_lock().await;
        assert_eq!(state.lock_state, LockState::Locked);
        assert!(state.relay_in_sync);

        let history = door.history().await;
        assert_eq!(history.len(), 97);
        let effective = history.iter().filter(|t| t.from != t.to).count();
        assert!(history.iter().all(|t| t.relay_driven == (t.from != t.to)));

        let drives = relay.drives();
        assert_eq!(drives.len(), effective + 1);
        assert!(drives.windows(2).all(|pair| pair[0] != pair[1]));
        assert_eq!(drives.last(), Some(&false));
    }
}
