//! Authorized badge set with remote refresh and local fallback.
//!
//! Lookups read an immutable [`AuthorizedSet`] through an `ArcSwap` and never
//! wait. A refresh fetches the remote list with no lock held, then swaps the
//! new set in with a single store. Failed refreshes never clear the set in
//! memory; the last-known-good copy on disk only replaces it while the
//! process still runs on the empty startup set.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Local};
use latchkey_core::constants::{DEFAULT_MIN_REMOTE_BADGES, DEFAULT_REMOTE_TIMEOUT_SECS};
use latchkey_core::{BadgeUid, FaultKind, FaultRecord, SharedClock, SystemClock};
use latchkey_network::{AnyAuthorizationSource, AuthorizationSource, RemoteError};
use latchkey_storage::FallbackFile;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Where the current set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetSource {
    Remote,
    LocalFallback,
    StartupEmpty,
}

/// Immutable set of normalized badge identifiers.
#[derive(Debug, Clone)]
pub struct AuthorizedSet {
    uids: HashSet<BadgeUid>,
    fetched_at: Option<DateTime<Local>>,
    source: SetSource,
}

impl AuthorizedSet {
    /// Empty set used until the first load.
    pub fn startup_empty() -> Self {
        Self {
            uids: HashSet::new(),
            fetched_at: None,
            source: SetSource::StartupEmpty,
        }
    }

    /// Build a set from raw identifiers, dropping those that fail validation.
    ///
    /// Returns the set and the number of dropped entries.
    pub fn from_entries<I, S>(
        entries: I,
        source: SetSource,
        fetched_at: DateTime<Local>,
    ) -> (Self, usize)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut uids = HashSet::new();
        let mut rejected = 0;
        for entry in entries {
            match BadgeUid::new(entry.as_ref()) {
                Ok(uid) => {
                    uids.insert(uid);
                }
                Err(e) => {
                    debug!(error = %e, "Dropping invalid badge identifier");
                    rejected += 1;
                }
            }
        }
        let set = Self {
            uids,
            fetched_at: Some(fetched_at),
            source,
        };
        (set, rejected)
    }

    pub fn contains(&self, uid: &BadgeUid) -> bool {
        self.uids.contains(uid)
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    pub fn source(&self) -> SetSource {
        self.source
    }

    pub fn fetched_at(&self) -> Option<DateTime<Local>> {
        self.fetched_at
    }

    /// Identifiers in sorted order, as written to the fallback file.
    pub fn sorted_uids(&self) -> Vec<&str> {
        let mut uids: Vec<&str> = self.uids.iter().map(BadgeUid::as_str).collect();
        uids.sort_unstable();
        uids
    }
}

/// What a refresh did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshResult {
    /// The remote list was accepted and swapped in.
    Fresh { count: usize, rejected: usize },
    /// The remote failed and the fallback file replaced the startup set.
    Fallback { count: usize, reason: String },
    /// The remote failed and the current set was kept.
    Retained { reason: String },
}

/// Refresh bookkeeping exposed to the status surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStatus {
    pub last_attempt_at: Option<DateTime<Local>>,
    pub last_success_at: Option<DateTime<Local>>,
    pub last_error: Option<FaultRecord>,
    pub consecutive_failures: u32,
}

/// Point-in-time view of the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationStatus {
    pub source: SetSource,
    pub count: usize,
    pub fetched_at: Option<DateTime<Local>>,
    #[serde(flatten)]
    pub refresh: RefreshStatus,
}

struct CacheInner {
    current: ArcSwap<AuthorizedSet>,
    source: Option<AnyAuthorizationSource>,
    fallback: FallbackFile,
    fetch_timeout: Duration,
    min_remote_badges: usize,
    clock: SharedClock,
    status: Mutex<RefreshStatus>,
    refreshing: tokio::sync::Mutex<()>,
}

/// Shared authorization cache. Cheap to clone.
#[derive(Clone)]
pub struct AuthorizationCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for AuthorizationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.inner.current.load();
        f.debug_struct("AuthorizationCache")
            .field("source", &current.source)
            .field("count", &current.len())
            .field("fallback", &self.inner.fallback.path())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AuthorizationCache`].
#[derive(Debug)]
pub struct AuthorizationCacheBuilder {
    fallback: FallbackFile,
    source: Option<AnyAuthorizationSource>,
    fetch_timeout: Duration,
    min_remote_badges: usize,
    clock: SharedClock,
}

impl AuthorizationCacheBuilder {
    /// Remote list to refresh from. Without one, every refresh fails over.
    pub fn with_source(mut self, source: impl Into<AnyAuthorizationSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Remote answers with fewer valid entries are rejected as malformed.
    pub fn with_min_remote_badges(mut self, min: usize) -> Self {
        self.min_remote_badges = min;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> AuthorizationCache {
        AuthorizationCache {
            inner: Arc::new(CacheInner {
                current: ArcSwap::from_pointee(AuthorizedSet::startup_empty()),
                source: self.source,
                fallback: self.fallback,
                fetch_timeout: self.fetch_timeout,
                min_remote_badges: self.min_remote_badges,
                clock: self.clock,
                status: Mutex::new(RefreshStatus::default()),
                refreshing: tokio::sync::Mutex::new(()),
            }),
        }
    }
}

impl AuthorizationCache {
    pub fn builder(fallback: FallbackFile) -> AuthorizationCacheBuilder {
        AuthorizationCacheBuilder {
            fallback,
            source: None,
            fetch_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            min_remote_badges: DEFAULT_MIN_REMOTE_BADGES,
            clock: Arc::new(SystemClock),
        }
    }

    /// Whether `uid` is in the current set.
    ///
    /// The probe is normalized first. Identifiers that fail validation are
    /// simply not authorized.
    pub fn is_authorized(&self, uid: &str) -> bool {
        BadgeUid::new(uid).is_ok_and(|uid| self.is_authorized_uid(&uid))
    }

    pub fn is_authorized_uid(&self, uid: &BadgeUid) -> bool {
        self.inner.current.load().contains(uid)
    }

    /// The set currently served.
    pub fn current(&self) -> Arc<AuthorizedSet> {
        self.inner.current.load_full()
    }

    pub fn status(&self) -> AuthorizationStatus {
        let current = self.inner.current.load();
        AuthorizationStatus {
            source: current.source,
            count: current.len(),
            fetched_at: current.fetched_at,
            refresh: self.inner.status.lock().clone(),
        }
    }

    /// Load the fallback file if nothing has been loaded yet.
    ///
    /// Returns the file's modification time so the caller can schedule the
    /// first remote refresh from its age. Read failures are logged and treated
    /// as a missing file.
    pub fn warm_start(&self) -> Option<DateTime<Local>> {
        if self.inner.current.load().source != SetSource::StartupEmpty {
            return None;
        }
        match self.load_fallback() {
            Ok(Some((count, modified_at))) => {
                info!(count, %modified_at, "Authorized badges loaded from fallback file");
                Some(modified_at)
            }
            Ok(None) => {
                info!(
                    path = %self.inner.fallback.path().display(),
                    "No fallback badge list yet"
                );
                None
            }
            Err(message) => {
                warn!(error = %message, "Fallback badge list unreadable");
                None
            }
        }
    }

    /// Fetch the remote list and swap it in.
    ///
    /// Remote failures are absorbed and reported through the returned
    /// [`RefreshResult`] and [`status`](Self::status).
    ///
    /// # Errors
    ///
    /// Returns an error only when a fetched list could not be persisted to
    /// the fallback file. The new set is already being served in that case.
    pub async fn refresh(&self) -> Result<RefreshResult> {
        let _guard = self.inner.refreshing.lock().await;
        let attempt_at = self.inner.clock.now();
        self.inner.status.lock().last_attempt_at = Some(attempt_at);

        let fetched = match self.fetch().await {
            Ok(entries) => self.accept(entries),
            Err(e) => Err(e),
        };

        match fetched {
            Ok((set, rejected)) => {
                let count = set.len();
                let uids: Vec<String> = set.sorted_uids().into_iter().map(str::to_string).collect();
                self.inner.current.store(Arc::new(set));
                {
                    let mut status = self.inner.status.lock();
                    status.last_success_at = Some(attempt_at);
                    status.consecutive_failures = 0;
                }
                info!(count, rejected, "Authorized badges refreshed from remote");

                self.inner.fallback.store(&uids)?;
                Ok(RefreshResult::Fresh { count, rejected })
            }
            Err(e) => Ok(self.fail_over(attempt_at, e)),
        }
    }

    async fn fetch(&self) -> std::result::Result<Vec<String>, RemoteError> {
        let Some(source) = &self.inner.source else {
            return Err(RemoteError::unavailable("no remote source configured"));
        };
        let timeout = self.inner.fetch_timeout;
        match tokio::time::timeout(timeout, source.fetch_authorized()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::timeout(timeout)),
        }
    }

    fn accept(
        &self,
        entries: Vec<String>,
    ) -> std::result::Result<(AuthorizedSet, usize), RemoteError> {
        let (set, rejected) =
            AuthorizedSet::from_entries(entries, SetSource::Remote, self.inner.clock.now());
        if set.len() < self.inner.min_remote_badges {
            return Err(RemoteError::malformed(format!(
                "expected at least {} badges, got {}",
                self.inner.min_remote_badges,
                set.len()
            )));
        }
        Ok((set, rejected))
    }

    fn fail_over(&self, at: DateTime<Local>, e: RemoteError) -> RefreshResult {
        let reason = e.to_string();
        {
            let mut status = self.inner.status.lock();
            status.last_error = Some(FaultRecord::new(at, FaultKind::RemoteUnavailable, &reason));
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        }
        warn!(error = %reason, "Badge refresh failed");

        if self.inner.current.load().source != SetSource::StartupEmpty {
            return RefreshResult::Retained { reason };
        }

        match self.load_fallback() {
            Ok(Some((count, _))) => {
                info!(count, "Serving fallback badge list");
                RefreshResult::Fallback { count, reason }
            }
            Ok(None) => RefreshResult::Retained { reason },
            Err(message) => {
                warn!(error = %message, "Fallback badge list unreadable");
                RefreshResult::Retained { reason }
            }
        }
    }

    fn load_fallback(&self) -> std::result::Result<Option<(usize, DateTime<Local>)>, String> {
        let snapshot = self.inner.fallback.load().map_err(|e| e.to_string())?;
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };

        let (set, rejected) = AuthorizedSet::from_entries(
            snapshot.entries,
            SetSource::LocalFallback,
            snapshot.modified_at,
        );
        if rejected > 0 {
            warn!(rejected, "Fallback badge list has invalid entries");
        }
        let count = set.len();
        self.inner.current.store(Arc::new(set));
        Ok(Some((count, snapshot.modified_at)))
    }
}

/// Refresh requested again before the cooldown elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Refresh already requested; retry in {}s", .retry_after.as_secs())]
pub struct RefreshRejected {
    pub retry_after: Duration,
}

/// Rate-limited request for an out-of-schedule refresh.
///
/// The refresh loop waits on [`requested`](Self::requested); observers call
/// [`request`](Self::request).
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    inner: Arc<TriggerInner>,
}

#[derive(Debug)]
struct TriggerInner {
    notify: Notify,
    cooldown: Duration,
    last: Mutex<Option<Instant>>,
}

impl RefreshTrigger {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            inner: Arc::new(TriggerInner {
                notify: Notify::new(),
                cooldown,
                last: Mutex::new(None),
            }),
        }
    }

    /// Ask for a refresh now.
    ///
    /// # Errors
    ///
    /// Rejected when the previous accepted request is younger than the
    /// cooldown.
    pub fn request(&self) -> std::result::Result<(), RefreshRejected> {
        let now = Instant::now();
        let mut last = self.inner.last.lock();
        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.inner.cooldown {
                return Err(RefreshRejected {
                    retry_after: self.inner.cooldown - elapsed,
                });
            }
        }
        *last = Some(now);
        drop(last);

        info!("Badge refresh requested");
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Resolve once a request was accepted.
    pub async fn requested(&self) {
        self.inner.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_network::mock::{MockAuthorizationSource, MockAuthorizationSourceHandle};
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> (AuthorizationCache, MockAuthorizationSourceHandle) {
        let (source, handle) = MockAuthorizationSource::new();
        let cache = AuthorizationCache::builder(FallbackFile::new(dir.path().join("badges.txt")))
            .with_source(source)
            .with_fetch_timeout(Duration::from_secs(10))
            .build();
        (cache, handle)
    }

    #[tokio::test]
    async fn test_starts_empty_and_denies() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache(&dir);

        assert_eq!(cache.current().source(), SetSource::StartupEmpty);
        assert!(!cache.is_authorized("04a1b2c3"));
    }

    #[tokio::test]
    async fn test_refresh_swaps_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, remote) = cache(&dir);
        remote.set_badges(["04A1B2C3", " deadbeef ", "bad uid"]);

        let result = cache.refresh().await.unwrap();
        assert_eq!(result, RefreshResult::Fresh { count: 2, rejected: 1 });
        assert!(cache.is_authorized("04a1b2c3"));
        assert!(cache.is_authorized("04A1B2C3"));
        assert!(cache.is_authorized("DEADBEEF"));
        assert_eq!(cache.current().source(), SetSource::Remote);

        let saved = std::fs::read_to_string(dir.path().join("badges.txt")).unwrap();
        assert_eq!(saved, "04a1b2c3\ndeadbeef\n");

        let status = cache.status();
        assert_eq!(status.count, 2);
        assert!(status.refresh.last_success_at.is_some());
        assert_eq!(status.refresh.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_garbled_probes_are_denied() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, remote) = cache(&dir);
        remote.set_badges(["04a1b2c3"]);
        cache.refresh().await.unwrap();

        assert!(!cache.is_authorized(""));
        assert!(!cache.is_authorized("   "));
        assert!(!cache.is_authorized("04a1 b2c3"));
        assert!(!cache.is_authorized("04a1b2c"));
    }

    #[tokio::test]
    async fn test_failure_keeps_remote_set() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, remote) = cache(&dir);
        remote.set_badges(["04a1b2c3"]);
        cache.refresh().await.unwrap();

        remote.fail("503 Service Unavailable");
        let result = cache.refresh().await.unwrap();

        assert!(matches!(result, RefreshResult::Retained { .. }));
        assert!(cache.is_authorized("04a1b2c3"));
        assert_eq!(cache.current().source(), SetSource::Remote);
        let status = cache.status();
        assert_eq!(status.refresh.consecutive_failures, 1);
        assert_eq!(
            status.refresh.last_error.unwrap().kind,
            FaultKind::RemoteUnavailable
        );
    }

    #[tokio::test]
    async fn test_failure_at_startup_loads_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("badges.txt"), "# saved\nCAFEBABE\n").unwrap();
        let (cache, remote) = cache(&dir);
        remote.fail("connection refused");

        let result = cache.refresh().await.unwrap();
        assert!(matches!(result, RefreshResult::Fallback { count: 1, .. }));
        assert!(cache.is_authorized("cafebabe"));
        assert_eq!(cache.current().source(), SetSource::LocalFallback);
    }

    #[tokio::test]
    async fn test_failure_without_fallback_stays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, remote) = cache(&dir);
        remote.fail("connection refused");

        let result = cache.refresh().await.unwrap();
        assert!(matches!(result, RefreshResult::Retained { .. }));
        assert_eq!(cache.current().source(), SetSource::StartupEmpty);
    }

    #[tokio::test]
    async fn test_short_remote_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (source, remote) = MockAuthorizationSource::new();
        let cache = AuthorizationCache::builder(FallbackFile::new(dir.path().join("badges.txt")))
            .with_source(source)
            .with_min_remote_badges(3)
            .build();
        remote.set_badges(["a1", "b2"]);

        let result = cache.refresh().await.unwrap();
        match result {
            RefreshResult::Retained { reason } => assert!(reason.contains("at least 3")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!dir.path().join("badges.txt").exists());
    }

    #[tokio::test]
    async fn test_empty_remote_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, remote) = cache(&dir);
        remote.set_badges(["04a1b2c3"]);
        cache.refresh().await.unwrap();

        remote.set_badges(Vec::<String>::new());
        cache.refresh().await.unwrap();
        assert!(cache.is_authorized("04a1b2c3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_remote_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, remote) = cache(&dir);
        remote.set_badges(["04a1b2c3"]);
        remote.set_delay(Some(Duration::from_secs(60)));

        let result = cache.refresh().await.unwrap();
        match result {
            RefreshResult::Retained { reason } => assert!(reason.contains("timed out")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_source_fails_over() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("badges.txt"), "04a1b2c3\n").unwrap();
        let cache = AuthorizationCache::builder(FallbackFile::new(dir.path().join("badges.txt")))
            .build();

        let result = cache.refresh().await.unwrap();
        assert!(matches!(result, RefreshResult::Fallback { count: 1, .. }));
    }

    #[tokio::test]
    async fn test_persist_failure_is_fatal_but_set_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let (source, remote) = MockAuthorizationSource::new();
        let cache = AuthorizationCache::builder(FallbackFile::new(blocker.join("badges.txt")))
            .with_source(source)
            .build();
        remote.set_badges(["04a1b2c3"]);

        let err = cache.refresh().await.unwrap_err();
        assert!(err.is_local_storage());
        assert!(cache.is_authorized("04a1b2c3"));
    }

    #[tokio::test]
    async fn test_warm_start_reports_fallback_age() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache(&dir);
        assert!(cache.warm_start().is_none());

        std::fs::write(dir.path().join("badges.txt"), "04a1b2c3\n").unwrap();
        assert!(cache.warm_start().is_some());
        assert_eq!(cache.current().source(), SetSource::LocalFallback);
        assert!(cache.is_authorized("04a1b2c3"));

        // Only the startup set is replaced.
        assert!(cache.warm_start().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_is_rate_limited() {
        let trigger = RefreshTrigger::new(Duration::from_secs(300));

        trigger.request().unwrap();
        trigger.requested().await;

        tokio::time::advance(Duration::from_secs(100)).await;
        let rejected = trigger.request().unwrap_err();
        assert_eq!(rejected.retry_after, Duration::from_secs(200));

        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(trigger.request().is_ok());
    }
}
