use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RemoteError, Result};
use crate::traits::AuthorizationSource;

#[derive(Debug, Clone)]
enum Reply {
    Badges(Vec<String>),
    Fail(String),
}

#[derive(Debug)]
struct SourceState {
    reply: Reply,
    delay: Option<Duration>,
    calls: usize,
}

/// Mock authorization source.
///
/// # Examples
///
/// ```
/// use latchkey_network::mock::MockAuthorizationSource;
/// use latchkey_network::AuthorizationSource;
///
/// #[tokio::main]
/// async fn main() {
///     let (source, handle) = MockAuthorizationSource::new();
///     handle.set_badges(["04a1b2c3", "deadbeef"]);
///
///     let badges = source.fetch_authorized().await.unwrap();
///     assert_eq!(badges.len(), 2);
///
///     handle.fail("503 Service Unavailable");
///     assert!(source.fetch_authorized().await.is_err());
/// }
/// ```
#[derive(Debug)]
pub struct MockAuthorizationSource {
    state: Arc<Mutex<SourceState>>,
}

impl MockAuthorizationSource {
    /// Create a source that answers with an empty list until scripted.
    pub fn new() -> (Self, MockAuthorizationSourceHandle) {
        let state = Arc::new(Mutex::new(SourceState {
            reply: Reply::Badges(Vec::new()),
            delay: None,
            calls: 0,
        }));
        let handle = MockAuthorizationSourceHandle {
            state: Arc::clone(&state),
        };
        (Self { state }, handle)
    }
}

impl AuthorizationSource for MockAuthorizationSource {
    async fn fetch_authorized(&self) -> Result<Vec<String>> {
        let (reply, delay) = {
            let mut state = self.state.lock();
            state.calls += 1;
            (state.reply.clone(), state.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Reply::Badges(badges) => Ok(badges),
            Reply::Fail(message) => Err(RemoteError::unavailable(message)),
        }
    }
}

/// Handle for scripting a [`MockAuthorizationSource`].
#[derive(Debug, Clone)]
pub struct MockAuthorizationSourceHandle {
    state: Arc<Mutex<SourceState>>,
}

impl MockAuthorizationSourceHandle {
    /// Answer subsequent fetches with `badges`.
    pub fn set_badges<I, S>(&self, badges: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().reply = Reply::Badges(badges.into_iter().map(Into::into).collect());
    }

    /// Fail subsequent fetches.
    pub fn fail(&self, message: impl Into<String>) {
        self.state.lock().reply = Reply::Fail(message.into());
    }

    /// Delay every fetch by `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }
}
