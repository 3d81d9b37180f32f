//! Cancellable one-shot relock timer.
//!
//! Every arm bumps a generation counter. A fired timer carries the generation
//! it was armed with, and the door controller ignores it unless that
//! generation is still current. Aborting the task is therefore only an
//! optimization: a timer that already woke up and is waiting for the door
//! lock can never relock a door that was re-armed or locked in the meantime.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Generation tag handed to the fire callback.
pub(crate) type Generation = u64;

#[derive(Debug, Default)]
pub(crate) struct RelockTimer {
    generation: Generation,
    handle: Option<JoinHandle<()>>,
}

impl RelockTimer {
    /// Arm the timer, replacing any pending one.
    ///
    /// `on_fire` receives the new generation and returns the future to run
    /// once `after` has elapsed.
    pub(crate) fn arm<F, Fut>(&mut self, after: Duration, on_fire: F)
    where
        F: FnOnce(Generation) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let fire = on_fire(self.generation);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            fire.await;
        }));
    }

    /// Abort the pending timer, if any.
    pub(crate) fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Forget the pending timer without aborting it.
    ///
    /// Used from inside the timer task itself, which must not abort the
    /// future it is running on.
    pub(crate) fn disarm(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.handle = None;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn is_current(&self, generation: Generation) -> bool {
        self.is_armed() && self.generation == generation
    }
}

impl Drop for RelockTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
