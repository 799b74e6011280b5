//! Cooperative cancellation shared between a supervisor and its workers.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cloneable flag that wakes every waiter once it is cancelled.
///
/// All clones observe the same state. Cancellation is permanent: a token
/// never returns to the uncancelled state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and wakes all waiters.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|poison| poison.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Sleeps for up to `timeout`, returning early on cancellation.
    ///
    /// Returns `true` when the token was cancelled before or during the wait.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|poison| poison.into_inner());
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = match cvar.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poison) => poison.into_inner().0,
            };
        }
        true
    }

    /// Blocks until the token is cancelled.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|poison| poison.into_inner());
        while !*cancelled {
            cancelled = cvar
                .wait(cancelled)
                .unwrap_or_else(|poison| poison.into_inner());
        }
    }
}
