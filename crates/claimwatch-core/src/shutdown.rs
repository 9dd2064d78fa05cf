//! Cooperative stop signal shared between the run loop and whoever wants
//! it to end (a signal handler, a test).
//!
//! The flag is checked between record writes and before each cycle; the
//! [`Notify`] cuts the inter-cycle sleep short.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Shared stop request.
#[derive(Debug, Default)]
pub struct Shutdown {
    /// Whether a stop has been requested.
    requested: AtomicBool,

    /// Wakes sleepers when a stop is requested.
    notify: Notify,
}

impl Shutdown {
    /// Create a signal that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop and wake any sleeper.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless a stop is requested first. Returns `true`
    /// when woken by a stop request.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_requested() {
            return true;
        }

        tokio::select! {
            () = tokio::time::sleep(duration) => self.is_requested(),
            () = notified => true,
        }
    }
}
