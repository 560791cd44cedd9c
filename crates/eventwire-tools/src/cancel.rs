//! A small cancellation primitive: one flag plus a `Notify`, shared
//! between the caller of `CancelToolCall` and the in-flight attempt loop.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Default)]
pub struct CancelHandle {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolves immediately if already cancelled; otherwise waits for the
    /// next `cancel()` call. Callers must re-check `is_cancelled()` after
    /// waking since `Notify` does not buffer a signal sent before the
    /// first `notified()` call started.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}
