//! Waker for the main future of [`Runtime::block_on`](crate::Runtime::block_on).
//!
//! Tasks never need a waker: their continuations are plain callbacks pushed
//! onto the scheduler queue. Only the future passed to `block_on` is polled,
//! and waking it just raises a flag the event loop checks between turns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Wake, Waker};

/// Notification flag shared between the event loop and the main future's waker.
#[derive(Debug, Default)]
pub(crate) struct Notify {
    notified: AtomicBool,
}

impl Notify {
    /// Creates a flag that starts out raised, so the main future gets its
    /// first poll.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            notified: AtomicBool::new(true),
        })
    }

    /// Lowers the flag, returning whether it was raised.
    pub(crate) fn take(&self) -> bool {
        self.notified.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn is_notified(&self) -> bool {
        self.notified.load(Ordering::Acquire)
    }
}

impl Wake for Notify {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notified.store(true, Ordering::Release);
    }
}

/// Creates a waker that raises `notify` when woken.
pub(crate) fn make_waker(notify: &Arc<Notify>) -> Waker {
    Waker::from(notify.clone())
}
