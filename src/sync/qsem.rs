//! Counting semaphore built from three AVars.
//!
//! * `quantity` holds the number of available permits. It may start
//!   negative, in which case that many signals are absorbed before any
//!   waiter can proceed.
//! * `queue_wait` is a lock serializing waiters. A waiter that has to block
//!   keeps holding it while parked, so the waiters behind it stay queued on
//!   the lock in arrival order. Parking after releasing the lock instead
//!   would let a signal land between the check and the park, and with two
//!   parked waiters one of them could miss its wakeup.
//! * `head_wait` is the hand-off slot between `signal` and the parked waiter.
//!   A token put there while nobody is parked stays until the next `wait`
//!   claims it.
//!
//! The inspection step of `wait` runs as the acquisition of a bracket, so it
//! cannot be interrupted halfway; if the waiter is killed right after it
//! claimed a permit, the release handler signals the permit back instead of
//! dropping it.

use crate::avar::AVar;
use crate::error::Error;
use crate::task::{Exit, Task};

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Claim {
    Granted,
    Park,
}

/// A fair counting semaphore.
#[derive(Clone)]
pub struct QSem {
    quantity: AVar<i64>,
    queue_wait: AVar<()>,
    head_wait: AVar<()>,
}

/// Same protocol as [`QSem`].
pub type MSem = QSem;

impl fmt::Debug for QSem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QSem")
            .field("quantity", &self.quantity.try_read())
            .field("token_waiting", &self.head_wait.is_filled())
            .finish()
    }
}

impl QSem {
    /// A semaphore with `initial` permits. A negative count must be paid off
    /// with signals before any wait succeeds.
    pub fn new(initial: i64) -> Self {
        Self {
            quantity: AVar::new(initial),
            queue_wait: AVar::new(()),
            head_wait: AVar::empty(),
        }
    }

    /// Acquires a permit, blocking in FIFO order behind earlier waiters.
    pub fn wait<E: From<Error> + 'static>(&self) -> Task<(), E> {
        let head_wait = self.head_wait.clone();
        let claim = self.quantity.modify(move |available| {
            let head_wait = head_wait.clone();
            Task::lazy(move || {
                let claim = if head_wait.try_take().is_some() {
                    (available, Claim::Granted)
                } else if available > 0 {
                    (available - 1, Claim::Granted)
                } else {
                    (available, Claim::Park)
                };
                Ok(claim)
            })
        });

        let sem = self.clone();
        let head_wait = self.head_wait.clone();
        let parked = claim.general_bracket(
            move |exit: Exit<'_, (), E>, claim| match (exit, claim) {
                (Exit::Killed, Claim::Granted) => sem.signal(),
                _ => Task::unit(),
            },
            move |claim| match claim {
                Claim::Granted => Task::unit(),
                Claim::Park => head_wait.take(),
            },
        );

        let lock = self.queue_wait.clone();
        self.queue_wait
            .take()
            .and_then(move |()| parked.finally(lock.put(())))
    }

    /// Returns a permit, waking the longest parked waiter if there is one.
    ///
    /// Once started, a signal always completes, even if its run is cancelled.
    pub fn signal<E: From<Error> + 'static>(&self) -> Task<(), E> {
        let head_wait = self.head_wait.clone();
        self.quantity
            .modify_(move |available| {
                let head_wait = head_wait.clone();
                Task::lazy(move || {
                    Ok(if available < 0 {
                        available + 1
                    } else if head_wait.try_put(()) {
                        available
                    } else {
                        available + 1
                    })
                })
            })
            .uninterruptible()
    }

    /// Runs `task` while holding a permit.
    pub fn with<B: 'static, E: From<Error> + 'static>(&self, task: Task<B, E>) -> Task<B, E> {
        let sem = self.clone();
        self.wait()
            .bracket(move |()| sem.signal(), move |()| task.clone())
    }

    /// Permits available right now, counting a token left in the hand-off
    /// slot.
    pub fn peek_avail<E: From<Error> + 'static>(&self) -> Task<i64, E> {
        let head_wait = self.head_wait.clone();
        self.quantity
            .read()
            .map(move |available| available + i64::from(head_wait.is_filled()))
    }
}
