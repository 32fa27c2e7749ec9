//! Timer driver backing [`Task::delay`](crate::Task::delay).
//!
//! Timers are registered once with their deadline and a job. The runtime's main
//! loop calls [`process_timers`] each tick; expired jobs are moved onto the
//! scheduler queue rather than run inline, so a timer job may itself register
//! or cancel timers.

use crate::runtime::queue::{self, Job};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

// Global timer driver (single-threaded, safe to use with RefCell)
thread_local! {
    static TIMER_DRIVER: RefCell<TimerDriver> = RefCell::new(TimerDriver::new());
}

/// Identifies a registered timer so it can be cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TimerId {
    deadline: Instant,
    seq: u64,
}

/// Manages registered timers and releases them once their deadline is reached.
///
/// Timers are ordered by deadline; timers sharing a deadline fire in
/// registration order.
pub(crate) struct TimerDriver {
    timers: BTreeMap<TimerId, Job>,
    next_seq: u64,
}

impl TimerDriver {
    fn new() -> Self {
        Self {
            timers: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Registers `job` to be scheduled once `deadline` has passed.
    fn register(&mut self, deadline: Instant, job: Job) -> TimerId {
        let id = TimerId {
            deadline,
            seq: self.next_seq,
        };
        self.next_seq = self.next_seq.wrapping_add(1);
        self.timers.insert(id, job);

        id
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    /// Removes every timer whose deadline has passed, in firing order.
    fn take_expired(&mut self, now: Instant) -> Vec<Job> {
        let mut expired = Vec::new();

        while let Some(entry) = self.timers.first_entry() {
            if entry.key().deadline > now {
                break;
            }
            expired.push(entry.remove());
        }

        expired
    }

    /// Returns the time remaining until the next timer deadline, if any.
    fn next_remaining(&self, now: Instant) -> Option<Duration> {
        self.timers
            .keys()
            .next()
            .map(|id| id.deadline.saturating_duration_since(now))
    }

    fn len(&self) -> usize {
        self.timers.len()
    }
}

/// Registers a job that is scheduled after `duration` has elapsed.
pub(crate) fn register(duration: Duration, job: impl FnOnce() + 'static) -> TimerId {
    let deadline = Instant::now() + duration;
    TIMER_DRIVER.with(|driver| driver.borrow_mut().register(deadline, Box::new(job)))
}

/// Cancels a pending timer. Returns `false` if it already fired.
pub(crate) fn cancel(id: TimerId) -> bool {
    TIMER_DRIVER.with(|driver| driver.borrow_mut().cancel(id))
}

/// Moves all expired timers onto the scheduler queue.
///
/// Returns `true` if there are still pending timers, `false` if all are done.
pub(crate) fn process_timers() -> bool {
    let (expired, remaining) = TIMER_DRIVER.with(|driver| {
        let mut driver = driver.borrow_mut();
        let expired = driver.take_expired(Instant::now());
        (expired, driver.len())
    });

    if !expired.is_empty() {
        tracing::trace!(fired = expired.len(), remaining, "timers expired");
    }
    for job in expired {
        queue::enqueue(job);
    }

    remaining > 0
}

/// Returns the remaining duration until the next scheduled timer, if any.
pub(crate) fn next_timer_remaining() -> Option<Duration> {
    TIMER_DRIVER.with(|driver| driver.borrow().next_remaining(Instant::now()))
}

/// Drops every registered timer without firing it.
pub(crate) fn clear() {
    TIMER_DRIVER.with(|driver| driver.borrow_mut().timers.clear());
}
