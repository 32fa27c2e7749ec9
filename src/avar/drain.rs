//! The drain pass resolving blocked AVar operations.
//!
//! A pass runs in steps, each taken under a short borrow of the cell and
//! followed by the callbacks it released, invoked with no borrow held:
//!
//! 1. a killed cell fails every queued operation and the pass ends;
//! 2. an empty cell accepts the oldest queued put;
//! 3. a filled cell serves the reads queued when the pass started, then the
//!    oldest take.
//!
//! Passes repeat until one makes no progress. Callbacks run under
//! [`queue::guard`], so a panicking handler cannot leave the queues half
//! updated; the panic resurfaces on a later scheduler turn instead.

use super::{AVar, Inner, Resolve, Slot};
use crate::runtime::queue;

use std::mem;

impl<A: Clone + 'static> AVar<A> {
    /// Requests a drain pass on the scheduler queue, unless one is already
    /// requested.
    pub(super) fn schedule_drain(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.drain_scheduled {
                return;
            }
            inner.drain_scheduled = true;
        }

        let avar = self.clone();
        queue::enqueue(move || avar.drain());
    }

    fn drain(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.drain_scheduled = false;
            if inner.draining {
                return;
            }
            inner.draining = true;
        }

        let mut passes = 0usize;
        while self.pass() {
            passes += 1;
        }
        tracing::trace!(passes, "avar drained");

        self.inner.borrow_mut().draining = false;
    }

    /// Runs one pass, returning whether it resolved anything.
    fn pass(&self) -> bool {
        if self.flush_killed() {
            return false;
        }

        let reads_at_start = self.inner.borrow().reads.len();
        let mut progressed = false;

        let put = {
            let mut inner = self.inner.borrow_mut();
            if matches!(inner.slot, Slot::Empty) {
                let put = inner.puts.pop_front();
                put.map(|(value, resolve)| {
                    inner.slot = Slot::Filled(value);
                    resolve
                })
            } else {
                None
            }
        };
        if let Some(resolve) = put {
            progressed = true;
            queue::guard(move || resolve(Ok(())));
        }

        let reads = {
            let mut inner = self.inner.borrow_mut();
            serve_reads(&mut inner, reads_at_start)
        };
        progressed |= !reads.is_empty();
        for (resolve, value) in reads {
            queue::guard(move || resolve(Ok(value)));
        }

        let take = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            if matches!(inner.slot, Slot::Filled(_)) && !inner.takes.is_empty() {
                let resolve = inner.takes.pop_front();
                match mem::replace(&mut inner.slot, Slot::Empty) {
                    Slot::Filled(value) => resolve.map(|resolve| (resolve, value)),
                    _ => None,
                }
            } else {
                None
            }
        };
        if let Some((resolve, value)) = take {
            progressed = true;
            queue::guard(move || resolve(Ok(value)));
        }

        progressed
    }

    /// Fails every queued operation if the cell was killed. Returns whether
    /// it was.
    fn flush_killed(&self) -> bool {
        let flushed = {
            let mut inner = self.inner.borrow_mut();
            let Slot::Killed(error) = &inner.slot else {
                return false;
            };
            let error = error.clone();

            let takes: Vec<_> = inner.takes.drain().collect();
            let reads: Vec<_> = inner.reads.drain().collect();
            let puts: Vec<_> = inner.puts.drain().map(|(_, resolve)| resolve).collect();
            (error, takes, reads, puts)
        };

        let (error, takes, reads, puts) = flushed;
        if takes.len() + reads.len() + puts.len() > 0 {
            tracing::debug!(
                takes = takes.len(),
                reads = reads.len(),
                puts = puts.len(),
                "flushing killed avar"
            );
        }

        for resolve in takes.into_iter().chain(reads) {
            let error = error.clone();
            queue::guard(move || resolve(Err(error)));
        }
        for resolve in puts {
            let error = error.clone();
            queue::guard(move || resolve(Err(error)));
        }

        true
    }
}

fn serve_reads<A: Clone>(inner: &mut Inner<A>, limit: usize) -> Vec<(Resolve<A>, A)> {
    let Slot::Filled(value) = &inner.slot else {
        return Vec::new();
    };
    let value = value.clone();

    let mut served = Vec::new();
    while served.len() < limit {
        let Some(resolve) = inner.reads.pop_front() else {
            break;
        };
        served.push((resolve, value.clone()));
    }
    served
}
