//! Process-wide FIFO of ready jobs.
//!
//! Every deferred piece of work in the crate ends up here: AVar drain passes,
//! expired timers, `yield_now` continuations and panics that must surface on a
//! fresh turn. The queue lives in thread-local storage because the runtime is
//! single threaded; jobs are popped one at a time so a job may freely enqueue
//! more work while it runs.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic;

/// A zero-argument unit of work.
pub(crate) type Job = Box<dyn FnOnce()>;

thread_local! {
    static QUEUE: RefCell<VecDeque<Job>> = RefCell::new(VecDeque::new());
}

/// Appends a job to the back of the queue.
pub(crate) fn enqueue(job: impl FnOnce() + 'static) {
    QUEUE.with(|queue| queue.borrow_mut().push_back(Box::new(job)));
}

/// Dequeues the next ready job, if any.
pub(crate) fn pop() -> Option<Job> {
    QUEUE.with(|queue| queue.borrow_mut().pop_front())
}

pub(crate) fn is_empty() -> bool {
    QUEUE.with(|queue| queue.borrow().is_empty())
}

pub(crate) fn len() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}

/// Runs up to `budget` jobs, returning how many actually ran.
pub(crate) fn run_pending(budget: usize) -> usize {
    let mut ran = 0;

    while ran < budget {
        let Some(job) = pop() else {
            break;
        };
        job();
        ran += 1;
    }

    if ran > 0 {
        tracing::trace!(ran, remaining = len(), "scheduler turn");
    }

    ran
}

/// Schedules a captured panic to resume on its own turn, so it surfaces from
/// the event loop instead of the code that happened to invoke the handler.
pub(crate) fn rethrow(payload: Box<dyn Any + Send>) {
    tracing::error!(
        panic = panic_message(&*payload),
        "handler panicked, rethrowing on the next turn"
    );
    enqueue(move || panic::resume_unwind(payload));
}

/// Invokes `f`, catching a panic and rescheduling it with [`rethrow`].
pub(crate) fn guard(f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(panic::AssertUnwindSafe(f)) {
        rethrow(payload);
    }
}

/// Drops every queued job without running it.
pub(crate) fn clear() {
    let dropped = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
    if !dropped.is_empty() {
        tracing::debug!(dropped = dropped.len(), "discarding queued jobs");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn runs_in_fifo_order_including_nested_jobs() {
        clear();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = log.clone();
        let l2 = log.clone();
        enqueue(move || {
            l1.borrow_mut().push(1);
            let l3 = l1.clone();
            enqueue(move || l3.borrow_mut().push(3));
        });
        enqueue(move || l2.borrow_mut().push(2));

        assert_eq!(run_pending(usize::MAX), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert!(is_empty());
    }

    #[test]
    fn budget_limits_a_turn() {
        clear();
        for _ in 0..5 {
            enqueue(|| {});
        }

        assert_eq!(run_pending(2), 2);
        assert_eq!(len(), 3);
        clear();
    }

    #[test]
    fn guarded_panic_is_deferred() {
        clear();
        guard(|| panic!("boom"));
        assert_eq!(len(), 1);

        let job = pop().unwrap();
        let result = panic::catch_unwind(panic::AssertUnwindSafe(job));
        assert!(result.is_err());
    }
}
