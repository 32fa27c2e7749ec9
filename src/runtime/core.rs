//! Host event loop that drives tasks to completion.
//!
//! Tasks make progress through callbacks on the thread-local scheduler queue
//! and timer driver. The runtime owns neither; it only turns the crank: run a
//! batch of ready jobs, move expired timers onto the queue, and sleep until
//! the next deadline when nothing else is runnable.

use crate::error::RunError;
use crate::runtime::context::{Config, enter_context};
use crate::runtime::queue;
use crate::runtime::waker::{Notify, make_waker};
use crate::task::{Fiber, Task};
use crate::timer;

use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll};
use std::thread;

/// Cooperative, single-threaded runtime.
///
/// A runtime may be created and dropped freely; all runtimes on a thread
/// share its scheduler queue and timers.
pub struct Runtime {
    config: Config,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    ///
    /// # Example
    /// ```ignore
    /// let mut rt = Runtime::new();
    /// ```
    pub fn new() -> Self {
        Self::with_config(Config::DEFAULT)
    }

    pub(crate) fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Jobs run per tick before expired timers are collected.
    pub fn jobs_per_tick(&self) -> usize {
        self.config.jobs_per_tick
    }

    /// Whether unobserved fiber failures panic instead of only being logged.
    pub fn panics_on_unhandled(&self) -> bool {
        self.config.panic_on_unhandled
    }

    /// Blocks until `fut` completes, driving tasks and timers meanwhile.
    ///
    /// Jobs still queued when `fut` completes stay queued for the next call.
    ///
    /// # Panics
    /// If `fut` is still pending once no job is runnable and no timer is
    /// registered: nothing could ever wake it.
    ///
    /// # Example
    /// ```ignore
    /// let value = rt.block_on(async { 42 });
    /// assert_eq!(value, 42);
    /// ```
    pub fn block_on<F: Future>(&mut self, fut: F) -> F::Output {
        match self.drive(fut) {
            Some(output) => output,
            None => panic!("block_on: the main future is pending but no work or timers remain"),
        }
    }

    /// Runs `task` to its terminal result.
    ///
    /// Returns [`RunError::Stalled`] if the task can no longer settle because
    /// the runtime ran out of work, e.g. a `take` on an AVar nobody will
    /// ever fill.
    ///
    /// # Example
    /// ```ignore
    /// assert_eq!(rt.run(Task::<_, Error>::pure(7)), Ok(7));
    /// ```
    pub fn run<A: 'static, E: 'static>(&mut self, task: Task<A, E>) -> Result<A, RunError<E>> {
        self.drive(task.into_future())
            .unwrap_or(Err(RunError::Stalled))
    }

    /// Runs every job that is ready now, plus the ones they enqueue, without
    /// waiting on timers. Returns how many jobs ran.
    pub fn run_until_idle(&mut self) -> usize {
        let budget = self.config.jobs_per_tick;

        enter_context(self.config, || {
            let mut total = 0;
            loop {
                total += queue::run_pending(budget);
                timer::process_timers();
                if queue::is_empty() {
                    return total;
                }
            }
        })
    }

    /// Launches `task` on a new fiber. It makes progress whenever the
    /// runtime is driven.
    pub fn spawn<A: 'static, E: fmt::Debug + 'static>(&self, task: Task<A, E>) -> Fiber<A, E> {
        enter_context(self.config, || task.launch())
    }

    /// Discards every queued job and registered timer on this thread.
    pub fn shutdown(&mut self) {
        tracing::debug!("shutting down runtime");
        queue::clear();
        timer::clear();
    }

    fn drive<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        let config = self.config;

        enter_context(config, || {
            let notify = Notify::new();
            let waker = make_waker(&notify);
            let mut cx = Context::from_waker(&waker);
            let mut fut = pin!(fut);

            loop {
                if notify.take() {
                    if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
                        return Some(output);
                    }
                }

                queue::run_pending(config.jobs_per_tick);

                // Check and fire any expired timers
                let has_pending_timers = timer::process_timers();

                if notify.is_notified() || !queue::is_empty() {
                    continue;
                }

                // If only timers are pending, sleep until the next deadline
                if has_pending_timers {
                    if let Some(remaining) = timer::next_timer_remaining() {
                        if !remaining.is_zero() {
                            thread::sleep(remaining);
                        }
                    }
                    continue;
                }

                tracing::debug!("runtime stalled: nothing runnable and no timers pending");
                return None;
            }
        })
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("jobs_per_tick", &self.config.jobs_per_tick)
            .field("panic_on_unhandled", &self.config.panic_on_unhandled)
            .finish()
    }
}
