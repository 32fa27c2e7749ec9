//! Cancellable asynchronous computations.
//!
//! A [`Task`] is a description of work, not the work itself: it wraps a
//! function that, given a continuation, starts the computation and returns a
//! [`Canceler`] for that particular run. Running the same task twice starts
//! two independent executions.
//!
//! ```ignore
//! use coop::{Error, Runtime, Task};
//! use std::time::Duration;
//!
//! let task = Task::<(), Error>::delay(Duration::from_millis(10))
//!     .map(|()| 21)
//!     .and_then(|n| Task::pure(n * 2));
//!
//! let mut rt = Runtime::new();
//! assert_eq!(rt.run(task), Ok(42));
//! ```
//!
//! # Failure and cancellation
//!
//! A run settles at most once, with `Ok` or `Err`. Errors short-circuit every
//! combinator downstream unless caught with [`Task::or_else`] or
//! [`Task::attempt`]. Cancellation is distinct from failure: a cancelled run
//! never delivers a result, but every [`bracket`](Task::general_bracket)
//! release in scope runs with [`Exit::Killed`] before the cancellation
//! completes.

mod bracket;
mod canceler;
mod combinators;
mod fiber;
mod future;
mod parallel;
mod rec;

pub use bracket::Exit;
pub use canceler::{Canceler, Done};
pub use fiber::{Fiber, FiberId, Outcome};
pub use future::TaskFuture;
pub use rec::Step;

use crate::error::Error;
use crate::runtime::queue;
use crate::timer;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Continuation receiving the result of one run.
pub type Callback<A, E> = Box<dyn FnOnce(Result<A, E>)>;

/// A suspended, cancellable computation that succeeds with `A` or fails with `E`.
pub struct Task<A, E = Error> {
    run: Rc<dyn Fn(Callback<A, E>) -> Canceler>,
}

impl<A, E> Clone for Task<A, E> {
    fn clone(&self) -> Self {
        Self {
            run: self.run.clone(),
        }
    }
}

impl<A, E> fmt::Debug for Task<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

impl<A: 'static, E: 'static> Task<A, E> {
    /// Builds a task from a trusted run function.
    ///
    /// The function must deliver at most one result and must make its
    /// canceler harmless once that result was delivered.
    pub(crate) fn from_raw(run: impl Fn(Callback<A, E>) -> Canceler + 'static) -> Self {
        Self { run: Rc::new(run) }
    }

    /// The primitive constructor for foreign effects.
    ///
    /// `start` receives the continuation and returns how to cancel what it
    /// started. Extra invocations of the continuation are ignored, as is any
    /// invocation after cancellation; cancelling after the result arrived is
    /// a no-op.
    pub fn new(start: impl Fn(Callback<A, E>) -> Canceler + 'static) -> Self {
        Self::from_raw(move |callback| {
            let slot: Rc<RefCell<Option<Callback<A, E>>>> = Rc::new(RefCell::new(Some(callback)));

            let pending = slot.clone();
            let canceler = start(Box::new(move |result| {
                let callback = pending.borrow_mut().take();
                if let Some(callback) = callback {
                    callback(result);
                }
            }));

            if slot.borrow().is_none() {
                return Canceler::noop();
            }

            Canceler::new(move |done| {
                let callback = slot.borrow_mut().take();
                match callback {
                    Some(callback) => {
                        drop(callback);
                        canceler.cancel(done);
                    }
                    None => done(),
                }
            })
        })
    }

    /// Adapts a single-callback effect that cannot be cancelled.
    ///
    /// If the run is cancelled before the effect reports back, its eventual
    /// result is discarded.
    pub fn from_callback(start: impl Fn(Callback<A, E>) + 'static) -> Self {
        Self::new(move |callback| {
            start(callback);
            Canceler::noop()
        })
    }

    /// Starts one run, handing the result to `callback`.
    pub fn run(&self, callback: impl FnOnce(Result<A, E>) + 'static) -> Canceler {
        (self.run)(Box::new(callback))
    }

    /// Succeeds synchronously with `value`.
    pub fn pure(value: A) -> Self
    where
        A: Clone,
    {
        Self::from_raw(move |callback| {
            callback(Ok(value.clone()));
            Canceler::noop()
        })
    }

    /// Fails synchronously with `error`.
    pub fn fail(error: E) -> Self
    where
        E: Clone,
    {
        Self::from_raw(move |callback| {
            callback(Err(error.clone()));
            Canceler::noop()
        })
    }

    /// Lifts a synchronous effect, evaluated anew on every run.
    pub fn lazy(effect: impl Fn() -> Result<A, E> + 'static) -> Self {
        Self::from_raw(move |callback| {
            callback(effect());
            Canceler::noop()
        })
    }

    /// Builds the task to run at the moment it is run.
    pub fn defer(make: impl Fn() -> Task<A, E> + 'static) -> Self {
        Self::from_raw(move |callback| make().run(callback))
    }

    /// Never settles.
    pub fn never() -> Self {
        Self::from_raw(|callback| {
            let slot = RefCell::new(Some(callback));
            Canceler::from_fn(move || drop(slot.take()))
        })
    }
}

impl<E: 'static> Task<(), E> {
    /// Succeeds synchronously with `()`.
    pub fn unit() -> Self {
        Self::pure(())
    }

    /// Succeeds with `()` after `duration`.
    pub fn delay(duration: Duration) -> Self {
        Task::new(move |callback| {
            let id = timer::register(duration, move || callback(Ok(())));
            Canceler::from_fn(move || {
                timer::cancel(id);
            })
        })
    }

    /// Succeeds with `()` on the next scheduler turn.
    pub fn yield_now() -> Self {
        Task::new(|callback| {
            queue::enqueue(move || callback(Ok(())));
            Canceler::noop()
        })
    }
}

