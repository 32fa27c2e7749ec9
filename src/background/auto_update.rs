//! Periodically refreshed values.
//!
//! An [`AutoUpdate`] memoizes the result of a task for a fixed interval. The
//! task runs on a background fiber, and only on demand: the first `get` after
//! the cached value expired raises the `needs_running` signal, and every
//! `get` arriving before the fresh value is published waits on
//! `last_value` for that same run.

use crate::avar::AVar;
use crate::error::Error;
use crate::task::{Fiber, Step, Task};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// What an [`AutoUpdate`] computes and how long a value stays fresh.
pub struct UpdateSettings<A> {
    action: Task<A, Error>,
    frequency: Duration,
    modify: Option<Rc<dyn Fn(A) -> Task<A, Error>>>,
}

impl<A: 'static> UpdateSettings<A> {
    pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(1);

    pub fn new(action: Task<A, Error>) -> Self {
        Self {
            action,
            frequency: Self::DEFAULT_FREQUENCY,
            modify: None,
        }
    }

    /// Sets how long a published value is served before it is recomputed.
    pub fn frequency(mut self, frequency: Duration) -> Self {
        self.frequency = frequency;
        self
    }

    /// Derives each value after the first from the previous one instead of
    /// rerunning the action. A failed run falls back to the action.
    pub fn modify(mut self, modify: impl Fn(A) -> Task<A, Error> + 'static) -> Self {
        self.modify = Some(Rc::new(modify));
        self
    }
}

struct Shared<A> {
    needs_running: AVar<()>,
    last_value: AVar<Result<A, Error>>,
    current: Rc<RefCell<Option<Result<A, Error>>>>,
}

impl<A> Clone for Shared<A> {
    fn clone(&self) -> Self {
        Self {
            needs_running: self.needs_running.clone(),
            last_value: self.last_value.clone(),
            current: self.current.clone(),
        }
    }
}

/// A value recomputed at most once per interval, and only when asked for.
pub struct AutoUpdate<A> {
    shared: Shared<A>,
    fiber: Fiber<(), Error>,
}

impl<A> fmt::Debug for AutoUpdate<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoUpdate")
            .field("fresh", &self.shared.current.borrow().is_some())
            .field("fiber", &self.fiber)
            .finish()
    }
}

impl<A: Clone + 'static> AutoUpdate<A> {
    /// Starts the background fiber. Nothing is computed before the first
    /// [`AutoUpdate::get`].
    pub fn new(settings: UpdateSettings<A>) -> Self {
        let shared = Shared {
            needs_running: AVar::empty(),
            last_value: AVar::empty(),
            current: Rc::new(RefCell::new(None)),
        };

        let settings = Rc::new(settings);
        let updater = shared.clone();
        let fiber = Task::chain_rec(None, move |previous: Option<A>| {
            updater.update(&settings, previous)
        })
        .launch();

        Self { shared, fiber }
    }

    /// The current value, computing it first if it expired.
    pub fn get(&self) -> Task<A, Error> {
        let shared = self.shared.clone();
        Task::defer(move || {
            let cached = shared.current.borrow().clone();
            if let Some(result) = cached {
                return Task::lazy(move || result.clone());
            }

            shared.needs_running.try_put(());
            shared
                .last_value
                .read()
                .and_then(|result: Result<A, Error>| Task::lazy(move || result.clone()))
        })
    }

    /// Stops the background fiber. Pending and later `get`s never settle.
    pub fn kill(&self) -> Task<(), Error> {
        self.fiber.kill()
    }
}

impl<A: Clone + 'static> Shared<A> {
    fn update(
        &self,
        settings: &Rc<UpdateSettings<A>>,
        previous: Option<A>,
    ) -> Task<Step<Option<A>, ()>, Error> {
        let settings = settings.clone();
        let this = self.clone();

        self.needs_running.take().and_then(move |()| {
            let run = match (&settings.modify, previous.clone()) {
                (Some(modify), Some(previous)) => modify(previous),
                _ => settings.action.clone(),
            };

            let this = this.clone();
            let frequency = settings.frequency;
            run.attempt()
                .and_then(move |result| this.publish(result, frequency))
        })
    }

    fn publish(
        &self,
        result: Result<A, Error>,
        frequency: Duration,
    ) -> Task<Step<Option<A>, ()>, Error> {
        if let Err(error) = &result {
            tracing::warn!(%error, "auto-update action failed");
        }
        *self.current.borrow_mut() = Some(result.clone());
        self.last_value.try_take();

        let this = self.clone();
        let next = result.as_ref().ok().cloned();
        self.last_value
            .put(result)
            .then(Task::delay(frequency))
            .map(move |()| {
                // empty the cell before the cache so no get can read a stale value
                this.last_value.try_take();
                *this.current.borrow_mut() = None;
                Step::Loop(next.clone())
            })
    }
}
