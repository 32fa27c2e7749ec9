//! Batching background worker.
//!
//! A reaper collects items into a workload and, while the workload is not
//! null, periodically hands it to an action that cleans it up. The loop runs
//! on a fiber that only exists while there is work: the first `add` spawns
//! it and it stops by itself once the workload becomes null.

use crate::error::Error;
use crate::task::{Fiber, Step, Task};

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::time::Duration;

/// Folds the workload that accumulated while the action ran into the
/// workload the action left behind.
pub type Merge<W> = Rc<dyn Fn(W) -> W>;

/// How a [`Reaper`] stores items and cleans them up.
pub struct ReaperSettings<W, I> {
    action: Rc<dyn Fn(W) -> Task<Merge<W>, Error>>,
    delay: Duration,
    cons: Rc<dyn Fn(I, W) -> W>,
    null: Rc<dyn Fn(&W) -> bool>,
    empty: W,
}

impl<I: 'static> ReaperSettings<Vec<I>, I> {
    /// Settings for a workload that is a plain list of items, reaped every
    /// 30 seconds.
    pub fn new(action: impl Fn(Vec<I>) -> Task<Merge<Vec<I>>, Error> + 'static) -> Self {
        Self::with_workload(
            action,
            Vec::new(),
            |item, mut items: Vec<I>| {
                items.push(item);
                items
            },
            Vec::is_empty,
        )
    }
}

impl<W, I> ReaperSettings<W, I> {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(30);

    /// Settings for an arbitrary workload type.
    ///
    /// `cons` adds an item, `null` tells whether a workload is done with and
    /// `empty` is the workload a fresh reaper starts from.
    pub fn with_workload(
        action: impl Fn(W) -> Task<Merge<W>, Error> + 'static,
        empty: W,
        cons: impl Fn(I, W) -> W + 'static,
        null: impl Fn(&W) -> bool + 'static,
    ) -> Self {
        Self {
            action: Rc::new(action),
            delay: Self::DEFAULT_DELAY,
            cons: Rc::new(cons),
            null: Rc::new(null),
            empty,
        }
    }

    /// Sets the pause between two runs of the action.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

enum State<W> {
    NoReaper,
    Workload(W),
}

/// Handle to a reaper. Clones share the same workload and loop.
pub struct Reaper<W, I> {
    settings: Rc<ReaperSettings<W, I>>,
    state: Rc<RefCell<State<W>>>,
    fiber: Rc<RefCell<Option<Fiber<(), Error>>>>,
}

impl<W, I> Clone for Reaper<W, I> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            state: self.state.clone(),
            fiber: self.fiber.clone(),
        }
    }
}

impl<W, I> fmt::Debug for Reaper<W, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = matches!(*self.state.borrow(), State::Workload(_));
        f.debug_struct("Reaper")
            .field("delay", &self.settings.delay)
            .field("running", &running)
            .finish()
    }
}

impl<W: Clone + 'static, I: 'static> Reaper<W, I> {
    pub fn new(settings: ReaperSettings<W, I>) -> Self {
        Self {
            settings: Rc::new(settings),
            state: Rc::new(RefCell::new(State::NoReaper)),
            fiber: Rc::new(RefCell::new(None)),
        }
    }

    /// Adds an item to the workload, spawning the loop if none is running.
    pub fn add(&self, item: I) {
        let spawn = {
            let mut state = self.state.borrow_mut();
            let (workload, spawn) = match mem::replace(&mut *state, State::NoReaper) {
                State::NoReaper => (self.settings.empty.clone(), true),
                State::Workload(workload) => (workload, false),
            };
            *state = State::Workload((self.settings.cons)(item, workload));
            spawn
        };

        if spawn {
            tracing::debug!(delay = ?self.settings.delay, "spawning reaper");
            let fiber = self.reap_loop().launch();
            *self.fiber.borrow_mut() = Some(fiber);
        }
    }

    /// The current workload; the empty one if no loop is running.
    pub fn read(&self) -> W {
        match &*self.state.borrow() {
            State::NoReaper => self.settings.empty.clone(),
            State::Workload(workload) => workload.clone(),
        }
    }

    /// Takes the current workload, leaving an empty one behind. A running
    /// loop finds nothing to do on its next turn and stops.
    pub fn stop(&self) -> W {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            State::NoReaper => self.settings.empty.clone(),
            State::Workload(workload) => mem::replace(workload, self.settings.empty.clone()),
        }
    }

    /// Kills the loop, if any, and discards the workload.
    pub fn kill(&self) -> Task<(), Error> {
        let this = self.clone();
        Task::defer(move || {
            *this.state.borrow_mut() = State::NoReaper;
            match this.fiber.borrow_mut().take() {
                Some(fiber) => fiber.kill(),
                None => Task::unit(),
            }
        })
    }

    fn reap_loop(&self) -> Task<(), Error> {
        let this = self.clone();
        Task::chain_rec((), move |()| {
            let this = this.clone();
            Task::delay(this.settings.delay).and_then(move |()| this.reap())
        })
    }

    fn reap(&self) -> Task<Step<(), ()>, Error> {
        let workload = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Workload(workload) => mem::replace(workload, self.settings.empty.clone()),
                State::NoReaper => self.settings.empty.clone(),
            }
        };

        let this = self.clone();
        (self.settings.action)(workload)
            .attempt()
            .map(move |merge| {
                let merge = merge.unwrap_or_else(|error| {
                    tracing::warn!(%error, "reaper action failed, keeping the new workload");
                    let identity: Merge<W> = Rc::new(|workload| workload);
                    identity
                });
                this.merge(&*merge)
            })
    }

    fn merge(&self, merge: &dyn Fn(W) -> W) -> Step<(), ()> {
        let current = match mem::replace(&mut *self.state.borrow_mut(), State::NoReaper) {
            State::Workload(workload) => workload,
            State::NoReaper => self.settings.empty.clone(),
        };
        let merged = merge(current);

        if (self.settings.null)(&merged) {
            tracing::debug!("reaper workload is null, stopping");
            self.fiber.borrow_mut().take();
            Step::Done(())
        } else {
            *self.state.borrow_mut() = State::Workload(merged);
            Step::Loop(())
        }
    }
}
