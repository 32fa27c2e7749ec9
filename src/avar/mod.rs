//! Asynchronous variables.
//!
//! An [`AVar`] is a cell that is either empty, filled with one value, or
//! killed with an error. `take` empties it, `put` fills it and `read` copies
//! the value out; each blocks until the cell is in the state it needs. The
//! blocked operations wait in per-kind FIFO queues and are resolved by the
//! drain pass in [`drain`], which runs on the scheduler queue rather than
//! inline with the operation that made it necessary.
//!
//! Cancelling a blocked operation unlinks it from its queue on the spot, so
//! a killed waiter never consumes a value later.

mod drain;
mod modify;

use crate::error::Error;
use crate::task::{Canceler, Task};
use crate::utils::list::LinkedQueue;

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

type Resolve<A> = Box<dyn FnOnce(Result<A, Error>)>;

enum Slot<A> {
    Empty,
    Filled(A),
    Killed(Error),
}

struct Inner<A> {
    slot: Slot<A>,
    takes: LinkedQueue<Resolve<A>>,
    reads: LinkedQueue<Resolve<A>>,
    puts: LinkedQueue<(A, Resolve<()>)>,
    /// A drain pass is running; nested requests only set `drain_scheduled`.
    draining: bool,
    drain_scheduled: bool,
}

/// Snapshot of an AVar's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status<A> {
    Empty,
    Filled(A),
    Killed(Error),
}

impl<A> Status<A> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Status::Empty)
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, Status::Filled(_))
    }

    pub fn is_killed(&self) -> bool {
        matches!(self, Status::Killed(_))
    }
}

/// Number of operations blocked on an AVar, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pending {
    pub takes: usize,
    pub puts: usize,
    pub reads: usize,
}

/// A shared, asynchronously blocking cell holding at most one `A`.
///
/// Cloning yields another handle to the same cell.
pub struct AVar<A> {
    inner: Rc<RefCell<Inner<A>>>,
}

impl<A> Clone for AVar<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A> fmt::Debug for AVar<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let slot = match inner.slot {
            Slot::Empty => "empty",
            Slot::Filled(_) => "filled",
            Slot::Killed(_) => "killed",
        };
        f.debug_struct("AVar")
            .field("slot", &slot)
            .field("takes", &inner.takes.len())
            .field("puts", &inner.puts.len())
            .field("reads", &inner.reads.len())
            .finish()
    }
}

impl<A: Clone + 'static> AVar<A> {
    /// A cell filled with `value`.
    pub fn new(value: A) -> Self {
        Self::with_slot(Slot::Filled(value))
    }

    /// An empty cell.
    pub fn empty() -> Self {
        Self::with_slot(Slot::Empty)
    }

    fn with_slot(slot: Slot<A>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                slot,
                takes: LinkedQueue::new(),
                reads: LinkedQueue::new(),
                puts: LinkedQueue::new(),
                draining: false,
                drain_scheduled: false,
            })),
        }
    }

    /// Empties the cell, waiting until it holds a value.
    pub fn take<E: From<Error> + 'static>(&self) -> Task<A, E> {
        let avar = self.clone();

        Task::new(move |callback| {
            if let Some(error) = avar.killed_with() {
                callback(Err(error.into()));
                return Canceler::noop();
            }

            let key = avar
                .inner
                .borrow_mut()
                .takes
                .push_back(Box::new(move |result| callback(result.map_err(E::from))));
            avar.schedule_drain();

            let avar = avar.clone();
            Canceler::from_fn(move || {
                avar.inner.borrow_mut().takes.remove(key);
            })
        })
    }

    /// Fills the cell with `value`, waiting until it is empty.
    pub fn put<E: From<Error> + 'static>(&self, value: A) -> Task<(), E> {
        let avar = self.clone();

        Task::new(move |callback| {
            if let Some(error) = avar.killed_with() {
                callback(Err(error.into()));
                return Canceler::noop();
            }

            let resolve: Resolve<()> = Box::new(move |result| callback(result.map_err(E::from)));
            let key = avar.inner.borrow_mut().puts.push_back((value.clone(), resolve));
            avar.schedule_drain();

            let avar = avar.clone();
            Canceler::from_fn(move || {
                avar.inner.borrow_mut().puts.remove(key);
            })
        })
    }

    /// Copies the value out without emptying the cell, waiting until it
    /// holds one.
    pub fn read<E: From<Error> + 'static>(&self) -> Task<A, E> {
        let avar = self.clone();

        Task::new(move |callback| {
            if let Some(error) = avar.killed_with() {
                callback(Err(error.into()));
                return Canceler::noop();
            }

            let key = avar
                .inner
                .borrow_mut()
                .reads
                .push_back(Box::new(move |result| callback(result.map_err(E::from))));
            avar.schedule_drain();

            let avar = avar.clone();
            Canceler::from_fn(move || {
                avar.inner.borrow_mut().reads.remove(key);
            })
        })
    }

    /// Fills the cell right away if it is empty. Returns whether it did.
    ///
    /// Unlike [`AVar::put`], this does not queue behind blocked puts.
    pub fn try_put(&self, value: A) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.slot, Slot::Empty) {
                return false;
            }
            inner.slot = Slot::Filled(value);
        }
        self.schedule_drain();
        true
    }

    /// Empties the cell right away if it holds a value.
    pub fn try_take(&self) -> Option<A> {
        let value = {
            let mut inner = self.inner.borrow_mut();
            match mem::replace(&mut inner.slot, Slot::Empty) {
                Slot::Filled(value) => value,
                other => {
                    inner.slot = other;
                    return None;
                }
            }
        };
        self.schedule_drain();
        Some(value)
    }

    /// Copies the value out right away if there is one.
    pub fn try_read(&self) -> Option<A> {
        match &self.inner.borrow().slot {
            Slot::Filled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Kills the cell. Every blocked operation fails with `error`, as does
    /// every later one. Killing a killed cell does nothing.
    pub fn kill(&self, error: Error) {
        {
            let mut inner = self.inner.borrow_mut();
            if matches!(inner.slot, Slot::Killed(_)) {
                return;
            }
            tracing::debug!(%error, "killing avar");
            inner.slot = Slot::Killed(error);
        }
        self.schedule_drain();
    }

    pub fn status(&self) -> Status<A> {
        match &self.inner.borrow().slot {
            Slot::Empty => Status::Empty,
            Slot::Filled(value) => Status::Filled(value.clone()),
            Slot::Killed(error) => Status::Killed(error.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.inner.borrow().slot, Slot::Empty)
    }

    pub fn is_filled(&self) -> bool {
        matches!(self.inner.borrow().slot, Slot::Filled(_))
    }

    pub fn is_killed(&self) -> bool {
        matches!(self.inner.borrow().slot, Slot::Killed(_))
    }

    pub fn pending(&self) -> Pending {
        let inner = self.inner.borrow();
        Pending {
            takes: inner.takes.len(),
            puts: inner.puts.len(),
            reads: inner.reads.len(),
        }
    }

    fn killed_with(&self) -> Option<Error> {
        match &self.inner.borrow().slot {
            Slot::Killed(error) => Some(error.clone()),
            _ => None,
        }
    }
}
