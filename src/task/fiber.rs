//! Forked runs of a task.
//!
//! A [`Fiber`] is the handle of one detached run. It can be joined any number
//! of times, from any task, and killed independently of whoever forked it.

use super::{Canceler, Done, Task};
use crate::error::Error;
use crate::runtime::{context, queue};
use crate::utils::list::LinkedQueue;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

/// Identifies a fiber in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(u64);

impl FiberId {
    fn next() -> Self {
        thread_local! {
            static NEXT_ID: Cell<u64> = const { Cell::new(1) };
        }
        NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            FiberId(id)
        })
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fiber#{}", self.0)
    }
}

/// How a fiber ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<A, E> {
    Completed(A),
    Failed(E),
    Killed,
}

impl<A, E> Outcome<A, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_killed(&self) -> bool {
        matches!(self, Outcome::Killed)
    }

    /// The result a joiner observes; a kill surfaces as [`Error::Killed`].
    pub fn into_result(self) -> Result<A, E>
    where
        E: From<Error>,
    {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(error) => Err(error),
            Outcome::Killed => Err(Error::Killed.into()),
        }
    }
}

type Joiner<A, E> = Box<dyn FnOnce(&Outcome<A, E>)>;

enum State<A, E> {
    /// The canceler is `None` until the run returned it.
    Running(Option<Canceler>),
    /// Cancellation in flight; the callbacks of every pending `kill`.
    Killing(Vec<Done>),
    Finished(Rc<Outcome<A, E>>),
}

struct Inner<A, E> {
    id: FiberId,
    state: State<A, E>,
    joiners: LinkedQueue<Joiner<A, E>>,
    observed: bool,
}

/// Handle to a forked run.
///
/// The run keeps its fiber alive until it settles, so dropping every handle
/// does not stop it. Use [`Fiber::kill`] for that.
pub struct Fiber<A, E = Error> {
    inner: Rc<RefCell<Inner<A, E>>>,
}

impl<A, E> Clone for Fiber<A, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, E> fmt::Debug for Fiber<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let state = match inner.state {
            State::Running(_) => "running",
            State::Killing(_) => "killing",
            State::Finished(_) => "finished",
        };
        f.debug_struct("Fiber")
            .field("id", &inner.id)
            .field("state", &state)
            .finish()
    }
}

impl<A: 'static, E: fmt::Debug + 'static> Task<A, E> {
    /// Starts a run right away and returns its fiber.
    pub fn launch(&self) -> Fiber<A, E> {
        let fiber = Fiber::new();
        tracing::debug!(fiber = %fiber.id(), "launching fiber");

        let settled = fiber.clone();
        let canceler = self.run(move |result| {
            settled.settle(match result {
                Ok(value) => Outcome::Completed(value),
                Err(error) => Outcome::Failed(error),
            })
        });
        fiber.started(canceler);

        fiber
    }

    /// A task that launches this one when it runs, succeeding with the fiber.
    pub fn fork<E2: 'static>(&self) -> Task<Fiber<A, E>, E2> {
        let this = self.clone();
        Task::lazy(move || Ok(this.launch()))
    }
}

impl<A, E> Fiber<A, E> {
    pub fn id(&self) -> FiberId {
        self.inner.borrow().id
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.inner.borrow().state, State::Finished(_))
    }

    /// The outcome, once the fiber has finished.
    pub fn outcome(&self) -> Option<Outcome<A, E>>
    where
        A: Clone,
        E: Clone,
    {
        match &self.inner.borrow().state {
            State::Finished(outcome) => Some(Outcome::clone(outcome)),
            _ => None,
        }
    }
}

impl<A: 'static, E: fmt::Debug + 'static> Fiber<A, E> {
    fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                id: FiberId::next(),
                state: State::Running(None),
                joiners: LinkedQueue::new(),
                observed: false,
            })),
        }
    }

    fn started(&self, canceler: Canceler) {
        let orphan = {
            let mut inner = self.inner.borrow_mut();
            match &mut inner.state {
                State::Running(slot) => {
                    *slot = Some(canceler);
                    None
                }
                // killed while the run was still starting
                State::Killing(_) => Some(canceler),
                State::Finished(_) => None,
            }
        };

        if let Some(canceler) = orphan {
            let fiber = self.clone();
            canceler.cancel(move || fiber.settle(Outcome::Killed));
        }
    }

    fn settle(&self, outcome: Outcome<A, E>) {
        let outcome = Rc::new(outcome);

        let (id, joiners, kills, observed) = {
            let mut inner = self.inner.borrow_mut();
            let kills = match mem::replace(&mut inner.state, State::Finished(outcome.clone())) {
                State::Running(_) => Vec::new(),
                State::Killing(kills) => kills,
                finished @ State::Finished(_) => {
                    inner.state = finished;
                    return;
                }
            };
            let joiners: Vec<_> = inner.joiners.drain().collect();
            (inner.id, joiners, kills, inner.observed)
        };

        tracing::debug!(fiber = %id, killed = outcome.is_killed(), "fiber finished");

        if let Outcome::Failed(error) = &*outcome {
            if !observed && joiners.is_empty() {
                report_unhandled(id, error);
            }
        }

        for joiner in joiners {
            let outcome = outcome.clone();
            queue::guard(move || joiner(&outcome));
        }
        for done in kills {
            queue::guard(done);
        }
    }

    /// Waits for the fiber and takes on its result. Joining a killed fiber
    /// fails with [`Error::Killed`]; cancelling a join leaves the fiber
    /// running.
    pub fn join(&self) -> Task<A, E>
    where
        A: Clone,
        E: Clone + From<Error>,
    {
        let fiber = self.clone();

        Task::new(move |callback| {
            let mut inner = fiber.inner.borrow_mut();
            inner.observed = true;

            if let State::Finished(outcome) = &inner.state {
                let result = Outcome::clone(outcome).into_result();
                drop(inner);
                callback(result);
                return Canceler::noop();
            }

            let key = inner.joiners.push_back(Box::new(move |outcome: &Outcome<A, E>| {
                callback(outcome.clone().into_result())
            }));

            let fiber = fiber.clone();
            Canceler::from_fn(move || {
                fiber.inner.borrow_mut().joiners.remove(key);
            })
        })
    }

    /// Cancels the fiber's run. Succeeds once every release handler the
    /// cancellation reached has finished, or right away if the fiber had
    /// already finished.
    pub fn kill(&self) -> Task<(), E> {
        let fiber = self.clone();
        Task::new(move |callback| {
            fiber.kill_then(Box::new(move || callback(Ok(()))));
            Canceler::noop()
        })
    }

    /// Starts killing the fiber without waiting for the cancellation.
    pub fn kill_detached(&self) {
        self.kill_then(Box::new(|| {}));
    }

    fn kill_then(&self, done: Done) {
        let mut inner = self.inner.borrow_mut();
        match mem::replace(&mut inner.state, State::Killing(Vec::new())) {
            State::Running(canceler) => {
                inner.state = State::Killing(vec![done]);
                let id = inner.id;
                drop(inner);

                tracing::debug!(fiber = %id, "killing fiber");
                if let Some(canceler) = canceler {
                    let fiber = self.clone();
                    canceler.cancel(move || fiber.settle(Outcome::Killed));
                }
            }
            State::Killing(mut kills) => {
                kills.push(done);
                inner.state = State::Killing(kills);
            }
            finished @ State::Finished(_) => {
                inner.state = finished;
                drop(inner);
                done();
            }
        }
    }
}

fn report_unhandled<E: fmt::Debug>(id: FiberId, error: &E) {
    let error = format!("{error:?}");
    tracing::warn!(fiber = %id, %error, "fiber failed and nobody joined it");

    if context::current_config().panic_on_unhandled {
        queue::enqueue(move || panic!("unhandled failure in {id}: {error}"));
    }
}
