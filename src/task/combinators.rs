//! Sequential combinators.
//!
//! Everything here is built on [`Task::bind`], which runs a first task and
//! decides from its result whether to finish right away or to continue with a
//! second task. The shared [`Stage`] records which of the two is live so
//! cancellation always reaches the running one.

use super::{Callback, Canceler, Task};

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

/// What to do after the first task of a [`Task::bind`] settled.
pub(crate) enum Next<B, E> {
    Ready(Result<B, E>),
    Run(Task<B, E>),
}

enum Stage {
    First(Option<Canceler>),
    Second(Option<Canceler>),
    Finished,
    Cancelled,
}

impl Stage {
    /// Records `canceler` for the stage that produced it. Returns it back if
    /// the run was cancelled before the canceler could be stored.
    fn store(stage: &RefCell<Stage>, second: bool, canceler: Canceler) -> Option<Canceler> {
        let mut stage = stage.borrow_mut();
        match &mut *stage {
            Stage::First(slot @ None) if !second => *slot = Some(canceler),
            Stage::Second(slot @ None) if second => *slot = Some(canceler),
            Stage::Cancelled => return Some(canceler),
            _ => {}
        }
        None
    }

    fn is_cancelled(stage: &RefCell<Stage>) -> bool {
        matches!(*stage.borrow(), Stage::Cancelled)
    }
}

impl<A: 'static, E: 'static> Task<A, E> {
    pub(crate) fn bind<B: 'static, E2: 'static>(
        &self,
        next: impl Fn(Result<A, E>) -> Next<B, E2> + 'static,
    ) -> Task<B, E2> {
        let this = self.clone();
        let next = Rc::new(next);

        Task::from_raw(move |callback: Callback<B, E2>| {
            let stage = Rc::new(RefCell::new(Stage::First(None)));

            let next = next.clone();
            let st = stage.clone();
            let first = this.run(move |result| {
                if Stage::is_cancelled(&st) {
                    return;
                }

                match next(result) {
                    Next::Ready(result) => {
                        *st.borrow_mut() = Stage::Finished;
                        callback(result);
                    }
                    Next::Run(task) => {
                        *st.borrow_mut() = Stage::Second(None);

                        let inner = st.clone();
                        let second = task.run(move |result| {
                            if Stage::is_cancelled(&inner) {
                                return;
                            }
                            *inner.borrow_mut() = Stage::Finished;
                            callback(result);
                        });

                        if let Some(orphan) = Stage::store(&st, true, second) {
                            orphan.cancel_detached();
                        }
                    }
                }
            });

            if let Some(orphan) = Stage::store(&stage, false, first) {
                orphan.cancel_detached();
            }

            Canceler::new(move |done| {
                let previous = mem::replace(&mut *stage.borrow_mut(), Stage::Cancelled);
                match previous {
                    Stage::First(Some(canceler)) | Stage::Second(Some(canceler)) => {
                        canceler.cancel(done)
                    }
                    _ => done(),
                }
            })
        })
    }

    /// Transforms the success value.
    pub fn map<B: 'static>(&self, f: impl Fn(A) -> B + 'static) -> Task<B, E> {
        self.bind(move |result| Next::Ready(result.map(&f)))
    }

    /// Transforms the error value.
    pub fn map_err<E2: 'static>(&self, f: impl Fn(E) -> E2 + 'static) -> Task<A, E2> {
        self.bind(move |result| Next::Ready(result.map_err(&f)))
    }

    /// Sequences a task that depends on this one's result.
    ///
    /// If this task fails or is cancelled, `f` never runs.
    pub fn and_then<B: 'static>(&self, f: impl Fn(A) -> Task<B, E> + 'static) -> Task<B, E> {
        self.bind(move |result| match result {
            Ok(value) => Next::Run(f(value)),
            Err(error) => Next::Ready(Err(error)),
        })
    }

    /// Recovers from a failure with another task.
    pub fn or_else<E2: 'static>(&self, f: impl Fn(E) -> Task<A, E2> + 'static) -> Task<A, E2> {
        self.bind(move |result| match result {
            Ok(value) => Next::Ready(Ok(value)),
            Err(error) => Next::Run(f(error)),
        })
    }

    /// Turns failure into a value; the resulting task only fails if cancelled.
    pub fn attempt<E2: 'static>(&self) -> Task<Result<A, E>, E2> {
        self.bind(|result| Next::Ready(Ok(result)))
    }

    /// Runs `next` after this task succeeds, discarding this task's value.
    pub fn then<B: 'static>(&self, next: Task<B, E>) -> Task<B, E> {
        self.and_then(move |_| next.clone())
    }

    /// Discards the success value.
    pub fn void(&self) -> Task<(), E> {
        self.map(|_| ())
    }

    /// Runs `cleanup` after this task on every exit path, including
    /// cancellation.
    pub fn finally(&self, cleanup: Task<(), E>) -> Task<A, E> {
        let this = self.clone();
        Task::unit().bracket(move |()| cleanup.clone(), move |()| this.clone())
    }

    /// Applies the function produced by `self` to the value of `arg`.
    ///
    /// Both tasks start right away; see [`Task::both`].
    pub fn ap<X: 'static, B: 'static>(&self, arg: &Task<X, E>) -> Task<B, E>
    where
        A: FnOnce(X) -> B,
    {
        self.both(arg).map(|(f, x)| f(x))
    }
}

impl<A: 'static, E: 'static> Task<Task<A, E>, E> {
    /// Runs the task produced by this one.
    pub fn flatten(&self) -> Task<A, E> {
        self.and_then(|inner| inner)
    }
}
