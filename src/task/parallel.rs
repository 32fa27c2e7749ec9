//! Concurrent combinators.
//!
//! All branches start eagerly, in order. A composite settles exactly once: the
//! losing or still-running branches are cancelled first, and the result is
//! delivered only after their cancellation (and any release handlers it
//! triggers) has finished.

use super::{Callback, Canceler, Task};
use crate::error::Error;

use futures::future::Either;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

struct Branches<T, E> {
    cancelers: Vec<Option<Canceler>>,
    settled: Vec<bool>,
    callback: Option<Callback<T, E>>,
}

impl<T: 'static, E: 'static> Branches<T, E> {
    fn new(len: usize, callback: Callback<T, E>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            cancelers: (0..len).map(|_| None).collect(),
            settled: vec![false; len],
            callback: Some(callback),
        }))
    }

    fn is_open(&self) -> bool {
        self.callback.is_some()
    }

    /// Stores the canceler of branch `index` after it started; cancels it
    /// instead if the composite closed while the branch was starting.
    fn started(this: &RefCell<Self>, index: usize, canceler: Canceler) {
        let orphan = {
            let mut branches = this.borrow_mut();
            if branches.settled[index] {
                None
            } else if branches.is_open() {
                branches.cancelers[index] = Some(canceler);
                None
            } else {
                Some(canceler)
            }
        };

        if let Some(orphan) = orphan {
            orphan.cancel_detached();
        }
    }

    /// Closes the composite, returning the callback and a canceler for every
    /// branch that has not settled yet.
    fn close(&mut self) -> Option<(Callback<T, E>, Canceler)> {
        let callback = self.callback.take()?;
        let running = self.cancelers.iter_mut().filter_map(Option::take).collect();
        Some((callback, Canceler::all(running)))
    }

    fn canceler(this: Rc<RefCell<Self>>) -> Canceler {
        Canceler::new(move |done| {
            let closed = this.borrow_mut().close();
            match closed {
                Some((callback, running)) => {
                    drop(callback);
                    running.cancel(done);
                }
                None => done(),
            }
        })
    }
}

impl<A: 'static, E: 'static> Task<A, E> {
    /// Runs every task concurrently and collects their values in order.
    ///
    /// The first failure cancels the remaining branches and fails the whole.
    pub fn parallel(tasks: Vec<Task<A, E>>) -> Task<Vec<A>, E> {
        Task::from_raw(move |callback| {
            if tasks.is_empty() {
                callback(Ok(Vec::new()));
                return Canceler::noop();
            }

            let branches = Branches::new(tasks.len(), callback);
            let values: Rc<RefCell<Vec<Option<A>>>> =
                Rc::new(RefCell::new((0..tasks.len()).map(|_| None).collect()));

            for (index, task) in tasks.iter().enumerate() {
                if !branches.borrow().is_open() {
                    break;
                }

                let br = branches.clone();
                let values = values.clone();
                let canceler = task.run(move |result| {
                    let mut state = br.borrow_mut();
                    if !state.is_open() {
                        return;
                    }
                    state.settled[index] = true;
                    state.cancelers[index] = None;

                    match result {
                        Ok(value) => {
                            values.borrow_mut()[index] = Some(value);
                            if state.settled.iter().all(|settled| *settled) {
                                let callback = state.callback.take();
                                drop(state);
                                let collected = values.borrow_mut().drain(..).flatten().collect();
                                if let Some(callback) = callback {
                                    callback(Ok(collected));
                                }
                            }
                        }
                        Err(error) => {
                            let closed = state.close();
                            drop(state);
                            if let Some((callback, running)) = closed {
                                running.cancel(move || callback(Err(error)));
                            }
                        }
                    }
                });

                Branches::started(&branches, index, canceler);
            }

            Branches::canceler(branches)
        })
    }

    /// Runs both tasks concurrently and pairs their values.
    pub fn both<B: 'static>(&self, other: &Task<B, E>) -> Task<(A, B), E> {
        let left = self.map(Either::Left);
        let right = other.map(Either::Right);

        Task::parallel(vec![left, right]).map(|values| {
            let mut values = values.into_iter();
            match (values.next(), values.next()) {
                (Some(Either::Left(a)), Some(Either::Right(b))) => (a, b),
                _ => unreachable!("parallel preserves branch order"),
            }
        })
    }

    /// Settles with whichever task settles first, success or failure, after
    /// cancelling the others. An empty race never settles.
    pub fn race(tasks: Vec<Task<A, E>>) -> Task<A, E> {
        Task::from_raw(move |callback| {
            let branches = Branches::new(tasks.len(), callback);

            for (index, task) in tasks.iter().enumerate() {
                if !branches.borrow().is_open() {
                    break;
                }

                let br = branches.clone();
                let canceler = task.run(move |result| {
                    let closed = {
                        let mut state = br.borrow_mut();
                        if !state.is_open() {
                            return;
                        }
                        state.settled[index] = true;
                        state.cancelers[index] = None;
                        state.close()
                    };

                    if let Some((callback, losers)) = closed {
                        losers.cancel(move || callback(result));
                    }
                });

                Branches::started(&branches, index, canceler);
            }

            Branches::canceler(branches)
        })
    }

    /// Races two tasks of different types, tagging the winner.
    pub fn compete<B: 'static>(&self, other: &Task<B, E>) -> Task<Either<A, B>, E> {
        Task::race(vec![self.map(Either::Left), other.map(Either::Right)])
    }

    /// Fails with [`Error::Timeout`] unless this task settles within `duration`.
    pub fn timeout(&self, duration: Duration) -> Task<A, E>
    where
        E: From<Error>,
    {
        let deadline = Task::delay(duration).and_then(|()| Task::lazy(|| Err(Error::Timeout.into())));
        Task::race(vec![self.clone(), deadline])
    }
}
