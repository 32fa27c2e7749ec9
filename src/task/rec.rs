//! Stack-safe loops.

use super::{Callback, Canceler, Task};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// One iteration of [`Task::chain_rec`]: keep looping with a new seed, or stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<S, A> {
    Loop(S),
    Done(A),
}

type StepFn<S, A, E> = Rc<dyn Fn(S) -> Task<Step<S, A>, E>>;

struct Rec<S, A, E> {
    step: StepFn<S, A, E>,
    callback: Option<Callback<A, E>>,
    current: Option<Canceler>,
}

impl<S, A, E> Rec<S, A, E> {
    fn is_cancelled(&self) -> bool {
        self.callback.is_none()
    }
}

impl<A: 'static, E: 'static> Task<A, E> {
    /// Runs `step` from `init` until it produces [`Step::Done`].
    ///
    /// Steps that settle synchronously are iterated in a loop rather than by
    /// recursion, so the stack stays flat however many iterations run.
    pub fn chain_rec<S: Clone + 'static>(
        init: S,
        step: impl Fn(S) -> Task<Step<S, A>, E> + 'static,
    ) -> Task<A, E> {
        let step: StepFn<S, A, E> = Rc::new(step);

        Task::from_raw(move |callback| {
            let state = Rc::new(RefCell::new(Rec {
                step: step.clone(),
                callback: Some(callback),
                current: None,
            }));
            drive(&state, init.clone());

            Canceler::new(move |done| {
                let current = {
                    let mut rec = state.borrow_mut();
                    rec.callback = None;
                    rec.current.take()
                };
                match current {
                    Some(canceler) => canceler.cancel(done),
                    None => done(),
                }
            })
        })
    }

    /// Repeats this task until it fails or is cancelled.
    pub fn forever<B: 'static>(&self) -> Task<B, E> {
        let this = self.clone();
        Task::chain_rec((), move |()| this.map(|_| Step::Loop(())))
    }
}

fn drive<S: 'static, A: 'static, E: 'static>(state: &Rc<RefCell<Rec<S, A, E>>>, init: S) {
    let mut seed = init;

    loop {
        let step = state.borrow().step.clone();
        let in_sync = Rc::new(Cell::new(true));
        let slot = Rc::new(RefCell::new(None));

        let st = state.clone();
        let sync = in_sync.clone();
        let early = slot.clone();
        let canceler = step(seed).run(move |result| {
            if sync.get() {
                *early.borrow_mut() = Some(result);
            } else {
                resume(&st, result);
            }
        });
        in_sync.set(false);

        let result = slot.borrow_mut().take();
        match result {
            Some(Ok(Step::Loop(next))) => {
                if state.borrow().is_cancelled() {
                    return;
                }
                seed = next;
            }
            Some(settled) => {
                deliver(state, settled);
                return;
            }
            None => {
                let orphan = {
                    let mut rec = state.borrow_mut();
                    if rec.is_cancelled() {
                        Some(canceler)
                    } else {
                        rec.current = Some(canceler);
                        None
                    }
                };
                if let Some(orphan) = orphan {
                    orphan.cancel_detached();
                }
                return;
            }
        }
    }
}

fn resume<S: 'static, A: 'static, E: 'static>(
    state: &Rc<RefCell<Rec<S, A, E>>>,
    result: Result<Step<S, A>, E>,
) {
    {
        let mut rec = state.borrow_mut();
        if rec.is_cancelled() {
            return;
        }
        rec.current = None;
    }

    match result {
        Ok(Step::Loop(next)) => drive(state, next),
        settled => deliver(state, settled),
    }
}

fn deliver<S, A, E>(state: &RefCell<Rec<S, A, E>>, result: Result<Step<S, A>, E>) {
    let callback = state.borrow_mut().callback.take();
    let Some(callback) = callback else {
        return;
    };
    match result {
        Ok(Step::Done(value)) => callback(Ok(value)),
        Err(error) => callback(Err(error)),
        Ok(Step::Loop(_)) => unreachable!("loop steps are handled by the driver"),
    }
}
