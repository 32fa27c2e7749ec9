use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Continuation invoked once a cancellation has fully unwound.
pub type Done = Box<dyn FnOnce()>;

/// Cancels one run of a [`Task`](crate::Task).
///
/// Cancellation is itself asynchronous: release handlers of brackets in scope
/// are tasks, so the caller passes a `done` continuation that fires once all
/// of them have finished. Cancelling a run that already settled calls `done`
/// right away. Dropping a `Canceler` does *not* cancel anything.
pub struct Canceler(Option<Box<dyn FnOnce(Done)>>);

impl Canceler {
    /// A canceler with nothing to undo.
    pub fn noop() -> Self {
        Self(None)
    }

    /// Wraps a cancellation that reports completion through its `Done`.
    pub fn new(cancel: impl FnOnce(Done) + 'static) -> Self {
        Self(Some(Box::new(cancel)))
    }

    /// Wraps a synchronous cleanup action.
    pub fn from_fn(cancel: impl FnOnce() + 'static) -> Self {
        Self::new(move |done| {
            cancel();
            done();
        })
    }

    /// Whether cancelling would do nothing but call `done`.
    pub fn is_noop(&self) -> bool {
        self.0.is_none()
    }

    /// Cancels the run; `done` fires once its cleanup has finished.
    pub fn cancel(self, done: impl FnOnce() + 'static) {
        match self.0 {
            Some(cancel) => cancel(Box::new(done)),
            None => done(),
        }
    }

    /// Cancels without waiting for the cleanup to finish.
    pub fn cancel_detached(self) {
        self.cancel(|| {});
    }

    /// Cancels every canceler at once; `done` fires when the last finishes.
    pub(crate) fn all(cancelers: Vec<Canceler>) -> Canceler {
        let cancelers: Vec<_> = cancelers.into_iter().filter(|c| !c.is_noop()).collect();
        if cancelers.is_empty() {
            return Canceler::noop();
        }

        Canceler::new(move |done| {
            let remaining = Rc::new(Cell::new(cancelers.len()));
            let done = Rc::new(RefCell::new(Some(done)));

            for canceler in cancelers {
                let remaining = remaining.clone();
                let done = done.clone();
                canceler.cancel(move || {
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        let done = done.borrow_mut().take();
                        if let Some(done) = done {
                            done();
                        }
                    }
                });
            }
        })
    }
}

impl Default for Canceler {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Canceler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceler")
            .field("noop", &self.is_noop())
            .finish()
    }
}
