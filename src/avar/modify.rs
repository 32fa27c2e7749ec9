//! Take-then-put compositions.
//!
//! Each of these takes the value, works with it, and puts a value back inside
//! a bracket, so the original is restored if the work fails or is killed.
//! A caller killed while its take is still queued just leaves the queue.
//! They are not atomic: a plain `put` from elsewhere can slip in while the
//! cell is empty, and the restoring put then waits behind it.

use super::AVar;
use crate::error::Error;
use crate::task::{Exit, Task};

impl<A: Clone + 'static> AVar<A> {
    /// Runs `f` with the value, putting the original back afterwards.
    pub fn with<B: 'static, E: From<Error> + 'static>(
        &self,
        f: impl Fn(A) -> Task<B, E> + 'static,
    ) -> Task<B, E> {
        let avar = self.clone();
        self.take()
            .general_bracket_interruptible(move |_exit: Exit<'_, B, E>, value| avar.put(value), f)
    }

    /// Replaces the value with the first component produced by `f` and
    /// returns the second. The original is restored if `f` fails or is
    /// killed.
    pub fn modify<B: 'static, E: From<Error> + 'static>(
        &self,
        f: impl Fn(A) -> Task<(A, B), E> + 'static,
    ) -> Task<B, E> {
        let avar = self.clone();
        self.take()
            .general_bracket_interruptible(
                move |exit: Exit<'_, (A, B), E>, original| match exit {
                    Exit::Completed((updated, _)) => avar.put(updated.clone()),
                    Exit::Failed(_) | Exit::Killed => avar.put(original),
                },
                f,
            )
            .map(|(_, result)| result)
    }

    /// Replaces the value with the one produced by `f`.
    pub fn modify_<E: From<Error> + 'static>(
        &self,
        f: impl Fn(A) -> Task<A, E> + 'static,
    ) -> Task<(), E> {
        self.modify(move |value| f(value).map(|updated| (updated, ())))
    }

    /// Puts `value` in and returns the value it replaced.
    pub fn swap<E: From<Error> + 'static>(&self, value: A) -> Task<A, E> {
        self.modify(move |old| Task::pure((value.clone(), old)))
    }
}
