//! Error types shared by tasks, fibers and synchronization cells.

use std::rc::Rc;

use thiserror::Error;

/// Failure raised inside the runtime.
///
/// Cloning is cheap, so a single error can be fanned out to every operation
/// pending on a killed [`AVar`](crate::AVar).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An application-level failure carrying a message.
    #[error("{0}")]
    Message(Rc<str>),

    /// The fiber being observed was killed before it produced a result.
    #[error("fiber was killed")]
    Killed,

    /// A deadline passed before the guarded task settled.
    #[error("task timed out")]
    Timeout,
}

impl Error {
    /// Builds an [`Error::Message`] from anything printable.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(Rc::from(message.into()))
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Self::Message(Rc::from(message))
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

/// Why [`Runtime::run`](crate::Runtime::run) did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError<E> {
    /// The task settled through its error channel.
    #[error("task failed: {0:?}")]
    Failed(E),

    /// The task was killed before it settled.
    #[error("task was killed")]
    Killed,

    /// No runnable work and no timers remain, yet the task never settled.
    #[error("task can never settle: the runtime has no work left")]
    Stalled,
}

impl<E> RunError<E> {
    /// Returns the application error, if the task failed.
    pub fn into_failure(self) -> Option<E> {
        match self {
            RunError::Failed(error) => Some(error),
            _ => None,
        }
    }
}
