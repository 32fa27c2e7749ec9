//! Bridge from tasks to [`Future`]s.

use super::{Canceler, Task};
use crate::error::RunError;

use futures::channel::oneshot;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

/// A run of a [`Task`] observed as a [`Future`].
///
/// The run starts on first poll. Dropping the future before it resolved
/// cancels the run.
pub struct TaskFuture<A, E> {
    task: Option<Task<A, E>>,
    receiver: Option<oneshot::Receiver<Result<A, E>>>,
    canceler: Option<Canceler>,
}

impl<A: 'static, E: 'static> Task<A, E> {
    /// Observes the terminal result of one run as a future.
    pub fn to_future(&self) -> TaskFuture<A, E> {
        TaskFuture {
            task: Some(self.clone()),
            receiver: None,
            canceler: None,
        }
    }
}

impl<A: 'static, E: 'static> IntoFuture for Task<A, E> {
    type Output = Result<A, RunError<E>>;
    type IntoFuture = TaskFuture<A, E>;

    fn into_future(self) -> Self::IntoFuture {
        TaskFuture {
            task: Some(self),
            receiver: None,
            canceler: None,
        }
    }
}

impl<A: 'static, E: 'static> Future for TaskFuture<A, E> {
    type Output = Result<A, RunError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(task) = this.task.take() {
            let (sender, receiver) = oneshot::channel();
            this.receiver = Some(receiver);
            this.canceler = Some(task.run(move |result| {
                let _ = sender.send(result);
            }));
        }

        let Some(receiver) = this.receiver.as_mut() else {
            panic!("TaskFuture polled after completion");
        };

        let output = match Pin::new(receiver).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(Ok(value))) => Ok(value),
            Poll::Ready(Ok(Err(error))) => Err(RunError::Failed(error)),
            // the run dropped its continuation: it was cancelled
            Poll::Ready(Err(oneshot::Canceled)) => Err(RunError::Killed),
        };

        this.receiver = None;
        this.canceler = None;
        Poll::Ready(output)
    }
}

impl<A, E> Drop for TaskFuture<A, E> {
    fn drop(&mut self) {
        if let Some(canceler) = self.canceler.take() {
            canceler.cancel_detached();
        }
    }
}

impl<A, E> fmt::Debug for TaskFuture<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("started", &self.task.is_none())
            .field("settled", &(self.task.is_none() && self.receiver.is_none()))
            .finish()
    }
}
