//! Cooperative concurrency on a single thread.
//!
//! This crate provides cancellable tasks and the synchronization cells built
//! on top of them. Nothing here is `Send`: all work runs on the thread that
//! drives the [`Runtime`], interleaved at well-defined suspension points.
//!
//! # Architecture
//!
//! - **Task**: a reusable description of a cancellable computation, composed
//!   with `map`, `and_then`, `bracket`, `race`, `parallel` and friends
//! - **Fiber**: handle to a detached run of a task that can be joined or killed
//! - **AVar**: a single-slot cell whose `take`/`put`/`read` block in FIFO order
//! - **QSem / Chan**: a fair semaphore and an unbounded channel made of AVars
//! - **Reaper / AutoUpdate / Debounce**: background loops for batching,
//!   caching and rate limiting
//! - **Runtime**: the event loop running scheduled jobs and timers, configured
//!   through **RuntimeBuilder**
//!
//! ```ignore
//! use coop::{AVar, Error, Runtime, Task};
//!
//! let avar = AVar::empty();
//! let consumer = avar.take::<Error>().map(|n: u32| n + 1);
//! let producer = avar.put::<Error>(41);
//!
//! let mut rt = Runtime::new();
//! let fiber = rt.spawn(consumer);
//! rt.run(producer).unwrap();
//! assert_eq!(rt.run(fiber.join()), Ok(42));
//! ```

mod avar;
mod background;
mod builder;
mod error;
mod runtime;
mod sync;
mod task;
mod timer;
mod utils;

pub use avar::{AVar, Pending, Status};
pub use background::{
    AutoUpdate, Debounce, DebounceSettings, Merge, Reaper, ReaperSettings, UpdateSettings,
};
pub use builder::RuntimeBuilder;
pub use error::{Error, RunError};
pub use runtime::Runtime;
pub use sync::{Chan, MSem, QSem};
pub use task::{Callback, Canceler, Done, Exit, Fiber, FiberId, Outcome, Step, Task, TaskFuture};

pub use futures::future::Either;
