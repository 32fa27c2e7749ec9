//! Runtime subsystem modules.

pub(crate) mod context;
mod core;
pub(crate) mod queue;
pub(crate) mod waker;

pub use core::Runtime;
