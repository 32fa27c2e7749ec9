//! Higher-level synchronization built on [`AVar`](crate::AVar).

mod chan;
mod qsem;

pub use chan::Chan;
pub use qsem::{MSem, QSem};
