//! Long-running helpers built on fibers and AVars.

mod auto_update;
mod debounce;
mod reaper;

pub use auto_update::{AutoUpdate, UpdateSettings};
pub use debounce::{Debounce, DebounceSettings};
pub use reaper::{Merge, Reaper, ReaperSettings};
