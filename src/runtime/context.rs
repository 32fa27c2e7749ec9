//! Thread-local runtime configuration.
//!
//! The scheduler queue and timer driver are always available on the current
//! thread; what a [`Runtime`](crate::Runtime) contributes while it drives work
//! is its [`Config`]. Fibers consult it when deciding how to report a failure
//! nobody observed.

use std::cell::Cell;

/// Settings chosen through [`RuntimeBuilder`](crate::RuntimeBuilder).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Config {
    /// Jobs run per tick before timers are checked again.
    pub(crate) jobs_per_tick: usize,

    /// If true, an unobserved fiber failure panics on the next scheduler turn
    /// instead of only being logged.
    pub(crate) panic_on_unhandled: bool,
}

impl Config {
    pub(crate) const DEFAULT: Config = Config {
        jobs_per_tick: 256,
        panic_on_unhandled: false,
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

thread_local! {
    /// Configuration of the runtime currently driving this thread.
    ///
    /// Set by [`enter_context`] for the duration of every `block_on`.
    static CURRENT_CONFIG: Cell<Option<Config>> = const { Cell::new(None) };
}

/// Enters a runtime context for the current thread, restoring the previous
/// one when `function` returns.
pub(crate) fn enter_context<F, R>(config: Config, function: F) -> R
where
    F: FnOnce() -> R,
{
    struct Restore(Option<Config>);

    impl Drop for Restore {
        fn drop(&mut self) {
            CURRENT_CONFIG.with(|current| current.set(self.0));
        }
    }

    let _restore = Restore(CURRENT_CONFIG.with(|current| current.replace(Some(config))));
    function()
}

/// Returns the active configuration, or the defaults outside a runtime.
pub(crate) fn current_config() -> Config {
    CURRENT_CONFIG.with(|current| current.get().unwrap_or_default())
}
