//! Fluent builder for Runtime construction.
//!
//! Provides a builder pattern interface for creating and configuring Runtime instances.

use crate::runtime::Runtime;
use crate::runtime::context::Config;

/// Builder for constructing Runtime instances with fluent API.
///
/// # Example
/// ```ignore
/// let rt = RuntimeBuilder::new()
///     .jobs_per_tick(64)
///     .panic_on_unhandled(true)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct RuntimeBuilder {
    config: Config,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a builder holding the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::DEFAULT,
        }
    }

    /// Sets how many scheduler jobs run per tick before timers are checked.
    ///
    /// Values below one are raised to one.
    ///
    /// # Arguments
    /// * `jobs` - Upper bound of jobs run between two timer checks
    pub fn jobs_per_tick(mut self, jobs: usize) -> Self {
        self.config.jobs_per_tick = jobs.max(1);
        self
    }

    /// Makes a fiber failure that nobody joins panic on the next scheduler
    /// turn, instead of only logging it.
    pub fn panic_on_unhandled(mut self, enabled: bool) -> Self {
        self.config.panic_on_unhandled = enabled;
        self
    }

    /// Builds and returns a configured Runtime instance.
    ///
    /// # Returns
    /// A newly constructed Runtime instance
    pub fn build(self) -> Runtime {
        Runtime::with_config(self.config)
    }
}
