//! Rate limiting for an action.

use crate::avar::AVar;
use crate::error::Error;
use crate::task::{Fiber, Task};

use std::fmt;
use std::time::Duration;

pub struct DebounceSettings {
    action: Task<(), Error>,
    cooldown: Duration,
}

impl DebounceSettings {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

    pub fn new(action: Task<(), Error>) -> Self {
        Self {
            action,
            cooldown: Self::DEFAULT_COOLDOWN,
        }
    }

    /// Sets the pause after each run during which triggers only accumulate.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Runs an action at most once per cooldown, however often it is triggered.
///
/// The first trigger runs the action right away. Triggers arriving during the
/// run or the cooldown after it collapse into a single run once the cooldown
/// ends.
pub struct Debounce {
    baton: AVar<()>,
    fiber: Fiber<(), Error>,
}

impl fmt::Debug for Debounce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounce")
            .field("triggered", &self.baton.is_filled())
            .field("fiber", &self.fiber)
            .finish()
    }
}

impl Debounce {
    pub fn new(settings: DebounceSettings) -> Self {
        let baton = AVar::empty();

        let action = settings.action.attempt().map(|result| {
            if let Err(error) = result {
                tracing::warn!(%error, "debounced action failed");
            }
        });
        let fiber = baton
            .take()
            .then(action)
            .then(Task::delay(settings.cooldown))
            .forever()
            .launch();

        Self { baton, fiber }
    }

    pub fn trigger(&self) {
        if self.baton.try_put(()) {
            tracing::trace!("debounce triggered");
        }
    }

    pub fn kill(&self) -> Task<(), Error> {
        self.fiber.kill()
    }
}
