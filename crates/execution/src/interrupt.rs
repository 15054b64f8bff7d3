//! Cooperative interruption of a running unit of work

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct State {
    interrupted: Mutex<bool>,
    signal: Condvar,
}

/// Interrupt flag shared between a unit of work and its timeout watchdog
///
/// Bodies that can run for a long time should poll
/// [`is_interrupted`](Self::is_interrupted) or block in
/// [`wait_timeout`](Self::wait_timeout) so that an expired timeout can stop
/// them early.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    state: Arc<State>,
}

impl InterruptToken {
    /// Create a token that is not interrupted
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt and wake every waiter
    pub fn interrupt(&self) {
        let mut interrupted = self
            .state
            .interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *interrupted = true;
        self.state.signal.notify_all();
    }

    /// Whether the interrupt is raised
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        *self
            .state
            .interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lower the interrupt
    pub fn clear(&self) {
        *self
            .state
            .interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Sleep for up to `duration`, returning early if interrupted
    ///
    /// Returns `true` if the interrupt was raised.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut interrupted = self
            .state
            .interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*interrupted {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            interrupted = self
                .state
                .signal
                .wait_timeout(interrupted, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}
