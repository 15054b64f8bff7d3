use super::Step;
use crate::context::Context;
use crate::error::ExecutionFailure;
use crate::interrupt::InterruptToken;
use crate::result::ExecutionResult;
use crate::{Error, Result};
use chrono::TimeDelta;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Enforces the timeout declared by the unit of work
///
/// A watchdog thread raises the context's interrupt when the timeout
/// expires. An unsuccessful result returned afterwards is replaced by a
/// timeout failure.
#[derive(Debug)]
pub struct TimeoutStep<S> {
    delegate: S,
}

impl<S: Step> TimeoutStep<S> {
    /// Wrap `delegate`
    pub const fn new(delegate: S) -> Self {
        Self { delegate }
    }
}

impl<S: Step> Step for TimeoutStep<S> {
    fn execute(&self, context: &Context<'_>) -> Result<ExecutionResult> {
        let work = context.work;
        let Some(timeout) = work.timeout() else {
            return self.delegate.execute(context);
        };
        if timeout < TimeDelta::zero() {
            return Err(Error::InvalidTimeout {
                work: work.display_name(),
                timeout,
            });
        }
        let Ok(duration) = timeout.to_std() else {
            return self.delegate.execute(context);
        };
        if duration.is_zero() {
            return self.delegate.execute(context);
        }

        let watchdog = Watchdog::start(&work.display_name(), duration, context.interrupt.clone())
            .map_err(|e| Error::Io {
                source: e,
                path: None,
                operation: "spawn watchdog".to_string(),
            })?;
        let result = self.delegate.execute(context);
        if !watchdog.stop() {
            return result;
        }

        context.interrupt.clear();
        let mut result = result?;
        if result.is_success() {
            // Watchdog fired after the body returned
            debug!(work = %work.display_name(), %timeout, "Timeout expired after completion");
            return Ok(result);
        }
        warn!(work = %work.display_name(), %timeout, "Timeout has been exceeded");
        result.outcome = Err(ExecutionFailure::TimeoutExceeded {
            work: work.display_name(),
            timeout,
        });
        Ok(result)
    }
}

struct Watchdog {
    done: Sender<()>,
    handle: JoinHandle<bool>,
}

impl Watchdog {
    fn start(name: &str, duration: Duration, interrupt: InterruptToken) -> std::io::Result<Self> {
        let (done, finished) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(format!("timeout {name}"))
            .spawn(move || match finished.recv_timeout(duration) {
                Err(RecvTimeoutError::Timeout) => {
                    interrupt.interrupt();
                    true
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
            })?;
        debug!(timeout_ms = duration.as_millis(), "Started timeout watchdog");
        Ok(Self { done, handle })
    }

    /// Stop the watchdog, returning whether it fired
    fn stop(self) -> bool {
        let _ = self.done.send(());
        self.handle.join().unwrap_or(false)
    }
}
