use super::Step;
use crate::Result;
use crate::context::Context;
use crate::error::ExecutionFailure;
use crate::result::{ExecutionOutcome, ExecutionResult};
use crate::work::{ExecutionRequest, WorkOutcome};
use tracing::debug;

/// Runs the body of the unit of work
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteStep;

impl ExecuteStep {
    /// Create the innermost step
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Step for ExecuteStep {
    fn execute(&self, context: &Context<'_>) -> Result<ExecutionResult> {
        let work = context.work;
        let request = ExecutionRequest {
            interrupt: context.interrupt.clone(),
        };

        let outcome = match work.execute(&request) {
            Ok(_) if context.interrupt.is_interrupted() => {
                debug!(work = %work.display_name(), "Execution finished after interrupt");
                Err(ExecutionFailure::Interrupted {
                    work: work.display_name(),
                })
            }
            Ok(WorkOutcome::DidWork) => Ok(ExecutionOutcome::Executed),
            Ok(WorkOutcome::DidNoWork) => Ok(ExecutionOutcome::UpToDate),
            Err(source) => {
                debug!(work = %work.display_name(), error = %source, "Execution failed");
                Err(ExecutionFailure::Work {
                    work: work.display_name(),
                    source,
                })
            }
        };
        Ok(ExecutionResult {
            outcome,
            ..ExecutionResult::success(ExecutionOutcome::Executed)
        })
    }
}
