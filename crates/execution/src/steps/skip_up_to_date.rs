use super::Step;
use crate::Result;
use crate::context::Context;
use crate::result::{ExecutionOutcome, ExecutionResult};
use tracing::{debug, info};

/// Reasons kept on a result; further changes are not reported
const MAX_REASONS: usize = 3;

const NO_HISTORY: &str = "No history is available.";

/// Skips the wrapped step when nothing changed since the previous execution
#[derive(Debug)]
pub struct SkipUpToDateStep<S> {
    delegate: S,
}

impl<S: Step> SkipUpToDateStep<S> {
    /// Wrap `delegate`
    pub const fn new(delegate: S) -> Self {
        Self { delegate }
    }
}

impl<S: Step> Step for SkipUpToDateStep<S> {
    fn execute(&self, context: &Context<'_>) -> Result<ExecutionResult> {
        let work = context.work;
        let Some(changes) = work.changes_since_previous_execution() else {
            info!(work = %work.display_name(), "Executing: no history is available");
            return self.execute_because(context, vec![NO_HISTORY.to_string()]);
        };

        if changes.is_empty() {
            if let Some(previous) = work.after_previous_execution_state() {
                debug!(work = %work.display_name(), "Skipping, outputs are up to date");
                let mut result = ExecutionResult::success(ExecutionOutcome::UpToDate);
                result.final_outputs = previous.output_fingerprints;
                result.origin = Some(previous.origin);
                result.reused_origin = true;
                return Ok(result);
            }
            info!(work = %work.display_name(), "Executing: no previous state is recorded");
            return self.execute_because(context, vec![NO_HISTORY.to_string()]);
        }

        let mut reasons = Vec::with_capacity(MAX_REASONS);
        changes.visit(|change| {
            reasons.push(change.to_string());
            reasons.len() < MAX_REASONS
        });
        info!(
            work = %work.display_name(),
            changes = changes.len(),
            reasons = ?reasons,
            "Executing: not up to date"
        );
        self.execute_because(context, reasons)
    }
}

impl<S: Step> SkipUpToDateStep<S> {
    fn execute_because(
        &self,
        context: &Context<'_>,
        reasons: Vec<String>,
    ) -> Result<ExecutionResult> {
        let mut result = self.delegate.execute(context)?;
        result.out_of_date_reasons = reasons;
        Ok(result)
    }
}
