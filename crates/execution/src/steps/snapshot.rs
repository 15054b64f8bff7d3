use super::Step;
use crate::Result;
use crate::context::Context;
use crate::error::ExecutionFailure;
use crate::result::ExecutionResult;
use cairn_cache::{BuildInvocationId, OriginMetadata};
use std::time::Instant;
use tracing::{debug, warn};

/// Fingerprints the outputs after the wrapped step ran
///
/// The snapshot is taken even when execution failed so that partially
/// written outputs are accounted for. The result is stamped with the
/// current build invocation and the time the wrapped step took.
#[derive(Debug)]
pub struct SnapshotOutputsStep<S> {
    build_id: BuildInvocationId,
    delegate: S,
}

impl<S: Step> SnapshotOutputsStep<S> {
    /// Wrap `delegate`
    pub const fn new(build_id: BuildInvocationId, delegate: S) -> Self {
        Self { build_id, delegate }
    }
}

impl<S: Step> Step for SnapshotOutputsStep<S> {
    fn execute(&self, context: &Context<'_>) -> Result<ExecutionResult> {
        let work = context.work;
        let start = Instant::now();
        let mut result = self.delegate.execute(context)?;
        let elapsed = start.elapsed();

        result.origin = Some(OriginMetadata::new(self.build_id, elapsed));
        result.reused_origin = false;
        match work.snapshot_after_outputs_generated() {
            Ok(fingerprints) => {
                debug!(
                    work = %work.display_name(),
                    properties = fingerprints.len(),
                    elapsed_ms = elapsed.as_millis(),
                    "Snapshotted outputs"
                );
                result.final_outputs = fingerprints;
            }
            Err(source) => {
                if result.outcome.is_ok() {
                    result.outcome = Err(ExecutionFailure::Snapshot {
                        work: work.display_name(),
                        source,
                    });
                } else {
                    warn!(
                        work = %work.display_name(),
                        error = %source,
                        "Failed to snapshot outputs after failed execution"
                    );
                }
            }
        }
        Ok(result)
    }
}
