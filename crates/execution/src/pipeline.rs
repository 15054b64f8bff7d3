//! The assembled execution pipeline

use crate::Result;
use crate::context::Context;
use crate::registry::{BuildOutputCleanupRegistry, OutputFilesRepository};
use crate::result::ExecutionResult;
use crate::steps::{
    CacheStep, ExecuteStep, PrepareOutputsStep, SkipUpToDateStep, SnapshotOutputsStep, Step,
    StoreSnapshotsStep, TimeoutStep,
};
use cairn_cache::{BuildCacheController, BuildInvocationId};
use std::sync::Arc;
use tracing::{debug, instrument};

type Snapshots = StoreSnapshotsStep<SnapshotOutputsStep<ExecuteStep>>;
type Chain = TimeoutStep<CacheStep<PrepareOutputsStep<SkipUpToDateStep<Snapshots>>>>;

/// Build-wide services shared by every invocation of the pipeline
///
/// Created once per build invocation and dropped when the build ends.
#[derive(Clone)]
pub struct ExecutionServices {
    /// Build cache
    pub controller: Arc<dyn BuildCacheController>,
    /// Files generated by previous executions
    pub output_files: Arc<dyn OutputFilesRepository>,
    /// Output locations owned by the build
    pub cleanup_registry: Arc<BuildOutputCleanupRegistry>,
    /// Identity of the current build invocation
    pub build_id: BuildInvocationId,
}

impl std::fmt::Debug for ExecutionServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionServices")
            .field("cache_enabled", &self.controller.is_enabled())
            .field("cleanup_registry", &self.cleanup_registry)
            .field("build_id", &self.build_id)
            .finish_non_exhaustive()
    }
}

/// Runs units of work through every pipeline step
///
/// ```text
/// Timeout -> Cache -> PrepareOutputs -> SkipUpToDate -> StoreSnapshots -> SnapshotOutputs -> Execute
/// ```
///
/// The pipeline holds no per-invocation state; one instance can serve
/// concurrent invocations for different units of work.
#[derive(Debug)]
pub struct ExecutionPipeline {
    chain: Chain,
}

impl ExecutionPipeline {
    /// Assemble the pipeline
    #[must_use]
    pub fn new(services: ExecutionServices) -> Self {
        let ExecutionServices {
            controller,
            output_files,
            cleanup_registry,
            build_id,
        } = services;

        let chain = TimeoutStep::new(CacheStep::new(
            controller,
            output_files.clone(),
            PrepareOutputsStep::new(
                output_files.clone(),
                cleanup_registry,
                SkipUpToDateStep::new(StoreSnapshotsStep::new(
                    output_files,
                    SnapshotOutputsStep::new(build_id, ExecuteStep::new()),
                )),
            ),
        ));
        Self { chain }
    }

    /// Execute the unit of work of `context`
    ///
    /// # Errors
    ///
    /// Returns error for fatal problems: an invalid timeout, invalid output
    /// declarations, output preparation failures, or a cache load that left
    /// outputs in an unknown state. Failures of the work itself are reported
    /// in the returned result.
    #[instrument(name = "execute_work", skip_all, fields(work = %context.work.display_name()))]
    pub fn execute(&self, context: &Context<'_>) -> Result<ExecutionResult> {
        let result = self.chain.execute(context)?;
        match &result.outcome {
            Ok(outcome) => debug!(%outcome, "Execution finished"),
            Err(failure) => debug!(%failure, "Execution failed"),
        }
        Ok(result)
    }
}
