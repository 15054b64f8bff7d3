use super::{Step, persist_outputs};
use crate::context::Context;
use crate::error::ExecutionFailure;
use crate::registry::OutputFilesRepository;
use crate::result::{ExecutionOutcome, ExecutionResult};
use crate::work::collect_outputs;
use crate::{Error, Result};
use cairn_cache::{BuildCacheController, CacheLoad, OriginMetadata, OutputTree, StoreCommand};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Loads outputs from the build cache, or executes and stores them
///
/// A failed load that may have left outputs half written aborts the
/// invocation. Every other cache problem only costs the cache hit.
pub struct CacheStep<S> {
    controller: Arc<dyn BuildCacheController>,
    output_files: Arc<dyn OutputFilesRepository>,
    delegate: S,
}

impl<S: Step> CacheStep<S> {
    /// Wrap `delegate`
    pub fn new(
        controller: Arc<dyn BuildCacheController>,
        output_files: Arc<dyn OutputFilesRepository>,
        delegate: S,
    ) -> Self {
        Self {
            controller,
            output_files,
            delegate,
        }
    }

    fn from_cache(&self, context: &Context<'_>, origin: OriginMetadata) -> ExecutionResult {
        let work = context.work;
        let mut result = ExecutionResult::success(ExecutionOutcome::FromCache);
        match work.snapshot_after_outputs_generated() {
            Ok(fingerprints) => {
                if let Err(failure) =
                    persist_outputs(work, self.output_files.as_ref(), &fingerprints, true, &origin)
                {
                    result.outcome = Err(failure);
                }
                result.final_outputs = fingerprints;
            }
            Err(source) => {
                result.outcome = Err(ExecutionFailure::Snapshot {
                    work: work.display_name(),
                    source,
                });
            }
        }
        result.origin = Some(origin);
        result.reused_origin = true;
        result
    }

    fn store(&self, context: &Context<'_>, trees: &[OutputTree], result: &ExecutionResult) {
        let work = context.work;
        let Some(origin) = result.origin.clone() else {
            debug!(work = %work.display_name(), "No origin, not storing in cache");
            return;
        };
        context.cache_handler.store(&mut |key| {
            let command = StoreCommand::new(*key, trees.to_vec(), origin.clone());
            match self.controller.store(&command) {
                Ok(()) => debug!(work = %work.display_name(), key = %key, "Stored in cache"),
                Err(e) => warn!(
                    work = %work.display_name(),
                    key = %key,
                    error = %e,
                    "Failed to store outputs in cache"
                ),
            }
        });
    }
}

impl<S: Step> Step for CacheStep<S> {
    fn execute(&self, context: &Context<'_>) -> Result<ExecutionResult> {
        if !self.controller.is_enabled() {
            return self.delegate.execute(context);
        }
        let work = context.work;
        let trees = collect_outputs(work)?;

        let load = context
            .cache_handler
            .load(&mut |key| self.controller.load(key, &trees));
        match load {
            CacheLoad::Hit(metadata) => {
                info!(
                    work = %work.display_name(),
                    entries = metadata.entries,
                    "Loaded outputs from cache"
                );
                return Ok(self.from_cache(context, metadata.origin));
            }
            CacheLoad::Fatal(source) => {
                return Err(Error::Cache {
                    work: work.display_name(),
                    source,
                });
            }
            CacheLoad::Recoverable(e) => {
                warn!(
                    work = %work.display_name(),
                    error = %e,
                    "Failed to load cache entry, executing instead"
                );
            }
            CacheLoad::Miss => debug!(work = %work.display_name(), "No cache entry"),
        }

        let result = self.delegate.execute(context)?;
        if result.is_success() {
            self.store(context, &trees, &result);
        } else {
            debug!(work = %work.display_name(), "Not storing outputs of failed execution in cache");
        }
        Ok(result)
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for CacheStep<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStep")
            .field("enabled", &self.controller.is_enabled())
            .field("delegate", &self.delegate)
            .finish_non_exhaustive()
    }
}
