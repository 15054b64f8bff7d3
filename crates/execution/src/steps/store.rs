use super::Step;
use crate::Result;
use crate::context::Context;
use crate::error::ExecutionFailure;
use crate::fingerprint::FileCollectionFingerprint;
use crate::registry::OutputFilesRepository;
use crate::result::ExecutionResult;
use crate::work::UnitOfWork;
use cairn_cache::OriginMetadata;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Record `final_outputs` as the previous execution and as build-owned files
pub(crate) fn persist_outputs(
    work: &dyn UnitOfWork,
    output_files: &dyn OutputFilesRepository,
    final_outputs: &BTreeMap<String, FileCollectionFingerprint>,
    success: bool,
    origin: &OriginMetadata,
) -> std::result::Result<(), ExecutionFailure> {
    work.persist_result(final_outputs, success, origin)
        .map_err(|source| ExecutionFailure::Persist {
            work: work.display_name(),
            source,
        })?;
    output_files.record_outputs(final_outputs);
    Ok(())
}

/// Persists the snapshot taken by the wrapped step
#[derive(Debug)]
pub struct StoreSnapshotsStep<S> {
    output_files: Arc<dyn OutputFilesRepository>,
    delegate: S,
}

impl<S: Step> StoreSnapshotsStep<S> {
    /// Wrap `delegate`
    pub fn new(output_files: Arc<dyn OutputFilesRepository>, delegate: S) -> Self {
        Self {
            output_files,
            delegate,
        }
    }
}

impl<S: Step> Step for StoreSnapshotsStep<S> {
    fn execute(&self, context: &Context<'_>) -> Result<ExecutionResult> {
        let work = context.work;
        let mut result = self.delegate.execute(context)?;

        if matches!(result.outcome, Err(ExecutionFailure::Snapshot { .. })) {
            debug!(work = %work.display_name(), "No snapshot to store");
            return Ok(result);
        }
        let Some(origin) = result.origin.clone() else {
            debug!(work = %work.display_name(), "No origin, not storing snapshot");
            return Ok(result);
        };

        let success = result.outcome.is_ok();
        if let Err(failure) = persist_outputs(
            work,
            self.output_files.as_ref(),
            &result.final_outputs,
            success,
            &origin,
        ) {
            if success {
                result.outcome = Err(failure);
            } else {
                warn!(
                    work = %work.display_name(),
                    error = %failure,
                    "Failed to store snapshot of failed execution"
                );
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoCacheHandler;
    use crate::interrupt::InterruptToken;
    use crate::registry::DefaultOutputFilesRepository;
    use crate::result::ExecutionOutcome;
    use crate::steps::testing::ScriptedWork;
    use crate::steps::{ExecuteStep, SnapshotOutputsStep};
    use cairn_cache::{BuildInvocationId, OutputTree};
    use std::fs;
    use tempfile::TempDir;

    fn run(work: &ScriptedWork, repo: &Arc<DefaultOutputFilesRepository>) -> ExecutionResult {
        let step = StoreSnapshotsStep::new(
            repo.clone(),
            SnapshotOutputsStep::new(BuildInvocationId::generate(), ExecuteStep::new()),
        );
        step.execute(&Context::new(work, &NoCacheHandler, InterruptToken::new()))
            .unwrap()
    }

    fn work_writing(temp: &TempDir) -> ScriptedWork {
        let out = temp.path().join("out.txt");
        let body_out = out.clone();
        let mut work = ScriptedWork::new().with_body(move |_| {
            fs::write(&body_out, "content")?;
            Ok(crate::work::WorkOutcome::DidWork)
        });
        work.outputs = vec![OutputTree::file("out", out)];
        work
    }

    #[test]
    fn test_successful_execution_is_persisted_and_recorded() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(DefaultOutputFilesRepository::new());
        let work = work_writing(&temp);

        let result = run(&work, &repo);
        assert_eq!(result.outcome(), Some(ExecutionOutcome::Executed));

        let persisted = work.persisted.lock().unwrap();
        assert_eq!(persisted.len(), 1);
        assert!(persisted[0].1);
        assert!(repo.is_generated_by_build(&temp.path().join("out.txt")));
    }

    #[test]
    fn test_failed_execution_is_persisted_as_unsuccessful() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(DefaultOutputFilesRepository::new());
        let work = ScriptedWork {
            outputs: vec![OutputTree::file("out", temp.path().join("out.txt"))],
            ..ScriptedWork::new().with_body(|_| Err("failed".into()))
        };

        let result = run(&work, &repo);
        assert!(!result.is_success());
        let persisted = work.persisted.lock().unwrap();
        assert_eq!(persisted.len(), 1);
        assert!(!persisted[0].1);
    }

    #[test]
    fn test_persist_failure_fails_successful_execution() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(DefaultOutputFilesRepository::new());
        let mut work = work_writing(&temp);
        work.fail_persist = true;

        let result = run(&work, &repo);
        assert!(matches!(
            result.failure_cause(),
            Some(ExecutionFailure::Persist { .. })
        ));
        assert!(repo.is_empty());
    }

    #[test]
    fn test_snapshot_failure_skips_persisting() {
        let repo = Arc::new(DefaultOutputFilesRepository::new());
        let mut work = ScriptedWork::new();
        work.fail_snapshot = true;

        let result = run(&work, &repo);
        assert!(matches!(
            result.failure_cause(),
            Some(ExecutionFailure::Snapshot { .. })
        ));
        assert!(work.persisted.lock().unwrap().is_empty());
    }
}
