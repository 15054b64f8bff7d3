use super::Step;
use crate::context::Context;
use crate::registry::{BuildOutputCleanupRegistry, OutputFilesRepository};
use crate::result::{ExecutionOutcome, ExecutionResult};
use crate::work::{UnitOfWork, collect_outputs};
use crate::{Error, Result};
use cairn_cache::OutputTree;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Removes stale outputs and creates output directories
///
/// Only files the build owns are deleted, and directories of units of work
/// with overlapping outputs are never removed. Deleting anything forces the
/// outcome to [`ExecutionOutcome::Executed`].
#[derive(Debug)]
pub struct PrepareOutputsStep<S> {
    output_files: Arc<dyn OutputFilesRepository>,
    cleanup_registry: Arc<BuildOutputCleanupRegistry>,
    delegate: S,
}

impl<S: Step> PrepareOutputsStep<S> {
    /// Wrap `delegate`
    pub fn new(
        output_files: Arc<dyn OutputFilesRepository>,
        cleanup_registry: Arc<BuildOutputCleanupRegistry>,
        delegate: S,
    ) -> Self {
        Self {
            output_files,
            cleanup_registry,
            delegate,
        }
    }

    fn is_owned(&self, path: &Path) -> bool {
        self.output_files.is_generated_by_build(path)
            || self.cleanup_registry.is_output_owned_by_build(path)
    }

    fn delete_stale_outputs(&self, work: &dyn UnitOfWork) -> Result<usize> {
        let Some(previous) = work.after_previous_execution_state() else {
            return Ok(0);
        };
        let keep_directories = work.has_overlapping_outputs();

        let mut deleted = 0;
        let mut directories = Vec::new();
        for fingerprint in previous.output_fingerprints.values() {
            for file in fingerprint.files() {
                if !file.is_file() || !self.is_owned(file) {
                    continue;
                }
                fs::remove_file(file).map_err(|e| Error::io(e, file, "remove_file"))?;
                debug!(path = %file.display(), "Deleted stale output");
                deleted += 1;
            }
            if !keep_directories {
                directories.extend(fingerprint.directories().filter(|dir| self.is_owned(dir)));
            }
        }

        // Deepest first so that parents are empty by the time they are visited
        directories.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
        for dir in directories {
            if is_empty_dir(dir) {
                fs::remove_dir(dir).map_err(|e| Error::io(e, dir, "remove_dir"))?;
                debug!(path = %dir.display(), "Deleted stale output directory");
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}

fn ensure_output_directories(trees: &[OutputTree]) -> Result<()> {
    for dir in trees.iter().filter_map(OutputTree::directory_to_create) {
        if !dir.is_dir() {
            fs::create_dir_all(dir).map_err(|e| Error::io(e, dir, "create_dir_all"))?;
            debug!(path = %dir.display(), "Created output directory");
        }
    }
    Ok(())
}

impl<S: Step> Step for PrepareOutputsStep<S> {
    fn execute(&self, context: &Context<'_>) -> Result<ExecutionResult> {
        let work = context.work;
        let trees = collect_outputs(work)?;

        let deleted = if work.delete_outputs_before_execution() {
            self.delete_stale_outputs(work)?
        } else {
            0
        };
        if deleted > 0 {
            info!(work = %work.display_name(), deleted, "Cleaned stale outputs");
        }
        ensure_output_directories(&trees)?;

        let mut result = self.delegate.execute(context)?;
        if deleted > 0 && matches!(result.outcome, Ok(ExecutionOutcome::UpToDate)) {
            result.outcome = Ok(ExecutionOutcome::Executed);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoCacheHandler;
    use crate::fingerprint::FileCollectionFingerprint;
    use crate::history::AfterPreviousExecutionState;
    use crate::interrupt::InterruptToken;
    use crate::registry::DefaultOutputFilesRepository;
    use crate::steps::testing::{Fixed, ScriptedWork};
    use cairn_cache::{BuildInvocationId, OriginMetadata};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        out: std::path::PathBuf,
        work: ScriptedWork,
        registry: Arc<BuildOutputCleanupRegistry>,
    }

    /// A previous execution that produced `out/a.txt` and `out/sub/b.txt`
    fn fixture(delete_outputs: bool, overlapping: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        fs::create_dir_all(out.join("sub")).unwrap();
        fs::write(out.join("a.txt"), "A").unwrap();
        fs::write(out.join("sub/b.txt"), "B").unwrap();

        let mut outputs = BTreeMap::new();
        outputs.insert(
            "out".to_string(),
            FileCollectionFingerprint::of_path(&out).unwrap(),
        );
        let mut work = ScriptedWork::new();
        work.outputs = vec![OutputTree::directory("out", &out)];
        work.previous = Some(AfterPreviousExecutionState {
            input_fingerprints: BTreeMap::new(),
            output_fingerprints: outputs,
            origin: OriginMetadata::new(BuildInvocationId::generate(), Duration::ZERO),
            successful: true,
        });
        work.delete_outputs = delete_outputs;
        work.overlapping = overlapping;

        Fixture {
            _temp: temp,
            out,
            work,
            registry: Arc::new(BuildOutputCleanupRegistry::new()),
        }
    }

    fn run(fixture: &Fixture, inner: &Fixed) -> ExecutionResult {
        PrepareOutputsStep::new(
            Arc::new(DefaultOutputFilesRepository::new()),
            fixture.registry.clone(),
            inner,
        )
        .execute(&Context::new(
            &fixture.work,
            &NoCacheHandler,
            InterruptToken::new(),
        ))
        .unwrap()
    }

    #[test]
    fn test_creates_missing_output_directories() {
        let temp = TempDir::new().unwrap();
        let mut work = ScriptedWork::new();
        work.outputs = vec![
            OutputTree::directory("classes", temp.path().join("build/classes")),
            OutputTree::file("jar", temp.path().join("build/libs/app.jar")),
        ];
        let inner = Fixed::new(ExecutionOutcome::Executed);
        PrepareOutputsStep::new(
            Arc::new(DefaultOutputFilesRepository::new()),
            Arc::new(BuildOutputCleanupRegistry::new()),
            &inner,
        )
        .execute(&Context::new(&work, &NoCacheHandler, InterruptToken::new()))
        .unwrap();

        assert!(temp.path().join("build/classes").is_dir());
        assert!(temp.path().join("build/libs").is_dir());
        assert!(!temp.path().join("build/libs/app.jar").exists());
    }

    #[test]
    fn test_deletes_owned_stale_outputs_and_forces_executed() {
        let fixture = fixture(true, false);
        fixture.registry.register_outputs([fixture.out.clone()]);
        let inner = Fixed::new(ExecutionOutcome::UpToDate);

        let result = run(&fixture, &inner);
        assert_eq!(result.outcome(), Some(ExecutionOutcome::Executed));
        assert!(!fixture.out.join("a.txt").exists());
        assert!(!fixture.out.join("sub").exists());
        // The root is recreated for the upcoming execution
        assert!(fixture.out.is_dir());
    }

    #[test]
    fn test_overlapping_outputs_keep_directories() {
        let fixture = fixture(true, true);
        fixture.registry.register_outputs([fixture.out.clone()]);
        fs::write(fixture.out.join("sub/foreign.txt"), "other work").unwrap();
        let inner = Fixed::new(ExecutionOutcome::Executed);

        run(&fixture, &inner);
        assert!(!fixture.out.join("a.txt").exists());
        assert!(!fixture.out.join("sub/b.txt").exists());
        assert!(fixture.out.join("sub").is_dir());
        assert!(fixture.out.join("sub/foreign.txt").exists());
    }

    #[test]
    fn test_files_not_owned_by_build_survive() {
        let fixture = fixture(true, false);
        let inner = Fixed::new(ExecutionOutcome::UpToDate);

        let result = run(&fixture, &inner);
        assert_eq!(result.outcome(), Some(ExecutionOutcome::UpToDate));
        assert!(fixture.out.join("a.txt").exists());
        assert!(fixture.out.join("sub/b.txt").exists());
    }

    #[test]
    fn test_no_deletion_unless_requested() {
        let fixture = fixture(false, false);
        fixture.registry.register_outputs([fixture.out.clone()]);
        let inner = Fixed::new(ExecutionOutcome::UpToDate);

        let result = run(&fixture, &inner);
        assert_eq!(result.outcome(), Some(ExecutionOutcome::UpToDate));
        assert!(fixture.out.join("a.txt").exists());
    }
}
