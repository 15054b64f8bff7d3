//! Pipeline steps
//!
//! Every step handles one concern and delegates to the step it wraps. The
//! full chain is assembled by [`ExecutionPipeline`](crate::ExecutionPipeline):
//!
//! ```text
//! Timeout -> Cache -> PrepareOutputs -> SkipUpToDate -> StoreSnapshots -> SnapshotOutputs -> Execute
//! ```

mod cache;
mod execute;
mod prepare_outputs;
mod skip_up_to_date;
mod snapshot;
mod store;
mod timeout;

pub use cache::CacheStep;
pub use execute::ExecuteStep;
pub use prepare_outputs::PrepareOutputsStep;
pub use skip_up_to_date::SkipUpToDateStep;
pub use snapshot::SnapshotOutputsStep;
pub use store::StoreSnapshotsStep;
pub use timeout::TimeoutStep;

pub(crate) use store::persist_outputs;

use crate::Result;
use crate::context::Context;
use crate::result::ExecutionResult;

/// One stage of the execution pipeline
///
/// `Err` is reserved for fatal errors that abort the invocation. Failures of
/// the unit of work are reported inside the [`ExecutionResult`].
pub trait Step: Send + Sync {
    /// Run this step and everything it wraps
    ///
    /// # Errors
    ///
    /// Returns error if the invocation has to be aborted
    fn execute(&self, context: &Context<'_>) -> Result<ExecutionResult>;
}

impl<S: Step + ?Sized> Step for &S {
    fn execute(&self, context: &Context<'_>) -> Result<ExecutionResult> {
        (**self).execute(context)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted unit of work and steps shared by the step tests

    use crate::changes::ExecutionStateChanges;
    use crate::error::BoxError;
    use crate::fingerprint::{FileCollectionFingerprint, fingerprint_outputs};
    use crate::history::AfterPreviousExecutionState;
    use crate::result::{ExecutionOutcome, ExecutionResult};
    use crate::work::{ExecutionRequest, UnitOfWork, WorkOutcome};
    use crate::{Context, Result, Step};
    use cairn_cache::{OriginMetadata, OutputTree};
    use chrono::TimeDelta;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Body =
        Box<dyn Fn(&ExecutionRequest) -> std::result::Result<WorkOutcome, BoxError> + Send + Sync>;

    /// A unit of work whose every answer is configured by the test
    pub struct ScriptedWork {
        pub outputs: Vec<OutputTree>,
        pub changes: Option<ExecutionStateChanges>,
        pub previous: Option<AfterPreviousExecutionState>,
        pub timeout: Option<TimeDelta>,
        pub delete_outputs: bool,
        pub overlapping: bool,
        pub fail_snapshot: bool,
        pub fail_persist: bool,
        pub body: Body,
        pub executions: AtomicUsize,
        pub persisted: Mutex<Vec<(BTreeMap<String, FileCollectionFingerprint>, bool)>>,
    }

    impl ScriptedWork {
        pub fn new() -> Self {
            Self {
                outputs: Vec::new(),
                changes: None,
                previous: None,
                timeout: None,
                delete_outputs: false,
                overlapping: false,
                fail_snapshot: false,
                fail_persist: false,
                body: Box::new(|_| Ok(WorkOutcome::DidWork)),
                executions: AtomicUsize::new(0),
                persisted: Mutex::new(Vec::new()),
            }
        }

        pub fn with_body(
            mut self,
            body: impl Fn(&ExecutionRequest) -> std::result::Result<WorkOutcome, BoxError>
            + Send
            + Sync
            + 'static,
        ) -> Self {
            self.body = Box::new(body);
            self
        }

        pub fn executions(&self) -> usize {
            self.executions.load(Ordering::SeqCst)
        }
    }

    impl UnitOfWork for ScriptedWork {
        fn display_name(&self) -> String {
            "task ':scripted'".to_string()
        }

        fn identity(&self) -> String {
            ":scripted".to_string()
        }

        fn visit_outputs(&self, visitor: &mut dyn FnMut(OutputTree)) {
            for tree in &self.outputs {
                visitor(tree.clone());
            }
        }

        fn changes_since_previous_execution(&self) -> Option<ExecutionStateChanges> {
            self.changes.clone()
        }

        fn execute(
            &self,
            request: &ExecutionRequest,
        ) -> std::result::Result<WorkOutcome, BoxError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            (self.body)(request)
        }

        fn snapshot_after_outputs_generated(
            &self,
        ) -> std::result::Result<BTreeMap<String, FileCollectionFingerprint>, BoxError> {
            if self.fail_snapshot {
                return Err("snapshot failed".into());
            }
            Ok(fingerprint_outputs(self)?)
        }

        fn persist_result(
            &self,
            final_outputs: &BTreeMap<String, FileCollectionFingerprint>,
            success: bool,
            _origin: &OriginMetadata,
        ) -> std::result::Result<(), BoxError> {
            if self.fail_persist {
                return Err("history is read-only".into());
            }
            self.persisted
                .lock()
                .unwrap()
                .push((final_outputs.clone(), success));
            Ok(())
        }

        fn timeout(&self) -> Option<TimeDelta> {
            self.timeout
        }

        fn delete_outputs_before_execution(&self) -> bool {
            self.delete_outputs
        }

        fn has_overlapping_outputs(&self) -> bool {
            self.overlapping
        }

        fn after_previous_execution_state(&self) -> Option<AfterPreviousExecutionState> {
            self.previous.clone()
        }
    }

    /// Innermost step returning a fixed outcome and counting calls
    pub struct Fixed {
        pub outcome: ExecutionOutcome,
        pub calls: AtomicUsize,
    }

    impl Fixed {
        pub const fn new(outcome: ExecutionOutcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Step for Fixed {
        fn execute(&self, _context: &Context<'_>) -> Result<ExecutionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionResult::success(self.outcome))
        }
    }
}
