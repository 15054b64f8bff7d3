//! The unit of work consumed by the pipeline

use crate::changes::ExecutionStateChanges;
use crate::error::BoxError;
use crate::fingerprint::FileCollectionFingerprint;
use crate::history::AfterPreviousExecutionState;
use crate::interrupt::InterruptToken;
use crate::{Error, Result};
use cairn_cache::{OriginMetadata, OutputTree};
use chrono::TimeDelta;
use std::collections::{BTreeMap, HashSet};

/// Whether the body of a unit of work actually did something
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Outputs were produced
    DidWork,
    /// The body decided there was nothing to do
    DidNoWork,
}

/// Passed to [`UnitOfWork::execute`]
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Raised when the declared timeout expires
    pub interrupt: InterruptToken,
}

/// One cacheable, skippable computation with declared outputs
///
/// Implementations are created by the caller for each invocation. The
/// pipeline only reads from them, apart from calling `execute` and
/// `persist_result`.
pub trait UnitOfWork: Send + Sync {
    /// Name used in log messages and errors
    fn display_name(&self) -> String;

    /// Stable identity used to key the execution history
    fn identity(&self) -> String;

    /// Report every declared output to `visitor`
    fn visit_outputs(&self, visitor: &mut dyn FnMut(OutputTree));

    /// What changed since the previous execution
    ///
    /// `None` means there is no history to compare against.
    fn changes_since_previous_execution(&self) -> Option<ExecutionStateChanges>;

    /// Run the body
    ///
    /// # Errors
    ///
    /// Returns the body's own failure
    fn execute(&self, request: &ExecutionRequest) -> std::result::Result<WorkOutcome, BoxError>;

    /// Fingerprint the outputs as they exist on disk now
    ///
    /// # Errors
    ///
    /// Returns error if the outputs cannot be read
    fn snapshot_after_outputs_generated(
        &self,
    ) -> std::result::Result<BTreeMap<String, FileCollectionFingerprint>, BoxError>;

    /// Record the result of this execution as the previous execution
    ///
    /// # Errors
    ///
    /// Returns error if the history cannot be written
    fn persist_result(
        &self,
        final_outputs: &BTreeMap<String, FileCollectionFingerprint>,
        success: bool,
        origin: &OriginMetadata,
    ) -> std::result::Result<(), BoxError>;

    /// Maximum run time of the body
    fn timeout(&self) -> Option<TimeDelta> {
        None
    }

    /// Whether stale outputs should be removed before the body runs
    fn delete_outputs_before_execution(&self) -> bool {
        false
    }

    /// Whether another unit of work writes into the same locations
    fn has_overlapping_outputs(&self) -> bool {
        false
    }

    /// State recorded by the previous execution, if any
    fn after_previous_execution_state(&self) -> Option<AfterPreviousExecutionState>;
}

/// Declared outputs of `work`, sorted by name
///
/// # Errors
///
/// Returns error if two outputs share a name or a name is invalid
pub fn collect_outputs(work: &dyn UnitOfWork) -> Result<Vec<OutputTree>> {
    let mut trees = Vec::new();
    work.visit_outputs(&mut |tree| trees.push(tree));

    let mut seen = HashSet::new();
    for tree in &trees {
        if !seen.insert(tree.name.as_str()) {
            return Err(Error::DuplicateOutput {
                work: work.display_name(),
                name: tree.name.clone(),
            });
        }
        tree.validate_name().map_err(|source| Error::Cache {
            work: work.display_name(),
            source,
        })?;
    }
    trees.sort();
    Ok(trees)
}
