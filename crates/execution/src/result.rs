//! Result of running a unit of work through the pipeline

use crate::error::ExecutionFailure;
use crate::fingerprint::FileCollectionFingerprint;
use cairn_cache::OriginMetadata;
use std::collections::BTreeMap;
use std::fmt;

/// How a successful execution was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The body ran and did work
    Executed,
    /// Nothing had to be done
    UpToDate,
    /// Outputs were restored from the build cache
    FromCache,
}

impl ExecutionOutcome {
    /// Whether the body actually ran
    #[must_use]
    pub const fn did_work(self) -> bool {
        matches!(self, Self::Executed)
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executed => f.write_str("EXECUTED"),
            Self::UpToDate => f.write_str("UP-TO-DATE"),
            Self::FromCache => f.write_str("FROM-CACHE"),
        }
    }
}

/// What the pipeline reports back for one unit of work
#[derive(Debug)]
pub struct ExecutionResult {
    /// Outcome, or why the execution did not succeed
    pub outcome: Result<ExecutionOutcome, ExecutionFailure>,
    /// Fingerprints of the outputs after execution, by property name
    pub final_outputs: BTreeMap<String, FileCollectionFingerprint>,
    /// Which build produced the outputs
    pub origin: Option<OriginMetadata>,
    /// Whether `origin` came from an earlier build
    pub reused_origin: bool,
    /// Why the unit of work was not up to date
    pub out_of_date_reasons: Vec<String>,
}

impl ExecutionResult {
    /// A successful result without snapshots
    #[must_use]
    pub fn success(outcome: ExecutionOutcome) -> Self {
        Self::from_outcome(Ok(outcome))
    }

    /// A failed result without snapshots
    #[must_use]
    pub fn failure(failure: ExecutionFailure) -> Self {
        Self::from_outcome(Err(failure))
    }

    fn from_outcome(outcome: Result<ExecutionOutcome, ExecutionFailure>) -> Self {
        Self {
            outcome,
            final_outputs: BTreeMap::new(),
            origin: None,
            reused_origin: false,
            out_of_date_reasons: Vec::new(),
        }
    }

    /// Whether the execution succeeded
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The successful outcome, if any
    #[must_use]
    pub fn outcome(&self) -> Option<ExecutionOutcome> {
        self.outcome.as_ref().ok().copied()
    }

    /// The failure, if any
    #[must_use]
    pub fn failure_cause(&self) -> Option<&ExecutionFailure> {
        self.outcome.as_ref().err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_defaults() {
        let result = ExecutionResult::success(ExecutionOutcome::UpToDate);
        assert!(result.is_success());
        assert_eq!(result.outcome(), Some(ExecutionOutcome::UpToDate));
        assert!(result.final_outputs.is_empty());
        assert!(result.origin.is_none());
        assert!(!result.reused_origin);
    }

    #[test]
    fn test_failure_exposes_cause() {
        let result = ExecutionResult::failure(ExecutionFailure::Work {
            work: "task ':a'".to_string(),
            source: "boom".into(),
        });
        assert!(!result.is_success());
        assert!(result.outcome().is_none());
        assert!(matches!(
            result.failure_cause(),
            Some(ExecutionFailure::Work { .. })
        ));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ExecutionOutcome::FromCache.to_string(), "FROM-CACHE");
        assert!(ExecutionOutcome::Executed.did_work());
        assert!(!ExecutionOutcome::UpToDate.did_work());
    }
}
