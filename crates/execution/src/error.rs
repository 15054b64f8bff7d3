//! Error types for the execution pipeline

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use chrono::TimeDelta;
use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error returned by unit of work callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fatal pipeline errors
///
/// These abort the invocation. Failures of the work itself are reported
/// through [`ExecutionFailure`] inside the result instead.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A unit of work declared a negative timeout
    #[error("Timeout of {work} must be non-negative, got {timeout}")]
    #[diagnostic(
        code(cairn::execution::invalid_timeout),
        help("Remove the timeout or declare a positive duration")
    )]
    InvalidTimeout {
        /// Display name of the unit of work
        work: String,
        /// The rejected timeout
        timeout: TimeDelta,
    },

    /// Two outputs of one unit of work share a name
    #[error("{work} declares output property '{name}' more than once")]
    #[diagnostic(code(cairn::execution::duplicate_output))]
    DuplicateOutput {
        /// Display name of the unit of work
        work: String,
        /// The duplicated property name
        name: String,
    },

    /// I/O error while preparing outputs or reading history
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(cairn::execution::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "remove_file", "create_dir_all")
        operation: String,
    },

    /// Execution history could not be encoded or decoded
    #[error("Execution history error: {message}")]
    #[diagnostic(code(cairn::execution::history))]
    History {
        /// Description of the problem
        message: String,
    },

    /// Loading from the build cache left outputs in an unknown state
    #[error("Build cache failure for {work}")]
    #[diagnostic(code(cairn::execution::cache))]
    Cache {
        /// Display name of the unit of work
        work: String,
        /// The cache error
        #[source]
        source: cairn_cache::Error,
    },
}

impl Error {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an execution history error
    #[must_use]
    pub fn history(msg: impl Into<String>) -> Self {
        Self::History {
            message: msg.into(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why an execution did not succeed
///
/// Carried inside an [`ExecutionResult`](crate::ExecutionResult); the caller
/// sees it as a normal, unsuccessful result.
#[derive(Error, Debug, Diagnostic)]
pub enum ExecutionFailure {
    /// The body of the unit of work failed
    #[error("Execution failed for {work}")]
    #[diagnostic(code(cairn::execution::work_failed))]
    Work {
        /// Display name of the unit of work
        work: String,
        /// The error reported by the body
        #[source]
        source: BoxError,
    },

    /// The body ran longer than the declared timeout
    #[error("Timeout has been exceeded for {work} (timeout {timeout})")]
    #[diagnostic(code(cairn::execution::timeout))]
    TimeoutExceeded {
        /// Display name of the unit of work
        work: String,
        /// The declared timeout
        timeout: TimeDelta,
    },

    /// The interrupt was raised while the body ran
    ///
    /// The body returned normally but may have stopped early, so its
    /// outputs are not trusted.
    #[error("Execution of {work} was interrupted")]
    #[diagnostic(code(cairn::execution::interrupted))]
    Interrupted {
        /// Display name of the unit of work
        work: String,
    },

    /// The outputs could not be fingerprinted after execution
    #[error("Failed to snapshot outputs of {work}")]
    #[diagnostic(code(cairn::execution::snapshot))]
    Snapshot {
        /// Display name of the unit of work
        work: String,
        /// The underlying error
        #[source]
        source: BoxError,
    },

    /// The execution record could not be persisted
    #[error("Failed to persist execution state of {work}")]
    #[diagnostic(code(cairn::execution::persist))]
    Persist {
        /// Display name of the unit of work
        work: String,
        /// The underlying error
        #[source]
        source: BoxError,
    },
}
