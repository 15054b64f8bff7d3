//! Incremental execution pipeline for cairn
//!
//! A [`UnitOfWork`] describes one computation with declared outputs. The
//! [`ExecutionPipeline`] decides for every invocation whether the work has
//! to run at all:
//! - outputs are restored from the build cache when an entry exists
//! - execution is skipped when nothing changed since the previous execution
//! - stale outputs owned by the build are removed before running
//! - a declared timeout interrupts work that runs too long
//!
//! After running, outputs are fingerprinted, recorded as the previous
//! execution, and stored in the build cache.
//!
//! # Example
//!
//! ```ignore
//! use cairn_execution::{
//!     Context, ExecutionPipeline, ExecutionServices, InterruptToken, KeyedCacheHandler,
//! };
//!
//! let pipeline = ExecutionPipeline::new(services);
//! let handler = KeyedCacheHandler::new(key);
//! let result = pipeline.execute(&Context::new(&work, &handler, InterruptToken::new()))?;
//! println!("{:?}", result.outcome);
//! ```

mod changes;
mod context;
mod error;
mod fingerprint;
mod history;
mod interrupt;
mod pipeline;
mod registry;
mod result;
pub mod steps;
mod work;

// Re-export error types at crate root
pub use error::{BoxError, Error, ExecutionFailure, Result};

// Re-export main types
pub use changes::{Change, ExecutionStateChanges, FileChangeKind, PropertyRole};
pub use context::{CacheHandler, Context, KeyedCacheHandler, NoCacheHandler};
pub use fingerprint::{FileCollectionFingerprint, FileSnapshot, fingerprint_outputs};
pub use history::{AfterPreviousExecutionState, ExecutionHistoryStore, detect_changes};
pub use interrupt::InterruptToken;
pub use pipeline::{ExecutionPipeline, ExecutionServices};
pub use registry::{BuildOutputCleanupRegistry, DefaultOutputFilesRepository, OutputFilesRepository};
pub use result::{ExecutionOutcome, ExecutionResult};
pub use steps::Step;
pub use work::{ExecutionRequest, UnitOfWork, WorkOutcome, collect_outputs};
