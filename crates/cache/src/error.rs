//! Error types for the build cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for build cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(cairn::cache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Build cache configuration error: {message}")]
    #[diagnostic(code(cairn::cache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(cairn::cache::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// The archive does not have the expected structure
    #[error("Cached entry format error: {message}")]
    #[diagnostic(code(cairn::cache::archive))]
    Archive {
        /// What was wrong with the archive
        message: String,
    },

    /// The archive references an output property the unit of work does not declare
    #[error("No output property '{name}' registered")]
    #[diagnostic(
        code(cairn::cache::unknown_property),
        help("The cache entry was produced by a unit of work with different outputs")
    )]
    UnknownProperty {
        /// Name of the property found in the archive
        name: String,
    },

    /// An archive entry's kind does not match the declared output type
    #[error("Output property '{name}' should be a {expected}")]
    #[diagnostic(code(cairn::cache::type_mismatch))]
    TypeMismatch {
        /// Name of the output property
        name: String,
        /// Declared kind ("file" or "directory")
        expected: &'static str,
    },

    /// An output property name cannot be encoded in an archive entry
    #[error("Invalid output property name '{name}'")]
    #[diagnostic(
        code(cairn::cache::invalid_property_name),
        help("Output property names must be non-empty and must not contain '/'")
    )]
    InvalidPropertyName {
        /// The rejected name
        name: String,
    },

    /// The archive carries no origin metadata
    #[error("Cached result format error, no origin metadata was found")]
    #[diagnostic(code(cairn::cache::missing_metadata))]
    MissingMetadata,

    /// Unpacking failed after outputs were touched; local output state is unknown
    #[error("Failed to unpack cached outputs for key {key}: {message}")]
    #[diagnostic(
        code(cairn::cache::unrecoverable_unpack),
        help("Output files may be corrupted; clean the outputs and rerun the build")
    )]
    UnrecoverableUnpack {
        /// Cache key that was being loaded
        key: String,
        /// Description of the failure
        message: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

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

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an archive structure error
    #[must_use]
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive {
            message: msg.into(),
        }
    }

    /// Wrap an unpack failure as unrecoverable
    #[must_use]
    pub fn unrecoverable_unpack(
        key: impl Into<String>,
        message: impl Into<String>,
        source: Self,
    ) -> Self {
        Self::UnrecoverableUnpack {
            key: key.into(),
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error leaves local outputs in an unknown state
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::UnrecoverableUnpack { .. })
    }
}

/// Result type for build cache operations
pub type Result<T> = std::result::Result<T, Error>;
