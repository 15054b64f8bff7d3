//! Origin metadata attached to every stored and loaded cache entry

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::time::Duration;
use uuid::Uuid;

/// Identifies one build invocation
///
/// Created once when a build starts and shared by every unit of work executed
/// during that build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildInvocationId(Uuid);

impl BuildInvocationId {
    /// Generate a new random invocation id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for BuildInvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which build produced a result and how long producing it took
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginMetadata {
    /// Build invocation that executed the work
    pub build_invocation_id: BuildInvocationId,
    /// Wall-clock execution time of the work body
    pub execution_time: Duration,
}

impl OriginMetadata {
    /// Create origin metadata
    #[must_use]
    pub const fn new(build_invocation_id: BuildInvocationId, execution_time: Duration) -> Self {
        Self {
            build_invocation_id,
            execution_time,
        }
    }

    /// Whether this result was produced by the given build invocation
    #[must_use]
    pub fn is_from(&self, build: &BuildInvocationId) -> bool {
        self.build_invocation_id == *build
    }

    /// Serialize as JSON
    ///
    /// # Errors
    ///
    /// Returns error if writing fails
    pub fn write_to(&self, output: &mut dyn Write) -> Result<()> {
        serde_json::to_writer(output, self)
            .map_err(|e| Error::serialization(format!("Failed to write origin metadata: {e}")))
    }

    /// Deserialize from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the input is not valid origin metadata
    pub fn read_from(input: &mut dyn Read) -> Result<Self> {
        serde_json::from_reader(input)
            .map_err(|e| Error::serialization(format!("Failed to read origin metadata: {e}")))
    }
}
