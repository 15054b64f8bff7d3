//! Execution history
//!
//! After every execution the pipeline records the fingerprints of the
//! inputs and outputs together with the origin of the result. The next
//! invocation compares the current state against that record to decide
//! whether the unit of work is up to date.

use crate::changes::{Change, ExecutionStateChanges, PropertyRole};
use crate::fingerprint::FileCollectionFingerprint;
use crate::{Error, Result};
use cairn_cache::OriginMetadata;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// State recorded after an execution completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterPreviousExecutionState {
    /// Input fingerprints by property name
    pub input_fingerprints: BTreeMap<String, FileCollectionFingerprint>,
    /// Output fingerprints by property name
    pub output_fingerprints: BTreeMap<String, FileCollectionFingerprint>,
    /// Which build produced the outputs
    pub origin: OriginMetadata,
    /// Whether the execution succeeded
    pub successful: bool,
}

/// File-backed store of [`AfterPreviousExecutionState`] by work identity
#[derive(Debug, Clone)]
pub struct ExecutionHistoryStore {
    root: PathBuf,
}

impl ExecutionHistoryStore {
    /// Open a history store rooted at `root`, creating the directory
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io(e, &root, "create_dir_all"))?;
        Ok(Self { root })
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, identity: &str) -> PathBuf {
        let digest = Sha256::digest(identity.as_bytes());
        self.root
            .join(format!("{}.json", hex::encode(digest.as_slice())))
    }

    /// Load the recorded state of `identity`
    ///
    /// # Errors
    ///
    /// Returns error if the record exists but cannot be read or decoded
    pub fn load(&self, identity: &str) -> Result<Option<AfterPreviousExecutionState>> {
        let path = self.entry_path(identity);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(e, &path, "read")),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| Error::history(format!("Failed to decode history of {identity}: {e}")))
    }

    /// Record `state` for `identity`, replacing any previous record
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be written
    pub fn store(&self, identity: &str, state: &AfterPreviousExecutionState) -> Result<()> {
        let path = self.entry_path(identity);
        let data = serde_json::to_vec_pretty(state)
            .map_err(|e| Error::history(format!("Failed to encode history of {identity}: {e}")))?;

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &data).map_err(|e| Error::io(e, &tmp_path, "write"))?;
        fs::rename(&tmp_path, &path).map_err(|e| Error::io(e, &path, "rename"))?;

        tracing::trace!(identity, path = %path.display(), "Stored execution history");
        Ok(())
    }

    /// Forget the record of `identity`
    ///
    /// # Errors
    ///
    /// Returns error if the record exists but cannot be removed
    pub fn remove(&self, identity: &str) -> Result<()> {
        let path = self.entry_path(identity);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(e, &path, "remove_file")),
        }
    }
}

/// Compare the current state of a unit of work against its previous record
///
/// Returns `None` when there is no previous record. Changes are ordered:
/// a failed previous execution first, then inputs, then outputs.
#[must_use]
pub fn detect_changes(
    previous: Option<&AfterPreviousExecutionState>,
    current_inputs: &BTreeMap<String, FileCollectionFingerprint>,
    current_outputs: &BTreeMap<String, FileCollectionFingerprint>,
) -> Option<ExecutionStateChanges> {
    let previous = previous?;
    let mut changes = Vec::new();
    if !previous.successful {
        changes.push(Change::PreviousExecutionFailed);
    }
    diff_properties(
        &mut changes,
        PropertyRole::Input,
        &previous.input_fingerprints,
        current_inputs,
    );
    diff_properties(
        &mut changes,
        PropertyRole::Output,
        &previous.output_fingerprints,
        current_outputs,
    );
    Some(ExecutionStateChanges::new(changes))
}

fn diff_properties(
    changes: &mut Vec<Change>,
    role: PropertyRole,
    previous: &BTreeMap<String, FileCollectionFingerprint>,
    current: &BTreeMap<String, FileCollectionFingerprint>,
) {
    for (property, fingerprint) in current {
        match previous.get(property) {
            Some(before) => changes.extend(fingerprint.changes_from(before, role, property)),
            None => changes.push(Change::PropertyAdded {
                role,
                property: property.clone(),
            }),
        }
    }
    for property in previous.keys() {
        if !current.contains_key(property) {
            changes.push(Change::PropertyRemoved {
                role,
                property: property.clone(),
            });
        }
    }
}
