//! Registries deciding which files on disk belong to the build
//!
//! Stale outputs are only ever deleted when one of these registries says
//! the build produced them. Anything else found in an output location is
//! left alone.

use crate::fingerprint::FileCollectionFingerprint;
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Records which files were generated by previous executions
pub trait OutputFilesRepository: Send + Sync {
    /// Remember every existing path of the given output fingerprints
    fn record_outputs(&self, outputs: &BTreeMap<String, FileCollectionFingerprint>);

    /// Whether `path`, or a directory containing it, was generated by the build
    fn is_generated_by_build(&self, path: &Path) -> bool;
}

impl std::fmt::Debug for dyn OutputFilesRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OutputFilesRepository")
    }
}

/// Set of generated paths, optionally persisted as JSON
///
/// Call [`flush`](Self::flush) at the end of a build to write the set back
/// to the file it was opened from.
#[derive(Debug, Default)]
pub struct DefaultOutputFilesRepository {
    paths: RwLock<BTreeSet<PathBuf>>,
    file: Option<PathBuf>,
}

impl DefaultOutputFilesRepository {
    /// An empty in-memory repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the repository persisted at `file`
    ///
    /// A missing file gives an empty repository.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or decoded
    pub fn open(file: impl Into<PathBuf>) -> Result<Self> {
        let file = file.into();
        let paths = match fs::read(&file) {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                Error::history(format!(
                    "Failed to decode output files at {}: {e}",
                    file.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(Error::io(e, &file, "read")),
        };
        debug!(path = %file.display(), count = paths.len(), "Opened output files repository");
        Ok(Self {
            paths: RwLock::new(paths),
            file: Some(file),
        })
    }

    /// Write the recorded paths back to the backing file, if any
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn flush(&self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let data = {
            let paths = self.paths.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_vec(&*paths)
                .map_err(|e| Error::history(format!("Failed to encode output files: {e}")))?
        };
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
        }
        let tmp_path = file.with_extension("tmp");
        fs::write(&tmp_path, data).map_err(|e| Error::io(e, &tmp_path, "write"))?;
        fs::rename(&tmp_path, file).map_err(|e| Error::io(e, file, "rename"))
    }

    /// Number of recorded paths
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutputFilesRepository for DefaultOutputFilesRepository {
    fn record_outputs(&self, outputs: &BTreeMap<String, FileCollectionFingerprint>) {
        let mut paths = self.paths.write().unwrap_or_else(PoisonError::into_inner);
        for fingerprint in outputs.values() {
            paths.extend(fingerprint.existing_paths().map(Path::to_path_buf));
        }
    }

    fn is_generated_by_build(&self, path: &Path) -> bool {
        let paths = self.paths.read().unwrap_or_else(PoisonError::into_inner);
        path.ancestors().any(|candidate| paths.contains(candidate))
    }
}

/// Output roots that every unit of work in this build may clean up
#[derive(Debug, Default)]
pub struct BuildOutputCleanupRegistry {
    roots: RwLock<Vec<PathBuf>>,
}

impl BuildOutputCleanupRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register output roots owned by the build
    pub fn register_outputs<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut roots = self.roots.write().unwrap_or_else(PoisonError::into_inner);
        roots.extend(paths.into_iter().map(Into::into));
    }

    /// Whether `path` lies below a registered root
    #[must_use]
    pub fn is_output_owned_by_build(&self, path: &Path) -> bool {
        self.roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|root| path.starts_with(root))
    }
}
