//! Build cache entries stored as files in a local directory

use super::BuildCacheStore;
use crate::key::CacheKey;
use crate::{Error, Result};
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Stores each entry as `<directory>/<key hex>`
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so readers never observe a partially written entry and concurrent
/// writers of the same key simply replace each other.
#[derive(Debug, Clone)]
pub struct LocalDirectoryStore {
    directory: PathBuf,
}

impl LocalDirectoryStore {
    /// Open the store rooted at `directory`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the directory cannot be created,
    /// listed or written
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| {
            Error::configuration(format!(
                "Cannot create build cache directory {}: {e}",
                directory.display()
            ))
        })?;
        if !directory.is_dir() {
            return Err(Error::configuration(format!(
                "Build cache path {} is not a directory",
                directory.display()
            )));
        }
        fs::read_dir(&directory).map_err(|e| {
            Error::configuration(format!(
                "Build cache directory {} is not readable: {e}",
                directory.display()
            ))
        })?;

        let probe = directory.join(".write_probe");
        fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&probe)
            .map_err(|e| {
                Error::configuration(format!(
                    "Build cache directory {} is not writable: {e}",
                    directory.display()
                ))
            })?;
        let _ = fs::remove_file(&probe);

        debug!(directory = %directory.display(), "Opened local build cache");
        Ok(Self { directory })
    }

    /// Open the first of `candidates` that [`new`](Self::new) accepts
    ///
    /// Candidates under `/homeless-shelter` (the unwritable `HOME` of Nix
    /// builders) are skipped without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no candidate is usable
    pub fn open_first(candidates: impl IntoIterator<Item = PathBuf>) -> Result<Self> {
        let mut rejected = Vec::new();
        for candidate in candidates {
            if candidate.starts_with("/homeless-shelter") {
                continue;
            }
            match Self::new(&candidate) {
                Ok(store) => return Ok(store),
                Err(e) => {
                    debug!(
                        directory = %candidate.display(),
                        error = %e,
                        "Skipping build cache directory"
                    );
                    rejected.push(candidate.display().to_string());
                }
            }
        }
        Err(Error::configuration(format!(
            "No usable build cache directory (tried: {})",
            rejected.join(", ")
        )))
    }

    /// Root directory of the store
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File an entry is stored in
    #[must_use]
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(key.hash_code())
    }
}

impl BuildCacheStore for LocalDirectoryStore {
    fn load(
        &self,
        key: &CacheKey,
        reader: &mut dyn FnMut(&mut dyn Read) -> Result<()>,
    ) -> Result<bool> {
        let path = self.entry_path(key);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(key = %key, "No local cache entry");
                return Ok(false);
            }
            Err(e) => return Err(Error::io(e, &path, "open")),
        };
        reader(&mut BufReader::new(file))?;
        Ok(true)
    }

    fn store(
        &self,
        key: &CacheKey,
        writer: &mut dyn FnMut(&mut dyn Write) -> Result<()>,
    ) -> Result<()> {
        let path = self.entry_path(key);
        let temp = NamedTempFile::new_in(&self.directory)
            .map_err(|e| Error::io(e, &self.directory, "create temp file"))?;

        {
            let mut buffered = BufWriter::new(temp.as_file());
            writer(&mut buffered)?;
            buffered
                .flush()
                .map_err(|e| Error::io(e, temp.path(), "flush"))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::io(e, temp.path(), "sync"))?;

        temp.persist(&path)
            .map_err(|e| Error::io(e.error, &path, "rename"))?;
        debug!(key = %key, path = %path.display(), "Stored local cache entry");
        Ok(())
    }

    fn description(&self) -> String {
        format!("local directory {}", self.directory.display())
    }
}
