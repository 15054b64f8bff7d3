//! Fingerprints of output trees
//!
//! A fingerprint records, for every path below an output root, whether it is
//! a directory, a missing root, or a regular file with its SHA-256 content
//! hash. Two fingerprints of the same property can be diffed to find out
//! what changed between executions.

use crate::changes::{Change, FileChangeKind, PropertyRole};
use crate::work::{UnitOfWork, collect_outputs};
use crate::{Error, Result};
use cairn_cache::{OutputTree, TreeType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// State of one path at snapshot time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileSnapshot {
    /// A directory
    Directory,
    /// A regular file
    RegularFile {
        /// Hex SHA-256 of the content
        hash: String,
        /// Size in bytes
        size: u64,
    },
    /// The declared root did not exist
    Missing,
}

/// Snapshot of every path of one output property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCollectionFingerprint {
    /// Snapshots keyed by absolute path, parents before children
    pub entries: BTreeMap<PathBuf, FileSnapshot>,
}

impl FileCollectionFingerprint {
    /// Fingerprint a declared output tree
    ///
    /// # Errors
    ///
    /// Returns error if the tree cannot be walked or a file cannot be read
    pub fn of_tree(tree: &OutputTree) -> Result<Self> {
        let fingerprint = Self::of_path(&tree.root)?;
        if tree.tree_type == TreeType::File
            && matches!(
                fingerprint.entries.get(&tree.root),
                Some(FileSnapshot::Directory)
            )
        {
            return Err(Error::io(
                std::io::Error::other("expected a file but found a directory"),
                &tree.root,
                "fingerprint",
            ));
        }
        Ok(fingerprint)
    }

    /// Fingerprint whatever exists at `root`
    ///
    /// # Errors
    ///
    /// Returns error if the tree cannot be walked or a file cannot be read
    pub fn of_path(root: &Path) -> Result<Self> {
        let mut entries = BTreeMap::new();
        if fs::symlink_metadata(root).is_err() {
            entries.insert(root.to_path_buf(), FileSnapshot::Missing);
            return Ok(Self { entries });
        }

        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                Error::io(std::io::Error::other(e.to_string()), path, "walk")
            })?;
            let file_type = entry.file_type();
            let snapshot = if file_type.is_dir() {
                FileSnapshot::Directory
            } else if file_type.is_file() {
                hash_file(entry.path())?
            } else {
                continue;
            };
            entries.insert(entry.path().to_path_buf(), snapshot);
        }
        Ok(Self { entries })
    }

    /// Paths of regular files
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().filter_map(|(path, snapshot)| {
            matches!(snapshot, FileSnapshot::RegularFile { .. }).then_some(path.as_path())
        })
    }

    /// Paths of directories
    pub fn directories(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().filter_map(|(path, snapshot)| {
            matches!(snapshot, FileSnapshot::Directory).then_some(path.as_path())
        })
    }

    /// Paths that existed at snapshot time
    pub fn existing_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().filter_map(|(path, snapshot)| {
            (!matches!(snapshot, FileSnapshot::Missing)).then_some(path.as_path())
        })
    }

    /// Differences from `previous`, in path order
    #[must_use]
    pub fn changes_from(
        &self,
        previous: &Self,
        role: PropertyRole,
        property: &str,
    ) -> Vec<Change> {
        let mut changes = Vec::new();
        let mut change = |path: &PathBuf, kind: FileChangeKind| {
            changes.push(Change::File {
                role,
                property: property.to_string(),
                path: path.clone(),
                kind,
            });
        };

        for (path, current) in &self.entries {
            match previous.entries.get(path) {
                None => change(path, FileChangeKind::Added),
                Some(before) if before != current => {
                    let kind = match (before, current) {
                        (FileSnapshot::Missing, _) => FileChangeKind::Added,
                        (_, FileSnapshot::Missing) => FileChangeKind::Removed,
                        _ => FileChangeKind::Modified,
                    };
                    change(path, kind);
                }
                Some(_) => {}
            }
        }
        for path in previous.entries.keys() {
            if !self.entries.contains_key(path) {
                change(path, FileChangeKind::Removed);
            }
        }
        changes.sort_by(|a, b| change_path(a).cmp(&change_path(b)));
        changes
    }
}

fn change_path(change: &Change) -> Option<&Path> {
    match change {
        Change::File { path, .. } => Some(path.as_path()),
        _ => None,
    }
}

fn hash_file(path: &Path) -> Result<FileSnapshot> {
    let mut file = fs::File::open(path).map_err(|e| Error::io(e, path, "open"))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut size = 0u64;
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| Error::io(e, path, "read"))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }
    Ok(FileSnapshot::RegularFile {
        hash: hex::encode(hasher.finalize().as_slice()),
        size,
    })
}

/// Fingerprint every declared output of `work`, keyed by property name
///
/// # Errors
///
/// Returns error if the outputs are invalid or cannot be read
pub fn fingerprint_outputs(
    work: &dyn UnitOfWork,
) -> Result<BTreeMap<String, FileCollectionFingerprint>> {
    collect_outputs(work)?
        .iter()
        .map(|tree| Ok((tree.name.clone(), FileCollectionFingerprint::of_tree(tree)?)))
        .collect()
}
