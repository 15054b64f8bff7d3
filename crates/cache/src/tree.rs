//! Declared output trees

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of filesystem location an output property produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeType {
    /// A single regular file
    File,
    /// A directory tree
    Directory,
}

impl TreeType {
    /// Lowercase name used in messages
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
        }
    }
}

impl fmt::Display for TreeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared output of a unit of work
///
/// Trees compare by name only so that a sorted set of trees gives a stable
/// archive entry order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputTree {
    /// Property name, unique within a unit of work
    pub name: String,
    /// File or directory
    pub tree_type: TreeType,
    /// Location on disk
    pub root: PathBuf,
}

impl OutputTree {
    /// Create an output tree
    #[must_use]
    pub fn new(name: impl Into<String>, tree_type: TreeType, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            tree_type,
            root: root.into(),
        }
    }

    /// A directory-typed output
    #[must_use]
    pub fn directory(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self::new(name, TreeType::Directory, root)
    }

    /// A file-typed output
    #[must_use]
    pub fn file(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self::new(name, TreeType::File, root)
    }

    /// Directory that has to exist before the work can produce this output
    ///
    /// The root itself for directories, its parent for files.
    #[must_use]
    pub fn directory_to_create(&self) -> Option<&Path> {
        match self.tree_type {
            TreeType::Directory => Some(&self.root),
            TreeType::File => self.root.parent(),
        }
    }

    /// Check that the name can be used as an archive entry prefix
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or contains a path separator
    pub fn validate_name(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') || self.name.contains('\\') {
            return Err(Error::InvalidPropertyName {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl PartialEq for OutputTree {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for OutputTree {}

impl PartialOrd for OutputTree {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OutputTree {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}
