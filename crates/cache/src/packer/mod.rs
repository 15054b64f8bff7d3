//! Output packers
//!
//! A packer serializes the declared output trees of a unit of work into one
//! archive stream and restores them from it. The archive layout is shared by
//! every packer:
//!
//! ```text
//! METADATA                              origin metadata (JSON)
//! property-<name>/                      root of a directory output
//! property-<name>/<relative path>       entries below it, in sorted walk order
//! property-<name>                       a file output
//! missing-property-<name>               a declared output that did not exist
//! ```
//!
//! Trees are written in name order, so packing the same state twice yields
//! identical bytes.

mod gzip;
mod tar;
mod zip;

pub use self::gzip::GzipPacker;
pub use self::tar::TarPacker;
pub use self::zip::ZipPacker;

use crate::origin::OriginMetadata;
use crate::tree::{OutputTree, TreeType};
use crate::{Error, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use walkdir::WalkDir;

/// Name of the archive entry holding the origin metadata
pub const METADATA_PATH: &str = "METADATA";

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;
const PERMISSION_MASK: u32 = 0o7777;

#[allow(clippy::expect_used)]
static TREE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(missing-)?property-([^/]+)(?:/(.*))?$").expect("tree path pattern is valid")
});

/// Serializes output trees to and from a single archive stream
pub trait OutputPacker: Send + Sync {
    /// Write `origin` followed by every tree in `trees` to `output`
    ///
    /// # Errors
    ///
    /// Returns error if an output cannot be read or the archive cannot be written
    fn pack(
        &self,
        trees: &[OutputTree],
        origin: &OriginMetadata,
        output: &mut dyn Write,
    ) -> Result<PackResult>;

    /// Restore the trees found in `input` into their declared locations
    ///
    /// # Errors
    ///
    /// Returns error if the archive is malformed, references an undeclared
    /// property, or an output cannot be written
    fn unpack(&self, trees: &[OutputTree], input: &mut dyn Read) -> Result<UnpackResult>;
}

/// Outcome of packing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackResult {
    /// Number of archive entries written, metadata included
    pub entries: u64,
}

/// Outcome of unpacking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackResult {
    /// Origin of the cached result
    pub origin: OriginMetadata,
    /// Number of archive entries read, metadata included
    pub entries: u64,
}

/// Archive format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackerFormat {
    /// Plain tar
    Tar,
    /// Gzip-compressed tar
    #[default]
    TarGz,
    /// Zip with deflate compression
    Zip,
}

impl PackerFormat {
    /// Create the packer for this format
    #[must_use]
    pub fn packer(self) -> Box<dyn OutputPacker> {
        match self {
            Self::Tar => Box::new(TarPacker::new()),
            Self::TarGz => Box::new(GzipPacker::new(TarPacker::new())),
            Self::Zip => Box::new(ZipPacker::new()),
        }
    }
}

// =============================================================================
// Packing
// =============================================================================

/// One archive entry to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PackEntry {
    /// The declared root of a tree does not exist
    Missing { path: String },
    /// A directory; `path` has a trailing slash
    Directory { path: String, mode: u32, mtime: u64 },
    /// A regular file whose content is read from `source`
    File {
        path: String,
        source: PathBuf,
        size: u64,
        mode: u32,
        mtime: u64,
    },
}

/// Collect the archive entries for `trees` in archive order
pub(crate) fn collect_entries(trees: &[OutputTree]) -> Result<Vec<PackEntry>> {
    let mut sorted: Vec<&OutputTree> = trees.iter().collect();
    sorted.sort();

    let mut entries = Vec::new();
    for tree in sorted {
        tree.validate_name()?;
        collect_tree(tree, &mut entries)
            .map_err(|e| Error::archive(format!("Could not pack tree '{}': {e}", tree.name)))?;
    }
    Ok(entries)
}

fn collect_tree(tree: &OutputTree, entries: &mut Vec<PackEntry>) -> Result<()> {
    let prefix = format!("property-{}", tree.name);

    let metadata = match fs::metadata(&tree.root) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            entries.push(PackEntry::Missing {
                path: format!("missing-{prefix}"),
            });
            return Ok(());
        }
        Err(e) => return Err(Error::io(e, &tree.root, "metadata")),
    };

    match tree.tree_type {
        TreeType::File => {
            if !metadata.is_file() {
                return Err(Error::TypeMismatch {
                    name: tree.name.clone(),
                    expected: TreeType::File.as_str(),
                });
            }
            entries.push(PackEntry::File {
                path: prefix,
                source: tree.root.clone(),
                size: metadata.len(),
                mode: file_mode(&metadata, DEFAULT_FILE_MODE),
                mtime: mtime_secs(&metadata),
            });
        }
        TreeType::Directory => {
            if !metadata.is_dir() {
                return Err(Error::TypeMismatch {
                    name: tree.name.clone(),
                    expected: TreeType::Directory.as_str(),
                });
            }
            for entry in WalkDir::new(&tree.root).follow_links(true).sort_by_file_name() {
                let entry =
                    entry.map_err(|e| Error::archive(format!("failed to walk directory: {e}")))?;
                let rel = entry.path().strip_prefix(&tree.root).map_err(|_| {
                    Error::configuration(format!(
                        "path {} is not under {}",
                        entry.path().display(),
                        tree.root.display()
                    ))
                })?;
                let rel = relative_path_string(rel);
                let metadata = entry
                    .metadata()
                    .map_err(|e| Error::archive(format!("failed to read metadata: {e}")))?;

                if metadata.is_dir() {
                    let path = if rel.is_empty() {
                        format!("{prefix}/")
                    } else {
                        format!("{prefix}/{rel}/")
                    };
                    entries.push(PackEntry::Directory {
                        path,
                        mode: file_mode(&metadata, DEFAULT_DIR_MODE),
                        mtime: mtime_secs(&metadata),
                    });
                } else if metadata.is_file() {
                    entries.push(PackEntry::File {
                        path: format!("{prefix}/{rel}"),
                        source: entry.path().to_path_buf(),
                        size: metadata.len(),
                        mode: file_mode(&metadata, DEFAULT_FILE_MODE),
                        mtime: mtime_secs(&metadata),
                    });
                } else {
                    debug!(path = %entry.path().display(), "Skipping special file");
                }
            }
        }
    }
    Ok(())
}

/// Relative path with `/` separators regardless of platform
fn relative_path_string(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata, _default: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & PERMISSION_MASK
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata, default: u32) -> u32 {
    default
}

fn mtime_secs(metadata: &fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs())
}

// =============================================================================
// Unpacking
// =============================================================================

/// Kind of an archive entry as reported by the archive format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Directory,
    File,
}

/// Where the content of an archive entry has to go
#[derive(Debug)]
pub(crate) enum UnpackTarget {
    /// The entry is origin metadata
    Metadata,
    /// Nothing to write (missing marker or directory already created)
    Done,
    /// Write the entry content to this file
    File(PathBuf),
}

/// Format-independent bookkeeping for one unpack operation
pub(crate) struct TreeUnpacker<'a> {
    trees: BTreeMap<&'a str, &'a OutputTree>,
    seen: HashSet<&'a str>,
    directory_modes: Vec<(PathBuf, u32)>,
    origin: Option<OriginMetadata>,
    entries: u64,
}

impl<'a> TreeUnpacker<'a> {
    pub(crate) fn new(trees: &'a [OutputTree]) -> Self {
        Self {
            trees: trees.iter().map(|t| (t.name.as_str(), t)).collect(),
            seen: HashSet::new(),
            directory_modes: Vec::new(),
            origin: None,
            entries: 0,
        }
    }

    /// Resolve an archive entry and prepare the filesystem for its content
    pub(crate) fn begin_entry(
        &mut self,
        raw_path: &str,
        kind: EntryKind,
        mode: u32,
    ) -> Result<UnpackTarget> {
        self.entries += 1;
        let path = raw_path.trim_end_matches('/');
        if path == METADATA_PATH {
            return Ok(UnpackTarget::Metadata);
        }

        let captures = TREE_PATH
            .captures(path)
            .ok_or_else(|| Error::archive(format!("invalid contents: {raw_path}")))?;
        let missing = captures.get(1).is_some();
        let name = captures.get(2).map_or("", |m| m.as_str());
        let child = captures.get(3).map(|m| m.as_str()).filter(|c| !c.is_empty());

        let tree = *self.trees.get(name).ok_or_else(|| Error::UnknownProperty {
            name: name.to_string(),
        })?;

        match child {
            None => self.begin_root(tree, missing, kind, mode),
            Some(child) => {
                if missing {
                    return Err(Error::archive(format!("invalid contents: {raw_path}")));
                }
                self.begin_child(tree, child, kind, mode)
            }
        }
    }

    fn begin_root(
        &mut self,
        tree: &'a OutputTree,
        missing: bool,
        kind: EntryKind,
        mode: u32,
    ) -> Result<UnpackTarget> {
        if !self.seen.insert(tree.name.as_str()) {
            return Err(Error::archive(format!(
                "duplicate root entry for tree '{}'",
                tree.name
            )));
        }
        ensure_parent(&tree.root)?;

        if missing {
            remove_existing(&tree.root)?;
            return Ok(UnpackTarget::Done);
        }

        match (tree.tree_type, kind) {
            (TreeType::Directory, EntryKind::Directory) => {
                remove_existing(&tree.root)?;
                fs::create_dir_all(&tree.root)
                    .map_err(|e| Error::io(e, &tree.root, "create_dir_all"))?;
                self.directory_modes.push((tree.root.clone(), mode));
                Ok(UnpackTarget::Done)
            }
            (TreeType::File, EntryKind::File) => Ok(UnpackTarget::File(tree.root.clone())),
            (expected, _) => Err(Error::TypeMismatch {
                name: tree.name.clone(),
                expected: expected.as_str(),
            }),
        }
    }

    fn begin_child(
        &mut self,
        tree: &'a OutputTree,
        child: &str,
        kind: EntryKind,
        mode: u32,
    ) -> Result<UnpackTarget> {
        if tree.tree_type != TreeType::Directory {
            return Err(Error::TypeMismatch {
                name: tree.name.clone(),
                expected: TreeType::Directory.as_str(),
            });
        }
        if !self.seen.contains(tree.name.as_str()) {
            return Err(Error::archive(format!(
                "root needs to be the first entry in tree '{}'",
                tree.name
            )));
        }
        let relative = Path::new(child);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::archive(format!("invalid entry path: {child}")));
        }

        let target = tree.root.join(relative);
        match kind {
            EntryKind::Directory => {
                fs::create_dir_all(&target).map_err(|e| Error::io(e, &target, "create_dir_all"))?;
                self.directory_modes.push((target, mode));
                Ok(UnpackTarget::Done)
            }
            EntryKind::File => {
                ensure_parent(&target)?;
                Ok(UnpackTarget::File(target))
            }
        }
    }

    /// Record the origin metadata read from the `METADATA` entry
    pub(crate) fn set_origin(&mut self, origin: OriginMetadata) {
        self.origin = Some(origin);
    }

    /// Apply deferred directory permissions and return the result
    pub(crate) fn finish(self) -> Result<UnpackResult> {
        // Children first, so a read-only parent does not block its children.
        for (dir, mode) in self.directory_modes.iter().rev() {
            set_mode(dir, *mode)?;
        }
        let origin = self.origin.ok_or(Error::MissingMetadata)?;
        Ok(UnpackResult {
            origin,
            entries: self.entries,
        })
    }
}

/// Write `content` to `target`, then apply `mode` and `mtime`
pub(crate) fn write_file(
    target: &Path,
    content: &mut dyn Read,
    mode: u32,
    mtime: u64,
) -> Result<()> {
    remove_existing(target)?;
    let mut file = fs::File::create(target).map_err(|e| Error::io(e, target, "create"))?;
    std::io::copy(content, &mut file).map_err(|e| Error::io(e, target, "write"))?;
    file.flush().map_err(|e| Error::io(e, target, "flush"))?;
    file.set_modified(system_time(mtime))
        .map_err(|e| Error::io(e, target, "set_modified"))?;
    drop(file);
    set_mode(target, mode)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
    }
    Ok(())
}

/// Remove whatever is at `path`; a missing path is not an error
pub(crate) fn remove_existing(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(e, path, "metadata")),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path).map_err(|e| Error::io(e, path, "remove_dir_all"))
    } else {
        fs::remove_file(path).map_err(|e| Error::io(e, path, "remove_file"))
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & PERMISSION_MASK))
        .map_err(|e| Error::io(e, path, "set_permissions"))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Seconds since the epoch as a `SystemTime`
pub(crate) fn system_time(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}
