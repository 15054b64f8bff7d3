//! Tar output packer

use super::{
    EntryKind, METADATA_PATH, OutputPacker, PackEntry, PackResult, TreeUnpacker, UnpackResult,
    UnpackTarget, collect_entries, write_file,
};
use crate::origin::OriginMetadata;
use crate::tree::OutputTree;
use crate::{Error, Result};
use ::tar::{Archive, Builder, EntryType, Header};
use std::fs;
use std::io::{Read, Write};
use tracing::debug;

/// Packs outputs into an uncompressed tar stream
///
/// Headers carry zero owner ids and no user names, so the archive only
/// depends on the packed file content, paths, modes and modification times.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarPacker;

impl TarPacker {
    /// Create a tar packer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn header(entry_type: EntryType, size: u64, mode: u32, mtime: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    header
}

fn tar_error(operation: &str) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |e| Error::io_no_path(e, format!("tar {operation}"))
}

impl OutputPacker for TarPacker {
    fn pack(
        &self,
        trees: &[OutputTree],
        origin: &OriginMetadata,
        output: &mut dyn Write,
    ) -> Result<PackResult> {
        let entries = collect_entries(trees)?;
        let mut builder = Builder::new(output);

        let mut metadata = Vec::new();
        origin.write_to(&mut metadata)?;
        let mut meta_header = header(EntryType::Regular, metadata.len() as u64, 0o644, 0);
        builder
            .append_data(&mut meta_header, METADATA_PATH, metadata.as_slice())
            .map_err(tar_error("append"))?;

        for entry in &entries {
            match entry {
                PackEntry::Missing { path } => {
                    let mut h = header(EntryType::Regular, 0, 0o644, 0);
                    builder
                        .append_data(&mut h, path, std::io::empty())
                        .map_err(tar_error("append"))?;
                }
                PackEntry::Directory { path, mode, mtime } => {
                    let mut h = header(EntryType::Directory, 0, *mode, *mtime);
                    builder
                        .append_data(&mut h, path, std::io::empty())
                        .map_err(tar_error("append"))?;
                }
                PackEntry::File {
                    path,
                    source,
                    size,
                    mode,
                    mtime,
                } => {
                    let file =
                        fs::File::open(source).map_err(|e| Error::io(e, source, "open"))?;
                    let mut h = header(EntryType::Regular, *size, *mode, *mtime);
                    builder
                        .append_data(&mut h, path, file.take(*size))
                        .map_err(|e| Error::io(e, source, "tar append"))?;
                }
            }
        }

        builder.finish().map_err(tar_error("finish"))?;
        let count = entries.len() as u64 + 1;
        debug!(entries = count, "Packed outputs into tar archive");
        Ok(PackResult { entries: count })
    }

    fn unpack(&self, trees: &[OutputTree], input: &mut dyn Read) -> Result<UnpackResult> {
        let mut unpacker = TreeUnpacker::new(trees);
        let mut archive = Archive::new(input);

        for entry in archive.entries().map_err(tar_error("read"))? {
            let mut entry = entry.map_err(tar_error("read entry"))?;
            let path = entry
                .path()
                .map_err(tar_error("read path"))?
                .to_string_lossy()
                .into_owned();
            let header = entry.header();
            let kind = if header.entry_type().is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            let mode = header.mode().map_err(tar_error("read mode"))?;
            let mtime = header.mtime().map_err(tar_error("read mtime"))?;

            match unpacker.begin_entry(&path, kind, mode)? {
                UnpackTarget::Metadata => {
                    unpacker.set_origin(OriginMetadata::read_from(&mut entry)?);
                }
                UnpackTarget::Done => {}
                UnpackTarget::File(target) => write_file(&target, &mut entry, mode, mtime)?,
            }
        }

        let result = unpacker.finish()?;
        debug!(entries = result.entries, "Unpacked outputs from tar archive");
        Ok(result)
    }
}
