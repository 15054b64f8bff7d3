//! Zip output packer

use super::{
    EntryKind, METADATA_PATH, OutputPacker, PERMISSION_MASK, PackEntry, PackResult, TreeUnpacker,
    UnpackResult, UnpackTarget, collect_entries, write_file,
};
use crate::origin::OriginMetadata;
use crate::tree::OutputTree;
use crate::{Error, Result};
use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};
use chrono::{Datelike, NaiveDate, Timelike};
use std::fs;
use std::io::{Cursor, Read, Write};
use tracing::debug;

/// Packs outputs into a deflate-compressed zip archive
///
/// Zip needs a seekable sink, so the archive is assembled in memory before
/// it is copied to the output stream. Modification times use the DOS
/// encoding and therefore have a two second resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPacker;

impl ZipPacker {
    /// Create a zip packer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn zip_error(operation: &'static str) -> impl FnOnce(::zip::result::ZipError) -> Error {
    move |e| Error::archive(format!("zip {operation} failed: {e}"))
}

fn options(mode: u32, mtime: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(mode)
        .last_modified_time(dos_time(mtime))
}

/// Entries past the 32-bit size fields need zip64 extra fields
fn needs_zip64(size: u64) -> bool {
    size > u64::from(u32::MAX)
}

/// Convert epoch seconds to a DOS timestamp, clamping to the zip epoch
fn dos_time(secs: u64) -> DateTime {
    let Some(time) = i64::try_from(secs)
        .ok()
        .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
    else {
        return DateTime::default();
    };
    let (Ok(year), Ok(month), Ok(day), Ok(hour), Ok(minute), Ok(second)) = (
        u16::try_from(time.year()),
        u8::try_from(time.month()),
        u8::try_from(time.day()),
        u8::try_from(time.hour()),
        u8::try_from(time.minute()),
        u8::try_from(time.second()),
    ) else {
        return DateTime::default();
    };
    DateTime::from_date_and_time(year, month, day, hour, minute, second).unwrap_or_default()
}

/// Convert a DOS timestamp back to epoch seconds
fn epoch_secs(time: DateTime) -> u64 {
    NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )
    .and_then(|date| {
        date.and_hms_opt(
            u32::from(time.hour()),
            u32::from(time.minute()),
            u32::from(time.second()),
        )
    })
    .map_or(0, |t| u64::try_from(t.and_utc().timestamp()).unwrap_or(0))
}

impl OutputPacker for ZipPacker {
    fn pack(
        &self,
        trees: &[OutputTree],
        origin: &OriginMetadata,
        output: &mut dyn Write,
    ) -> Result<PackResult> {
        let entries = collect_entries(trees)?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        let mut metadata = Vec::new();
        origin.write_to(&mut metadata)?;
        writer
            .start_file(METADATA_PATH, options(0o644, 0))
            .map_err(zip_error("start entry"))?;
        writer
            .write_all(&metadata)
            .map_err(|e| Error::io_no_path(e, "zip write"))?;

        for entry in &entries {
            match entry {
                PackEntry::Missing { path } => {
                    writer
                        .start_file(path.as_str(), options(0o644, 0))
                        .map_err(zip_error("start entry"))?;
                }
                PackEntry::Directory { path, mode, mtime } => {
                    writer
                        .add_directory(path.as_str(), options(*mode, *mtime))
                        .map_err(zip_error("add directory"))?;
                }
                PackEntry::File {
                    path,
                    source,
                    size,
                    mode,
                    mtime,
                } => {
                    let file_options = options(*mode, *mtime).large_file(needs_zip64(*size));
                    writer
                        .start_file(path.as_str(), file_options)
                        .map_err(zip_error("start entry"))?;
                    let mut file =
                        fs::File::open(source).map_err(|e| Error::io(e, source, "open"))?;
                    std::io::copy(&mut (&mut file).take(*size), &mut writer)
                        .map_err(|e| Error::io(e, source, "zip write"))?;
                }
            }
        }

        let buffer = writer.finish().map_err(zip_error("finish"))?.into_inner();
        output
            .write_all(&buffer)
            .map_err(|e| Error::io_no_path(e, "zip output"))?;

        let count = entries.len() as u64 + 1;
        debug!(entries = count, bytes = buffer.len(), "Packed outputs into zip archive");
        Ok(PackResult { entries: count })
    }

    fn unpack(&self, trees: &[OutputTree], input: &mut dyn Read) -> Result<UnpackResult> {
        let mut buffer = Vec::new();
        input
            .read_to_end(&mut buffer)
            .map_err(|e| Error::io_no_path(e, "zip read"))?;
        let mut archive = ZipArchive::new(Cursor::new(buffer)).map_err(zip_error("open"))?;
        let mut unpacker = TreeUnpacker::new(trees);

        for index in 0..archive.len() {
            let mut file = archive.by_index(index).map_err(zip_error("read entry"))?;
            let path = file.name().to_string();
            let kind = if file.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            let mode = file.unix_mode().map_or(0o644, |m| m & PERMISSION_MASK);
            let mtime = file.last_modified().map_or(0, epoch_secs);

            match unpacker.begin_entry(&path, kind, mode)? {
                UnpackTarget::Metadata => {
                    unpacker.set_origin(OriginMetadata::read_from(&mut file)?);
                }
                UnpackTarget::Done => {}
                UnpackTarget::File(target) => write_file(&target, &mut file, mode, mtime)?,
            }
        }

        let result = unpacker.finish()?;
        debug!(entries = result.entries, "Unpacked outputs from zip archive");
        Ok(result)
    }
}
