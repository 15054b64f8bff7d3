//! Gzip decorator for another packer

use super::{OutputPacker, PackResult, UnpackResult};
use crate::origin::OriginMetadata;
use crate::tree::OutputTree;
use crate::{Error, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

/// Compresses the stream of an inner packer on write and decompresses it on read
#[derive(Debug, Clone, Default)]
pub struct GzipPacker<P> {
    inner: P,
}

impl<P: OutputPacker> GzipPacker<P> {
    /// Wrap `inner`
    #[must_use]
    pub const fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: OutputPacker> OutputPacker for GzipPacker<P> {
    fn pack(
        &self,
        trees: &[OutputTree],
        origin: &OriginMetadata,
        output: &mut dyn Write,
    ) -> Result<PackResult> {
        let mut encoder = GzEncoder::new(output, Compression::default());
        let result = self.inner.pack(trees, origin, &mut encoder)?;
        encoder
            .finish()
            .map_err(|e| Error::io_no_path(e, "gzip finish"))?;
        Ok(result)
    }

    fn unpack(&self, trees: &[OutputTree], input: &mut dyn Read) -> Result<UnpackResult> {
        let mut decoder = GzDecoder::new(input);
        self.inner.unpack(trees, &mut decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::BuildInvocationId;
    use crate::packer::TarPacker;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_gzip_output_has_gzip_magic() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("report.txt");
        fs::write(&file, "report").unwrap();

        let trees = vec![OutputTree::file("report", &file)];
        let origin = OriginMetadata::new(BuildInvocationId::generate(), Duration::ZERO);
        let mut bytes = Vec::new();
        GzipPacker::new(TarPacker::new())
            .pack(&trees, &origin, &mut bytes)
            .unwrap();

        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_gzip_rejects_plain_tar() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("report.txt");
        fs::write(&file, "report").unwrap();

        let trees = vec![OutputTree::file("report", &file)];
        let origin = OriginMetadata::new(BuildInvocationId::generate(), Duration::ZERO);
        let mut bytes = Vec::new();
        TarPacker::new().pack(&trees, &origin, &mut bytes).unwrap();

        let result = GzipPacker::new(TarPacker::new()).unpack(&trees, &mut bytes.as_slice());
        assert!(result.is_err());
    }
}
