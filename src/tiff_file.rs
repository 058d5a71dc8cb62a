use std::sync::Arc;

use crate::decoder::DecoderRegistry;
use crate::error::{MicroscopyError, MicroscopyResult};
use crate::ifd::ImageFileDirectory;
use crate::metadata::{PrefetchBuffer, TiffMetadataReader};
use crate::reader::{Endianness, FileReader};
use crate::series::Region;

/// Bytes fetched up front to serve directory reads.
pub const DEFAULT_PREFETCH: u64 = 32 * 1024;

/// An open TIFF file: its directories plus the reader their strips and tiles live in.
#[derive(Debug, Clone)]
pub struct TIFF {
    reader: Arc<dyn FileReader>,
    ifds: Vec<ImageFileDirectory>,
    endianness: Endianness,
    bigtiff: bool,
}

impl TIFF {
    /// Read the header and the whole directory chain of `reader`.
    pub fn open(reader: Arc<dyn FileReader>, prefetch: u64) -> MicroscopyResult<Self> {
        let prefetch_reader = PrefetchBuffer::new(reader.clone(), prefetch)?;
        let mut metadata_reader = TiffMetadataReader::try_open(&prefetch_reader)?;
        let ifds = metadata_reader.read_all_ifds(&prefetch_reader)?;
        Ok(Self {
            reader,
            ifds,
            endianness: metadata_reader.endianness(),
            bigtiff: metadata_reader.bigtiff(),
        })
    }

    /// Access the underlying Image File Directories.
    pub fn ifds(&self) -> &[ImageFileDirectory] {
        &self.ifds
    }

    /// Byte order of the file.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// `true` for BigTIFF files.
    pub fn bigtiff(&self) -> bool {
        self.bigtiff
    }

    /// The reader the file was opened on.
    pub fn reader(&self) -> &Arc<dyn FileReader> {
        &self.reader
    }

    /// Read a sub-rectangle of the image held by directory `ifd`.
    pub fn read_region(
        &self,
        ifd: usize,
        region: &Region,
        registry: &DecoderRegistry,
    ) -> MicroscopyResult<Vec<u8>> {
        let directory = self.ifds.get(ifd).ok_or_else(|| {
            MicroscopyError::General(format!(
                "directory {ifd} out of range for {} directories",
                self.ifds.len()
            ))
        })?;
        directory.read_region(self.reader.as_ref(), registry, region)
    }
}
