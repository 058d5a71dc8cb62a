use std::ops::Range;

use bytes::Bytes;

use crate::error::MicroscopyResult;
use crate::reader::{EndianAwareReader, Endianness, FileReader};
use crate::tiff::TiffError;

/// Byte source for [`TiffMetadataReader`] and [`ImageFileDirectoryReader`].
///
/// Every [`FileReader`] is one.
///
/// [`TiffMetadataReader`]: super::TiffMetadataReader
/// [`ImageFileDirectoryReader`]: super::ImageFileDirectoryReader
/// [`ImageFileDirectory`]: crate::ImageFileDirectory
pub trait MetadataFetch {
    /// Fetch the specified range of bytes.
    fn fetch(&self, range: Range<u64>) -> MicroscopyResult<Bytes>;

    /// Total length of the underlying resource.
    fn len(&self) -> u64;

    /// `true` if the underlying resource is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: FileReader> MetadataFetch for T {
    fn fetch(&self, range: Range<u64>) -> MicroscopyResult<Bytes> {
        self.get_bytes(range)
    }

    fn len(&self) -> u64 {
        FileReader::len(self)
    }
}

/// Holds the head of a file in memory.
///
/// Directories usually sit near the start, so most entry reads never reach the source.
#[derive(Debug)]
pub struct PrefetchBuffer<F: MetadataFetch> {
    fetch: F,
    buffer: Bytes,
}

impl<F: MetadataFetch> PrefetchBuffer<F> {
    /// Fetch the first `prefetch` bytes, or the whole file if it is shorter.
    pub fn new(fetch: F, prefetch: u64) -> MicroscopyResult<Self> {
        let end = prefetch.min(fetch.len());
        let buffer = fetch.fetch(0..end)?;
        Ok(Self { fetch, buffer })
    }
}

impl<F: MetadataFetch> MetadataFetch for PrefetchBuffer<F> {
    fn fetch(&self, range: Range<u64>) -> MicroscopyResult<Bytes> {
        if range.start <= range.end && range.end <= self.buffer.len() as u64 {
            let usize_range = range.start as usize..range.end as usize;
            Ok(self.buffer.slice(usize_range))
        } else {
            self.fetch.fetch(range)
        }
    }

    fn len(&self) -> u64 {
        self.fetch.len()
    }
}

pub(crate) struct MetadataCursor<'a, F: MetadataFetch> {
    fetch: &'a F,
    offset: u64,
    endianness: Endianness,
}

impl<'a, F: MetadataFetch> MetadataCursor<'a, F> {
    pub fn at(fetch: &'a F, endianness: Endianness, offset: u64) -> Self {
        Self {
            fetch,
            offset,
            endianness,
        }
    }

    pub fn seek(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Fetch `length` bytes at the cursor and step past them.
    pub(crate) fn read(&mut self, length: u64) -> MicroscopyResult<EndianAwareReader> {
        let end = self.offset.checked_add(length).ok_or(TiffError::IntSizeError)?;
        let bytes = self.fetch.fetch(self.offset..end)?;
        self.offset = end;
        Ok(EndianAwareReader::new(bytes, self.endianness))
    }

    pub(crate) fn read_u16(&mut self) -> MicroscopyResult<u16> {
        self.read(2)?.read_u16()
    }

    pub(crate) fn read_u32(&mut self) -> MicroscopyResult<u32> {
        self.read(4)?.read_u32()
    }

    pub(crate) fn read_u64(&mut self) -> MicroscopyResult<u64> {
        self.read(8)?.read_u64()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reader::BytesReader;

    #[test]
    fn prefetch_serves_prefix_and_falls_through() {
        let data: Vec<u8> = (0..64).collect();
        let buffered = PrefetchBuffer::new(BytesReader::new(data), 16).unwrap();
        assert_eq!(&buffered.fetch(0..16).unwrap()[..], &(0..16).collect::<Vec<u8>>()[..]);
        assert_eq!(&buffered.fetch(60..64).unwrap()[..], &[60, 61, 62, 63]);
        assert_eq!(MetadataFetch::len(&buffered), 64);
    }

    #[test]
    fn short_file_is_buffered_whole() {
        let buffered = PrefetchBuffer::new(BytesReader::new(vec![1u8, 2, 3]), 1024).unwrap();
        assert_eq!(&buffered.fetch(0..3).unwrap()[..], &[1, 2, 3]);
    }
}
