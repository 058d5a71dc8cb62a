//! Abstractions for reading byte ranges out of a resource.

use std::fmt::Debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use bytes::buf::Reader;
use bytes::{Buf, Bytes};

use crate::error::{MicroscopyError, MicroscopyResult};

/// The blocking interface used to read bytes out of an image resource.
///
/// Every call is a positioned read; implementations keep no cursor visible to callers.
///
/// Notes:
///
/// 1. [`LocalFileReader`] implements this for a file on disk and owns its handle; dropping the
///    reader closes the file.
///
/// 2. [`BytesReader`] serves an in-memory buffer.
pub trait FileReader: Debug + Send + Sync {
    /// Retrieve the bytes in `range`.
    fn get_bytes(&self, range: Range<u64>) -> MicroscopyResult<Bytes>;

    /// Total length of the resource in bytes.
    fn len(&self) -> u64;

    /// `true` if the resource holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// This allows Box<dyn FileReader + '_> to be used as a FileReader,
impl FileReader for Box<dyn FileReader + '_> {
    fn get_bytes(&self, range: Range<u64>) -> MicroscopyResult<Bytes> {
        self.as_ref().get_bytes(range)
    }

    fn len(&self) -> u64 {
        self.as_ref().len()
    }
}

/// This allows Arc<dyn FileReader + '_> to be used as a FileReader,
impl FileReader for Arc<dyn FileReader + '_> {
    fn get_bytes(&self, range: Range<u64>) -> MicroscopyResult<Bytes> {
        self.as_ref().get_bytes(range)
    }

    fn len(&self) -> u64 {
        self.as_ref().len()
    }
}

fn check_range(range: &Range<u64>, len: u64) -> MicroscopyResult<()> {
    if range.start > range.end {
        return Err(MicroscopyError::General(format!(
            "invalid byte range {}..{}",
            range.start, range.end
        )));
    }
    if range.end > len {
        let available = len.saturating_sub(range.start);
        return Err(MicroscopyError::EndOfFile(
            range.end - range.start,
            available,
        ));
    }
    Ok(())
}

/// A [`FileReader`] over a file on the local filesystem.
///
/// `Read` and `Seek` require mutable access while the [`FileReader`] trait reads through a
/// shared reference, so the handle is kept in a `Mutex`.
#[derive(Debug)]
pub struct LocalFileReader {
    path: PathBuf,
    file: Mutex<File>,
    len: u64,
}

impl LocalFileReader {
    /// Open `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> MicroscopyResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            file: Mutex::new(file),
            len,
        })
    }

    /// The path this reader was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileReader for LocalFileReader {
    fn get_bytes(&self, range: Range<u64>) -> MicroscopyResult<Bytes> {
        check_range(&range, self.len)?;

        let mut file = self
            .file
            .lock()
            .map_err(|_| MicroscopyError::General("file handle lock poisoned".to_string()))?;
        file.seek(SeekFrom::Start(range.start))?;

        let mut buffer = vec![0; (range.end - range.start) as usize];
        file.read_exact(&mut buffer)?;
        Ok(buffer.into())
    }

    fn len(&self) -> u64 {
        self.len
    }
}

/// A [`FileReader`] over bytes already in memory.
#[derive(Debug, Clone)]
pub struct BytesReader(Bytes);

impl BytesReader {
    /// Wrap a buffer.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }
}

impl FileReader for BytesReader {
    fn get_bytes(&self, range: Range<u64>) -> MicroscopyResult<Bytes> {
        check_range(&range, self.0.len() as u64)?;
        Ok(self.0.slice(range.start as usize..range.end as usize))
    }

    fn len(&self) -> u64 {
        self.0.len() as u64
    }
}

/// Endianness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Little Endian
    LittleEndian,
    /// Big Endian
    BigEndian,
}

impl Endianness {
    /// `true` for little endian.
    pub fn is_little_endian(&self) -> bool {
        matches!(self, Endianness::LittleEndian)
    }
}

pub(crate) struct EndianAwareReader {
    reader: Reader<Bytes>,
    endianness: Endianness,
}

impl EndianAwareReader {
    pub(crate) fn new(bytes: Bytes, endianness: Endianness) -> Self {
        Self {
            reader: bytes.reader(),
            endianness,
        }
    }

    /// Read a u8 from the cursor, advancing the internal state by 1 byte.
    pub(crate) fn read_u8(&mut self) -> MicroscopyResult<u8> {
        Ok(self.reader.read_u8()?)
    }

    /// Read a i8 from the cursor, advancing the internal state by 1 byte.
    pub(crate) fn read_i8(&mut self) -> MicroscopyResult<i8> {
        Ok(self.reader.read_i8()?)
    }

    pub(crate) fn read_u16(&mut self) -> MicroscopyResult<u16> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_u16::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_u16::<BigEndian>()?),
        }
    }

    pub(crate) fn read_i16(&mut self) -> MicroscopyResult<i16> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_i16::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_i16::<BigEndian>()?),
        }
    }

    pub(crate) fn read_u32(&mut self) -> MicroscopyResult<u32> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_u32::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_u32::<BigEndian>()?),
        }
    }

    pub(crate) fn read_i32(&mut self) -> MicroscopyResult<i32> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_i32::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_i32::<BigEndian>()?),
        }
    }

    pub(crate) fn read_u64(&mut self) -> MicroscopyResult<u64> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_u64::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_u64::<BigEndian>()?),
        }
    }

    pub(crate) fn read_i64(&mut self) -> MicroscopyResult<i64> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_i64::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_i64::<BigEndian>()?),
        }
    }

    pub(crate) fn read_f32(&mut self) -> MicroscopyResult<f32> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_f32::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_f32::<BigEndian>()?),
        }
    }

    pub(crate) fn read_f64(&mut self) -> MicroscopyResult<f64> {
        match self.endianness {
            Endianness::LittleEndian => Ok(self.reader.read_f64::<LittleEndian>()?),
            Endianness::BigEndian => Ok(self.reader.read_f64::<BigEndian>()?),
        }
    }
}

impl AsRef<[u8]> for EndianAwareReader {
    fn as_ref(&self) -> &[u8] {
        self.reader.get_ref().as_ref()
    }
}

impl Read for EndianAwareReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}
