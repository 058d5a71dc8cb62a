use std::collections::{HashMap, HashSet};
use std::io::Read;

use bytes::Bytes;

use crate::error::{MicroscopyError, MicroscopyResult};
use crate::metadata::fetch::MetadataCursor;
use crate::metadata::MetadataFetch;
use crate::reader::{EndianAwareReader, Endianness};
use crate::tiff::tags::{Tag, Type};
use crate::tiff::{TiffError, TiffFormatError, Value};
use crate::ImageFileDirectory;

/// Walks the directory chain of a TIFF or BigTIFF file.
///
/// The chain length is only known once the last next-offset of zero is seen, so the walker keeps
/// the pending offset between calls. Offsets already visited are remembered so that a chain
/// pointing back into itself ends the walk.
///
/// ```notest
/// let mut metadata_reader = TiffMetadataReader::try_open(&fetch)?;
/// let ifds = metadata_reader.read_all_ifds(&fetch)?;
/// ```
#[derive(Debug)]
pub struct TiffMetadataReader {
    endianness: Endianness,
    bigtiff: bool,
    next_ifd_offset: Option<u64>,
    visited: HashSet<u64>,
}

impl TiffMetadataReader {
    /// Parse the file header: byte order mark, version (42 or 43) and first directory offset.
    ///
    /// No directory is read yet.
    pub fn try_open<F: MetadataFetch>(fetch: &F) -> MicroscopyResult<Self> {
        if fetch.len() < 8 {
            return Err(TiffError::FormatError(TiffFormatError::TiffSignatureNotFound).into());
        }
        let magic_bytes = fetch.fetch(0..2)?;

        let endianness = if magic_bytes == Bytes::from_static(b"II") {
            Endianness::LittleEndian
        } else if magic_bytes == Bytes::from_static(b"MM") {
            Endianness::BigEndian
        } else {
            return Err(TiffError::FormatError(TiffFormatError::TiffSignatureNotFound).into());
        };

        let mut cursor = MetadataCursor::at(fetch, endianness, 2);

        let version = cursor.read_u16()?;
        let bigtiff = match version {
            42 => false,
            43 => {
                // Offset size, then a reserved zero
                if cursor.read_u16()? != 8 {
                    return Err(
                        TiffError::FormatError(TiffFormatError::TiffSignatureNotFound).into(),
                    );
                }
                if cursor.read_u16()? != 0 {
                    return Err(
                        TiffError::FormatError(TiffFormatError::TiffSignatureNotFound).into(),
                    );
                }
                true
            }
            _ => return Err(TiffError::FormatError(TiffFormatError::TiffSignatureInvalid).into()),
        };

        let first_ifd_location = if bigtiff {
            cursor.read_u64()?
        } else {
            cursor.read_u32()?.into()
        };

        if first_ifd_location == 0 {
            return Err(
                TiffError::FormatError(TiffFormatError::ImageFileDirectoryNotFound).into(),
            );
        }

        Ok(Self {
            endianness,
            bigtiff,
            next_ifd_offset: Some(first_ifd_location),
            visited: HashSet::new(),
        })
    }

    /// Byte order declared by the header.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// `true` for a version 43 header.
    pub fn bigtiff(&self) -> bool {
        self.bigtiff
    }

    /// `false` once the chain has ended.
    pub fn has_next_ifd(&self) -> bool {
        self.next_ifd_offset.is_some()
    }

    /// Offset of the directory [`read_next_ifd`][Self::read_next_ifd] will read, if any.
    pub fn next_ifd_offset(&self) -> Option<u64> {
        self.next_ifd_offset
    }

    /// Read one directory and advance to the next offset.
    ///
    /// Returns `None` at the end of the chain. An offset pointing at an IFD that was already
    /// read ends the chain and is reported as [`TiffFormatError::CycleInOffsets`]; an offset past
    /// the end of the file is reported as [`TiffFormatError::TruncatedFile`].
    pub fn read_next_ifd<F: MetadataFetch>(
        &mut self,
        fetch: &F,
    ) -> MicroscopyResult<Option<ImageFileDirectory>> {
        let Some(ifd_start) = self.next_ifd_offset else {
            return Ok(None);
        };

        if !self.visited.insert(ifd_start) {
            self.next_ifd_offset = None;
            return Err(TiffError::FormatError(TiffFormatError::CycleInOffsets).into());
        }

        let length = fetch.len();
        if ifd_start >= length {
            self.next_ifd_offset = None;
            return Err(TiffError::FormatError(TiffFormatError::TruncatedFile {
                offset: ifd_start,
                length,
            })
            .into());
        }

        let ifd_reader =
            ImageFileDirectoryReader::open(fetch, ifd_start, self.bigtiff, self.endianness)
                .map_err(|err| truncated(err, ifd_start, length))?;
        let ifd = ifd_reader.read(fetch)?;
        let next_ifd_offset = ifd_reader
            .finish(fetch)
            .map_err(|err| truncated(err, ifd_start, length))?;
        tracing::debug!(
            offset = ifd_start,
            entries = ifd_reader.tag_count,
            "read image file directory"
        );
        self.next_ifd_offset = next_ifd_offset;
        Ok(Some(ifd))
    }

    /// Read every remaining directory in chain order.
    pub fn read_all_ifds<F: MetadataFetch>(
        &mut self,
        fetch: &F,
    ) -> MicroscopyResult<Vec<ImageFileDirectory>> {
        let mut ifds = vec![];
        while let Some(ifd) = self.read_next_ifd(fetch)? {
            ifds.push(ifd);
        }
        Ok(ifds)
    }
}

/// A directory whose entries run past the end of the file is truncated rather than merely short.
fn truncated(err: MicroscopyError, offset: u64, length: u64) -> MicroscopyError {
    match err {
        MicroscopyError::EndOfFile(..) => {
            TiffError::FormatError(TiffFormatError::TruncatedFile { offset, length }).into()
        }
        err => err,
    }
}

/// Reads the entries of one directory.
///
/// Directories may sit anywhere in the file, and their out-of-line values anywhere else, so every
/// entry is fetched by offset. [`finish`][ImageFileDirectoryReader::finish] reads the link to the
/// following directory.
#[derive(Debug)]
pub struct ImageFileDirectoryReader {
    endianness: Endianness,
    bigtiff: bool,
    start: u64,
    tag_count: u64,
    /// 12 bytes, or 20 in BigTIFF.
    entry_size: u64,
    /// Width of the entry count field: 2 bytes, or 8 in BigTIFF.
    count_size: u64,
}

impl ImageFileDirectoryReader {
    /// Read the entry count of the directory at `start`.
    pub fn open<F: MetadataFetch>(
        fetch: &F,
        start: u64,
        bigtiff: bool,
        endianness: Endianness,
    ) -> MicroscopyResult<Self> {
        let mut cursor = MetadataCursor::at(fetch, endianness, start);
        // Entry: tag u16, type u16, count u32/u64, value or offset u32/u64.
        let (entry_size, count_size, tag_count) = if bigtiff {
            (20, 8, cursor.read_u64()?)
        } else {
            (12, 2, u64::from(cursor.read_u16()?))
        };
        Ok(Self {
            endianness,
            bigtiff,
            start,
            tag_count,
            entry_size,
            count_size,
        })
    }

    /// Number of entries in this directory.
    pub fn tag_count(&self) -> u64 {
        self.tag_count
    }

    /// Read entry `tag_idx`.
    ///
    /// Returns `None` for entries whose field type is unknown; those are skipped.
    pub fn read_tag<F: MetadataFetch>(
        &self,
        fetch: &F,
        tag_idx: u64,
    ) -> MicroscopyResult<Option<(Tag, Value)>> {
        if tag_idx >= self.tag_count {
            return Err(MicroscopyError::General(format!(
                "entry {tag_idx} out of range for {} entries",
                self.tag_count
            )));
        }
        let entry = self.start + self.count_size + self.entry_size * tag_idx;
        read_tag(fetch, entry, self.endianness, self.bigtiff)
    }

    /// Read every entry into a typed directory.
    pub fn read<F: MetadataFetch>(&self, fetch: &F) -> MicroscopyResult<ImageFileDirectory> {
        let mut tags = HashMap::with_capacity(self.tag_count.min(1024) as usize);
        for idx in 0..self.tag_count {
            if let Some((tag, value)) = self.read_tag(fetch, idx)? {
                tags.insert(tag, value);
            }
        }
        Ok(ImageFileDirectory::from_tags(tags, self.endianness)?)
    }

    /// Read the link that follows the last entry; zero ends the chain.
    pub fn finish<F: MetadataFetch>(&self, fetch: &F) -> MicroscopyResult<Option<u64>> {
        let link = self.start + self.count_size + self.entry_size * self.tag_count;
        let mut cursor = MetadataCursor::at(fetch, self.endianness, link);
        let next = if self.bigtiff {
            cursor.read_u64()?
        } else {
            cursor.read_u32()?.into()
        };
        Ok((next != 0).then_some(next))
    }
}

fn read_tag<F: MetadataFetch>(
    fetch: &F,
    entry: u64,
    endianness: Endianness,
    bigtiff: bool,
) -> MicroscopyResult<Option<(Tag, Value)>> {
    let mut cursor = MetadataCursor::at(fetch, endianness, entry);

    let tag_name = Tag::from_u16_exhaustive(cursor.read_u16()?);

    let tag_type_code = cursor.read_u16()?;
    let Some(tag_type) = Type::from_u16(tag_type_code) else {
        tracing::warn!(tag = ?tag_name, field_type = tag_type_code, "skipping entry with unknown field type");
        return Ok(None);
    };
    let count = if bigtiff {
        cursor.read_u64()?
    } else {
        cursor.read_u32()?.into()
    };

    let tag_value = read_tag_value(&mut cursor, tag_type, count, bigtiff)?;

    Ok(Some((tag_name, tag_value)))
}

/// Read a tag's value from the cursor, which sits at the entry's value slot.
///
/// Values that fit in the slot (4 bytes, or 8 in BigTIFF) are stored inline; larger ones are
/// stored at the offset held in the slot.
fn read_tag_value<F: MetadataFetch>(
    cursor: &mut MetadataCursor<'_, F>,
    tag_type: Type,
    count: u64,
    bigtiff: bool,
) -> MicroscopyResult<Value> {
    if count == 0 {
        return Ok(Value::List(vec![]));
    }

    let value_byte_length = count
        .checked_mul(tag_type.size())
        .ok_or(TiffError::IntSizeError)?;
    let inline_capacity = if bigtiff { 8 } else { 4 };

    let mut data = if value_byte_length <= inline_capacity {
        cursor.read(value_byte_length)?
    } else {
        let offset = if bigtiff {
            cursor.read_u64()?
        } else {
            cursor.read_u32()?.into()
        };
        cursor.seek(offset);
        cursor.read(value_byte_length)?
    };

    if tag_type == Type::ASCII {
        let mut buf = vec![0; value_byte_length as usize];
        data.read_exact(&mut buf)?;
        if let Some(first_null) = buf.iter().position(|&b| b == 0) {
            buf.truncate(first_null);
        }
        return Ok(Value::Ascii(String::from_utf8_lossy(&buf).into_owned()));
    }

    if count == 1 {
        return read_single_value(&mut data, tag_type);
    }

    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        values.push(read_single_value(&mut data, tag_type)?);
    }
    Ok(Value::List(values))
}

fn read_single_value(data: &mut EndianAwareReader, tag_type: Type) -> MicroscopyResult<Value> {
    Ok(match tag_type {
        Type::BYTE | Type::UNDEFINED => Value::Byte(data.read_u8()?),
        Type::SBYTE => Value::SignedByte(data.read_i8()?),
        Type::SHORT => Value::Short(data.read_u16()?),
        Type::SSHORT => Value::SignedShort(data.read_i16()?),
        Type::LONG => Value::Unsigned(data.read_u32()?),
        Type::SLONG => Value::Signed(data.read_i32()?),
        Type::FLOAT => Value::Float(data.read_f32()?),
        Type::DOUBLE => Value::Double(data.read_f64()?),
        Type::RATIONAL => Value::Rational(data.read_u32()?, data.read_u32()?),
        Type::SRATIONAL => Value::SRational(data.read_i32()?, data.read_i32()?),
        Type::IFD => Value::Ifd(data.read_u32()?),
        Type::LONG8 => Value::UnsignedBig(data.read_u64()?),
        Type::SLONG8 => Value::SignedBig(data.read_i64()?),
        Type::IFD8 => Value::IfdBig(data.read_u64()?),
        // Handled by the caller.
        Type::ASCII => Value::Byte(data.read_u8()?),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reader::BytesReader;

    /// Little-endian classic TIFF with one directory at offset 8.
    fn single_entry_file(field_type: u16, count: u32, value: [u8; 4], extra: &[u8]) -> Vec<u8> {
        let mut file = b"II*\0".to_vec();
        file.extend_from_slice(&8u32.to_le_bytes());
        file.extend_from_slice(&3u16.to_le_bytes());
        // ImageWidth, ImageLength as SHORT
        for (tag, val) in [(256u16, 5u16), (257, 7)] {
            file.extend_from_slice(&tag.to_le_bytes());
            file.extend_from_slice(&3u16.to_le_bytes());
            file.extend_from_slice(&1u32.to_le_bytes());
            file.extend_from_slice(&val.to_le_bytes());
            file.extend_from_slice(&[0, 0]);
        }
        file.extend_from_slice(&305u16.to_le_bytes());
        file.extend_from_slice(&field_type.to_le_bytes());
        file.extend_from_slice(&count.to_le_bytes());
        file.extend_from_slice(&value);
        file.extend_from_slice(&0u32.to_le_bytes());
        file.extend_from_slice(extra);
        file
    }

    #[test]
    fn inline_and_offset_values() {
        let file = single_entry_file(2, 4, *b"abc\0", &[]);
        let reader = BytesReader::new(file);
        let mut metadata = TiffMetadataReader::try_open(&reader).unwrap();
        let ifds = metadata.read_all_ifds(&reader).unwrap();
        assert_eq!(ifds.len(), 1);
        assert_eq!(ifds[0].image_width(), 5);
        assert_eq!(ifds[0].image_height(), 7);
        assert_eq!(ifds[0].software(), Some("abc"));

        // 8 byte string stored after the directory (8 + 2 + 36 + 4 = 50)
        let file = single_entry_file(2, 8, 50u32.to_le_bytes(), b"microscp");
        let reader = BytesReader::new(file);
        let ifds = TiffMetadataReader::try_open(&reader)
            .unwrap()
            .read_all_ifds(&reader)
            .unwrap();
        assert_eq!(ifds[0].software(), Some("microscp"));
    }

    #[test]
    fn unknown_field_type_is_skipped() {
        let file = single_entry_file(99, 1, [1, 2, 3, 4], &[]);
        let reader = BytesReader::new(file);
        let ifds = TiffMetadataReader::try_open(&reader)
            .unwrap()
            .read_all_ifds(&reader)
            .unwrap();
        assert_eq!(ifds[0].software(), None);
        assert_eq!(ifds[0].image_width(), 5);
    }

    #[test]
    fn bad_magic() {
        let reader = BytesReader::new(b"XX*\0\x08\0\0\0".to_vec());
        assert!(matches!(
            TiffMetadataReader::try_open(&reader),
            Err(MicroscopyError::InternalTIFFError(TiffError::FormatError(
                TiffFormatError::TiffSignatureNotFound
            )))
        ));
        let reader = BytesReader::new(b"II+\0\x08\0\0\0".to_vec());
        assert!(TiffMetadataReader::try_open(&reader).is_err());
    }
}
