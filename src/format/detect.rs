//! Checks the readers' `is_this_type` implementations are built from.
//!
//! They look at the TIFF header magic, the file name, and the first directory's
//! ImageDescription:
//!
//! - **OME-TIFF**: a TIFF whose first description holds an `<OME` root element
//! - **Plate**: a TIFF named `<Row><Col>_s<field>_w<channel>.tif`
//! - **File pattern**: a TIFF named `<prefix>_<c|z|t><n>.tif` with at least one sibling
//! - **TIFF**: any other classic or BigTIFF file

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::dataset::{PatternName, PlateName};
use crate::error::MicroscopyResult;
use crate::metadata::{PrefetchBuffer, TiffMetadataReader};
use crate::reader::LocalFileReader;
use crate::tiff_file::DEFAULT_PREFETCH;

/// Header size needed to tell classic TIFF from BigTIFF.
const HEADER_BYTES: usize = 4;

/// Marker of an OME-XML document.
const OME_MARKER: &str = "<OME";

/// The TIFF header variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffFlavor {
    /// 32-bit offsets.
    Classic,
    /// 64-bit offsets.
    Big,
}

/// Classify a header by its byte-order mark and version.
pub fn tiff_flavor(header: &[u8]) -> Option<TiffFlavor> {
    match header.get(..HEADER_BYTES)? {
        b"II*\0" | b"MM\0*" => Some(TiffFlavor::Classic),
        b"II+\0" | b"MM\0+" => Some(TiffFlavor::Big),
        _ => None,
    }
}

/// Read the header of `path` and classify it.
pub fn sniff_tiff(path: &Path) -> MicroscopyResult<Option<TiffFlavor>> {
    let mut header = [0u8; HEADER_BYTES];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(tiff_flavor(&header)),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// The ImageDescription of the first directory, if it has one.
pub fn first_description(path: &Path) -> MicroscopyResult<Option<String>> {
    let reader = PrefetchBuffer::new(LocalFileReader::open(path)?, DEFAULT_PREFETCH)?;
    let mut metadata_reader = TiffMetadataReader::try_open(&reader)?;
    Ok(metadata_reader
        .read_next_ifd(&reader)?
        .and_then(|ifd| ifd.image_description().map(str::to_string)))
}

/// `true` if `description` carries an OME-XML document.
pub fn is_ome_xml(description: &str) -> bool {
    description.contains(OME_MARKER)
}

/// `true` if the file name follows the plate convention.
pub fn is_plate_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(PlateName::parse)
        .is_some()
}

/// `true` if the file name follows the multi-file convention and a sibling shares its prefix
/// and axis.
pub fn is_pattern_member(path: &Path) -> bool {
    let Some(name) = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(PatternName::parse)
    else {
        return false;
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path() != path)
        .filter_map(|entry| PatternName::parse(entry.file_name().to_str()?))
        .any(|other| other.prefix == name.prefix && other.axis == name.axis)
}
