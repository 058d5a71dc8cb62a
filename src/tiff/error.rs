use thiserror::Error;

use super::ifd::Value;
use super::tags::{CompressionMethod, PhotometricInterpretation, Predictor, SampleFormat, Tag};

/// Failures while walking directories or decoding chunks of a TIFF-family file.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum TiffError {
    /// The file is malformed.
    #[error("Format error: {0}")]
    FormatError(#[from] TiffFormatError),

    /// The file is well formed but uses a feature this crate does not decode.
    #[error("Unsupported: {0}")]
    UnsupportedError(#[from] TiffUnsupportedError),

    /// Reading the underlying bytes failed.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// A count or offset does not fit the platform's `usize` or the target integer.
    #[error("Platform or format size limits exceeded")]
    IntSizeError,

    /// The caller asked for something this directory cannot provide.
    #[error("Usage error: {0}")]
    UsageError(#[from] UsageError),
}

/// Structural problems in the file itself.
///
/// These point at a broken writer or a damaged file; retrying will not help.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum TiffFormatError {
    #[error("TIFF signature not found")]
    TiffSignatureNotFound,
    #[error("TIFF signature invalid")]
    TiffSignatureInvalid,
    #[error("Image file directory not found")]
    ImageFileDirectoryNotFound,
    #[error("Offset {offset} points past the end of a {length} byte file")]
    TruncatedFile { offset: u64, length: u64 },
    #[error("Chunk decoded to {actual_bytes} bytes, expected {required_bytes}")]
    UnexpectedCompressedData {
        actual_bytes: usize,
        required_bytes: usize,
    },
    #[error("Found {offsets} strip/tile offsets but {byte_counts} byte counts")]
    StripTileArrayMismatch { offsets: usize, byte_counts: usize },
    #[error("Directory lists {actual_chunks} strips/tiles, layout requires {required_chunks}")]
    ChunkCountMismatch {
        actual_chunks: usize,
        required_chunks: usize,
    },
    #[error("Invalid dimensions: {0}x{1}")]
    InvalidDimensions(u32, u32),
    #[error("Tag value has the wrong type: {0}")]
    InvalidTagValueType(String),
    #[error("Required tag {0:?} not found")]
    RequiredTagNotFound(Tag),
    #[error("Required tag {0:?} is empty")]
    RequiredTagEmpty(Tag),
    #[error("Expected a byte, found {0:?}")]
    ByteExpected(Value),
    #[error("Expected a short, found {0:?}")]
    ShortExpected(Value),
    #[error("Expected an unsigned integer, found {0:?}")]
    UnsignedIntegerExpected(Value),
    #[error("Expected a signed integer, found {0:?}")]
    SignedIntegerExpected(Value),
    #[error("Directory mixes strip and tile offsets")]
    StripTileTagConflict,
    #[error("Directory chain revisits an offset")]
    CycleInOffsets,
    #[error("Samples per pixel is zero")]
    SamplesPerPixelIsZero,
}

/// Valid TIFF that uses an encoding this crate does not decode.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum TiffUnsupportedError {
    #[error("Inconsistent bits per sample: {0:?}")]
    InconsistentBitsPerSample(Vec<u16>),
    #[error("Compression method {0:?} is unsupported")]
    UnsupportedCompressionMethod(CompressionMethod),
    #[error("Predictor {0:?} is unsupported")]
    UnsupportedPredictor(Predictor),
    #[error("Sample format {0:?} is unsupported")]
    UnsupportedSampleFormat(Vec<SampleFormat>),
    #[error("{0} bits per sample are unsupported")]
    UnsupportedBitsPerChannel(u16),
    #[error("Photometric interpretation {0:?} is unsupported")]
    UnsupportedInterpretation(PhotometricInterpretation),
}

/// A request the directory cannot serve, such as a chunk index past the last strip.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum UsageError {
    #[error("Chunk index {0} out of range")]
    InvalidChunkIndex(u32),
}

impl From<std::num::TryFromIntError> for TiffError {
    fn from(_err: std::num::TryFromIntError) -> TiffError {
        TiffError::IntSizeError
    }
}

/// Result of walking or decoding TIFF structures.
pub type TiffResult<T> = Result<T, TiffError>;
