//! Numeric vocabularies of the TIFF format.
//!
//! Enums that must round-trip unknown values carry a catch-all `Unknown` variant; closed
//! enums are converted with `try_from_primitive`.

use num_enum::{FromPrimitive, TryFromPrimitive};

/// A TIFF tag id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u16)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum Tag {
    NewSubfileType = 254,
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    DocumentName = 269,
    ImageDescription = 270,
    Make = 271,
    Model = 272,
    StripOffsets = 273,
    Orientation = 274,
    SamplesPerPixel = 277,
    RowsPerStrip = 278,
    StripByteCounts = 279,
    MinSampleValue = 280,
    MaxSampleValue = 281,
    XResolution = 282,
    YResolution = 283,
    PlanarConfiguration = 284,
    ResolutionUnit = 296,
    Software = 305,
    DateTime = 306,
    Artist = 315,
    HostComputer = 316,
    Predictor = 317,
    ColorMap = 320,
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    SubIfd = 330,
    ExtraSamples = 338,
    SampleFormat = 339,
    JPEGTables = 347,
    Copyright = 33_432,
    /// A tag without a dedicated variant.
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl Tag {
    /// Convert a raw id, keeping ids without a dedicated variant as [`Tag::Unknown`].
    pub fn from_u16_exhaustive(val: u16) -> Self {
        Self::from_primitive(val)
    }
}

/// The field type of a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
#[allow(clippy::upper_case_acronyms, missing_docs)]
pub enum Type {
    BYTE = 1,
    ASCII = 2,
    SHORT = 3,
    LONG = 4,
    RATIONAL = 5,
    SBYTE = 6,
    UNDEFINED = 7,
    SSHORT = 8,
    SLONG = 9,
    SRATIONAL = 10,
    FLOAT = 11,
    DOUBLE = 12,
    IFD = 13,
    LONG8 = 16,
    SLONG8 = 17,
    IFD8 = 18,
}

impl Type {
    /// Parse a raw field type; `None` for types this decoder does not know.
    pub fn from_u16(val: u16) -> Option<Self> {
        Self::try_from_primitive(val).ok()
    }

    /// Size in bytes of one value of this type.
    pub fn size(&self) -> u64 {
        match self {
            Type::BYTE | Type::SBYTE | Type::ASCII | Type::UNDEFINED => 1,
            Type::SHORT | Type::SSHORT => 2,
            Type::LONG | Type::SLONG | Type::FLOAT | Type::IFD => 4,
            Type::LONG8
            | Type::SLONG8
            | Type::DOUBLE
            | Type::RATIONAL
            | Type::SRATIONAL
            | Type::IFD8 => 8,
        }
    }
}

/// Compression scheme of the strip or tile data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u16)]
#[non_exhaustive]
#[allow(clippy::upper_case_acronyms)]
pub enum CompressionMethod {
    /// Uncompressed.
    None = 1,
    /// CCITT modified Huffman RLE.
    Huffman = 2,
    /// CCITT Group 3 fax.
    Fax3 = 3,
    /// CCITT Group 4 fax.
    Fax4 = 4,
    /// Lempel-Ziv-Welch.
    LZW = 5,
    /// Pre-TIFF 6.0 JPEG, not supported by any decoder here.
    JPEG = 6,
    /// TIFF 6.0 Technote 2 JPEG.
    ModernJPEG = 7,
    /// Adobe deflate.
    Deflate = 8,
    /// PackBits run-length encoding.
    PackBits = 32773,
    /// Legacy deflate code.
    OldDeflate = 32946,
    /// JPEG 2000 codestreams.
    JPEG2000 = 34712,
    /// A compression id without a dedicated variant.
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl CompressionMethod {
    /// Convert a raw compression id.
    pub fn from_u16_exhaustive(val: u16) -> Self {
        Self::from_primitive(val)
    }
}

/// How pixel sample values are to be interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u16)]
#[non_exhaustive]
#[allow(clippy::upper_case_acronyms, missing_docs)]
pub enum PhotometricInterpretation {
    WhiteIsZero = 0,
    BlackIsZero = 1,
    RGB = 2,
    RGBPalette = 3,
    TransparencyMask = 4,
    CMYK = 5,
    YCbCr = 6,
    CIELab = 8,
    /// A photometric value without a dedicated variant.
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl PhotometricInterpretation {
    /// Convert a raw photometric interpretation value.
    pub fn from_u16_exhaustive(val: u16) -> Self {
        Self::from_primitive(val)
    }
}

/// Whether samples of one pixel are stored together or in separate planes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
pub enum PlanarConfiguration {
    /// RGBRGBRGB...
    Chunky = 1,
    /// RRR...GGG...BBB...
    Planar = 2,
}

impl PlanarConfiguration {
    /// Parse a raw planar configuration value.
    pub fn from_u16(val: u16) -> Option<Self> {
        Self::try_from_primitive(val).ok()
    }
}

/// The differencing scheme applied before compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
pub enum Predictor {
    /// No prediction.
    None = 1,
    /// Horizontal differencing.
    Horizontal = 2,
    /// Floating point byte-shuffled differencing.
    FloatingPoint = 3,
}

impl Predictor {
    /// Parse a raw predictor value.
    pub fn from_u16(val: u16) -> Option<Self> {
        Self::try_from_primitive(val).ok()
    }
}

/// How a sample value is to be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u16)]
#[non_exhaustive]
#[allow(clippy::upper_case_acronyms)]
pub enum SampleFormat {
    /// Unsigned integer.
    Uint = 1,
    /// Two's complement signed integer.
    Int = 2,
    /// IEEE floating point.
    IEEEFP = 3,
    /// Undefined data.
    Void = 4,
    /// A sample format without a dedicated variant.
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl SampleFormat {
    /// Convert a raw sample format value.
    pub fn from_u16_exhaustive(val: u16) -> Self {
        Self::from_primitive(val)
    }
}

/// Unit of the X/Y resolution tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
pub enum ResolutionUnit {
    /// No absolute unit.
    None = 1,
    /// Inch.
    Inch = 2,
    /// Centimeter.
    Centimeter = 3,
}

impl ResolutionUnit {
    /// Parse a raw resolution unit value.
    pub fn from_u16(val: u16) -> Option<Self> {
        Self::try_from_primitive(val).ok()
    }
}
