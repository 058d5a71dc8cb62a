//! Error handling.

use std::fmt::Debug;
use thiserror::Error;

use crate::reconcile::ReconcileError;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MicroscopyError {
    /// End of file error.
    #[error("End of File: expected to read {0} bytes, got {1}")]
    EndOfFile(u64, u64),

    /// General error.
    #[error("General error: {0}")]
    General(String),

    /// IO Error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Error while decoding JPEG data.
    #[error(transparent)]
    JPEGDecodingError(#[from] jpeg::Error),

    /// An error during TIFF tag parsing or plane decoding.
    #[error(transparent)]
    InternalTIFFError(#[from] crate::tiff::TiffError),

    /// Malformed embedded XML metadata.
    #[error(transparent)]
    XmlError(#[from] quick_xml::Error),

    /// Declared dimensions could not be reconciled with the planes present.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// A dimension order string that is not `XY` followed by a permutation of `ZCT`.
    #[error("Invalid dimension order: {0:?}")]
    InvalidDimensionOrder(String),

    /// A linear plane index outside `[0, image_count)`.
    #[error("Plane index {index} out of range for {image_count} planes")]
    PlaneIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of planes in the series.
        image_count: usize,
    },

    /// A `(z, c, t)` coordinate outside the series sizes.
    #[error("Coordinate (z={z}, c={c}, t={t}) out of range for sizes ({size_z}, {size_c}, {size_t})")]
    CoordinateOutOfRange {
        /// Z index.
        z: usize,
        /// Effective channel index.
        c: usize,
        /// T index.
        t: usize,
        /// Z size.
        size_z: usize,
        /// Effective channel count.
        size_c: usize,
        /// T size.
        size_t: usize,
    },

    /// A series index outside `[0, series_count)`.
    #[error("Series {series} out of range for {series_count} series")]
    SeriesOutOfRange {
        /// The requested series.
        series: usize,
        /// Number of series in the dataset.
        series_count: usize,
    },

    /// A requested sub-rectangle that does not fit in the plane.
    #[error("Region {width}x{height}+{x}+{y} does not fit in a {size_x}x{size_y} plane")]
    InvalidRegion {
        /// Left edge.
        x: usize,
        /// Top edge.
        y: usize,
        /// Region width.
        width: usize,
        /// Region height.
        height: usize,
        /// Plane width.
        size_x: usize,
        /// Plane height.
        size_y: usize,
    },

    /// The reader has not finished opening a dataset.
    #[error("Reader has not been initialized; call set_id first")]
    NotInitialized,

    /// No registered reader recognises the resource.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// No constructor is registered under this reader kind.
    #[error("Unknown reader kind: {0}")]
    UnknownReaderKind(String),

    /// External error
    #[error(transparent)]
    External(Box<dyn std::error::Error + Send + Sync>),
}

/// Crate-specific result type.
pub type MicroscopyResult<T> = std::result::Result<T, MicroscopyError>;
