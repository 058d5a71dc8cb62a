//! The reader contract shared by every format, and the concrete readers.
//!
//! A reader is stateful and single-threaded: [`set_id`](FormatReader::set_id) populates every
//! [`SeriesDescriptor`] before any plane can be read, and [`close`](FormatReader::close)
//! releases the underlying files. Plane reads name their series explicitly; the "current
//! series" selector is kept only for callers that want it.

use std::any::Any;
use std::fmt::{self, Debug};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::decoding_result::DecodingResult;
use crate::dimensions::PlaneAddress;
use crate::error::{MicroscopyError, MicroscopyResult};
use crate::series::PixelType;
use crate::store::MetadataTable;

pub mod detect;
pub mod file_pattern;
pub mod ome_tiff;
pub mod plate;
pub mod tiff;

pub use crate::series::{Region, SeriesDescriptor};
pub use file_pattern::FilePatternReader;
pub use ome_tiff::OmeTiffReader;
pub use plate::PlateReader;
pub use tiff::TiffReader;

/// Something happening to a reader, reported to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderEvent<'a> {
    /// A dataset is about to be opened.
    Opening {
        /// Kind of the reader doing the work.
        kind: &'static str,
        /// The seed resource.
        path: &'a Path,
    },
    /// Every series descriptor has been populated.
    Opened {
        /// Kind of the reader doing the work.
        kind: &'static str,
        /// Number of series found.
        series_count: usize,
    },
    /// The dataset was closed.
    Closed {
        /// Kind of the reader.
        kind: &'static str,
    },
}

/// Receives [`ReaderEvent`]s.
pub trait ReaderListener: Debug + Send + Sync {
    /// Called synchronously from the reader.
    fn reader_event(&self, event: &ReaderEvent<'_>);
}

/// Per-reader configuration.
///
/// Wrappers forward their options to the reader they wrap, so setting options at the top of a
/// chain configures the whole chain.
#[derive(Clone)]
pub struct ReaderOptions {
    /// Rescale floating-point planes to `[0, 1]`.
    pub normalize: bool,
    /// Drop unprintable or overlong metadata values.
    pub filter_metadata: bool,
    /// Record original metadata while opening.
    pub collect_metadata: bool,
    /// Registered listeners.
    pub listeners: Vec<Arc<dyn ReaderListener>>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            normalize: false,
            filter_metadata: false,
            collect_metadata: true,
            listeners: Vec::new(),
        }
    }
}

impl Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("normalize", &self.normalize)
            .field("filter_metadata", &self.filter_metadata)
            .field("collect_metadata", &self.collect_metadata)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ReaderOptions {
    /// Register a listener.
    pub fn add_listener(&mut self, listener: Arc<dyn ReaderListener>) {
        self.listeners.push(listener);
    }

    /// Deliver `event` to every listener.
    pub fn notify(&self, event: ReaderEvent<'_>) {
        for listener in &self.listeners {
            listener.reader_event(&event);
        }
    }

    /// A metadata table configured by these options.
    pub fn new_metadata(&self) -> MetadataTable {
        MetadataTable::new(self.filter_metadata)
    }
}

/// The capability surface shared by concrete readers and the wrappers stacked over them.
pub trait FormatReader: Debug + Send {
    /// Registry name of this reader, e.g. `"tiff"`.
    fn kind(&self) -> &'static str;

    /// Whether this reader can open `path`. Unreadable files are not of any type.
    fn is_this_type(&self, path: &Path) -> bool;

    /// Open the dataset seeded by `path`, closing any dataset open before.
    fn set_id(&mut self, path: &Path) -> MicroscopyResult<()>;

    /// Release every resource of the open dataset. Closing a closed reader does nothing.
    fn close(&mut self) -> MicroscopyResult<()>;

    /// `true` once [`set_id`](Self::set_id) has succeeded and until [`close`](Self::close).
    fn is_open(&self) -> bool;

    /// Number of series in the dataset.
    fn series_count(&self) -> MicroscopyResult<usize>;

    /// Dimensions of series `series`.
    fn descriptor(&self, series: usize) -> MicroscopyResult<&SeriesDescriptor>;

    /// The current series.
    fn series(&self) -> usize;

    /// Select the current series.
    fn set_series(&mut self, series: usize) -> MicroscopyResult<()>;

    /// Read `region` of plane `no` of `series`.
    ///
    /// The bytes are laid out as described by the series' descriptor: `little_endian` gives
    /// the sample byte order and `interleaved` the sample layout of packed series.
    fn open_plane(&self, series: usize, no: usize, region: Region) -> MicroscopyResult<Vec<u8>>;

    /// Files making up the dataset. Without `include_pixel_data`, only files holding no pixel
    /// data are listed.
    fn used_files(&self, include_pixel_data: bool) -> MicroscopyResult<Vec<PathBuf>>;

    /// Original metadata collected while opening.
    fn metadata(&self) -> &MetadataTable;

    /// Reader configuration.
    fn options(&self) -> &ReaderOptions;

    /// Mutable reader configuration.
    fn options_mut(&mut self) -> &mut ReaderOptions;

    /// The wrapped reader, for wrappers and for a dispatcher that has chosen a reader.
    fn inner(&self) -> Option<&dyn FormatReader> {
        None
    }

    /// Mutable access to the wrapped reader.
    fn inner_mut(&mut self) -> Option<&mut dyn FormatReader> {
        None
    }

    /// `true` for a generic layer that picks the concrete reader at open time.
    fn is_dispatcher(&self) -> bool {
        false
    }

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Descriptor of the current series.
    fn current_descriptor(&self) -> MicroscopyResult<&SeriesDescriptor> {
        self.descriptor(self.series())
    }

    /// The `(z, c, t)` address of plane `no` of `series`.
    fn zct(&self, series: usize, no: usize) -> MicroscopyResult<PlaneAddress> {
        self.descriptor(series)?.zct(no)
    }

    /// The plane index of `address` in `series`.
    fn plane_index(&self, series: usize, address: PlaneAddress) -> MicroscopyResult<usize> {
        self.descriptor(series)?.index(address)
    }

    /// Read the whole of plane `no` of the current series.
    fn open_bytes(&self, no: usize) -> MicroscopyResult<Vec<u8>> {
        let series = self.series();
        let region = Region::full(self.descriptor(series)?);
        self.open_plane(series, no, region)
    }

    /// Read plane `no` of `series` as typed samples.
    fn open_samples(
        &self,
        series: usize,
        no: usize,
        region: Region,
    ) -> MicroscopyResult<DecodingResult> {
        let descriptor = self.descriptor(series)?;
        let (pixel_type, little_endian) = (descriptor.pixel_type, descriptor.little_endian);
        let bytes = self.open_plane(series, no, region)?;
        DecodingResult::from_bytes(&bytes, pixel_type, little_endian)
    }
}

/// Look up series `series` of an opened dataset.
pub(crate) fn select(
    descriptors: &[SeriesDescriptor],
    series: usize,
) -> MicroscopyResult<&SeriesDescriptor> {
    descriptors
        .get(series)
        .ok_or(MicroscopyError::SeriesOutOfRange {
            series,
            series_count: descriptors.len(),
        })
}

/// Validate a plane read against its descriptor.
pub(crate) fn check_read(
    descriptor: &SeriesDescriptor,
    no: usize,
    region: &Region,
) -> MicroscopyResult<()> {
    descriptor.check_plane(no)?;
    descriptor.check_region(region)
}

/// Rescale floating-point samples to `[0, 1]` over the plane. Integer planes are left alone.
///
/// A constant plane becomes all zeros. NaN samples are ignored when finding the range and stay
/// NaN.
pub fn normalize(
    bytes: &mut [u8],
    pixel_type: PixelType,
    little_endian: bool,
) -> MicroscopyResult<()> {
    if !pixel_type.is_floating_point() {
        return Ok(());
    }
    let rescaled = match DecodingResult::from_bytes(bytes, pixel_type, little_endian)? {
        DecodingResult::F32(mut samples) => {
            let (min, max) = range(samples.iter().map(|v| *v as f64));
            for v in samples.iter_mut() {
                *v = rescale(*v as f64, min, max) as f32;
            }
            DecodingResult::F32(samples)
        }
        DecodingResult::F64(mut samples) => {
            let (min, max) = range(samples.iter().copied());
            for v in samples.iter_mut() {
                *v = rescale(*v, min, max);
            }
            DecodingResult::F64(samples)
        }
        other => other,
    };
    bytes.copy_from_slice(&rescaled.to_bytes(little_endian));
    Ok(())
}

fn range(samples: impl Iterator<Item = f64>) -> (f64, f64) {
    samples
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

fn rescale(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        value
    } else if max > min {
        (value - min) / (max - min)
    } else {
        0.0
    }
}
