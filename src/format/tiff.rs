//! Plain TIFF files, and the helpers every TIFF-backed reader shares.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::decoder::DecoderRegistry;
use crate::error::{MicroscopyError, MicroscopyResult};
use crate::format::{
    check_read, detect, normalize, select, FormatReader, ReaderEvent, ReaderOptions, Region,
    SeriesDescriptor,
};
use crate::ifd::ImageFileDirectory;
use crate::reader::LocalFileReader;
use crate::series::PixelType;
use crate::store::{MetadataStore, MetadataTable, MetadataValue};
use crate::tiff::tags::{PhotometricInterpretation, PlanarConfiguration, Tag};
use crate::tiff::Value;
use crate::tiff_file::{DEFAULT_PREFETCH, TIFF};

/// Tags holding layout arrays or binary blobs, left out of collected metadata.
const LAYOUT_TAGS: [Tag; 6] = [
    Tag::StripOffsets,
    Tag::StripByteCounts,
    Tag::TileOffsets,
    Tag::TileByteCounts,
    Tag::JPEGTables,
    Tag::ColorMap,
];

/// Open the TIFF at `path`.
pub(crate) fn open_tiff(path: &Path, prefetch: u64) -> MicroscopyResult<TIFF> {
    let reader = LocalFileReader::open(path)?;
    TIFF::open(Arc::new(reader), prefetch)
}

/// A single-plane descriptor for the image held by `ifd`.
pub(crate) fn base_descriptor(ifd: &ImageFileDirectory) -> MicroscopyResult<SeriesDescriptor> {
    let pixel_type = ifd.pixel_type()?;
    let samples = ifd.samples_per_pixel() as usize;
    let mut descriptor = SeriesDescriptor::new(
        ifd.image_width() as usize,
        ifd.image_height() as usize,
        pixel_type,
    );
    descriptor.rgb = samples > 1;
    descriptor.samples_per_pixel = samples;
    descriptor.size_c = samples;
    descriptor.interleaved = samples > 1 && ifd.planar_configuration() == PlanarConfiguration::Chunky;
    descriptor.little_endian = ifd.endianness().is_little_endian();
    descriptor.indexed = ifd.photometric_interpretation() == PhotometricInterpretation::RGBPalette
        && ifd.color_map().is_some();
    descriptor.update_image_count();
    Ok(descriptor)
}

/// Read `region` of directory `ifd`, applying the reader options.
pub(crate) fn read_plane(
    tiff: &TIFF,
    ifd: usize,
    region: &Region,
    descriptor: &SeriesDescriptor,
    options: &ReaderOptions,
) -> MicroscopyResult<Vec<u8>> {
    let mut bytes = tiff.read_region(ifd, region, DecoderRegistry::global())?;
    if options.normalize {
        normalize(&mut bytes, descriptor.pixel_type, descriptor.little_endian)?;
    }
    Ok(bytes)
}

/// The directories of a member file, parsed once when a multi-file dataset opens.
///
/// Datasets may span thousands of files, so no handle is kept; the file is reopened for each
/// pixel read, but its directory chain is never walked again.
#[derive(Debug, Clone)]
pub(crate) struct ParsedTiff {
    path: PathBuf,
    ifds: Vec<ImageFileDirectory>,
}

impl ParsedTiff {
    pub fn new(path: &Path, tiff: &TIFF) -> Self {
        Self {
            path: path.to_path_buf(),
            ifds: tiff.ifds().to_vec(),
        }
    }

    pub fn read_plane(
        &self,
        ifd: usize,
        region: &Region,
        descriptor: &SeriesDescriptor,
        options: &ReaderOptions,
    ) -> MicroscopyResult<Vec<u8>> {
        let directory = self.ifds.get(ifd).ok_or_else(|| {
            MicroscopyError::General(format!(
                "{} has no directory {ifd}",
                self.path.display()
            ))
        })?;
        let reader = LocalFileReader::open(&self.path)?;
        let mut bytes = directory.read_region(&reader, DecoderRegistry::global(), region)?;
        if options.normalize {
            normalize(&mut bytes, descriptor.pixel_type, descriptor.little_endian)?;
        }
        Ok(bytes)
    }
}

/// A blank region of `descriptor`.
pub(crate) fn blank_plane(descriptor: &SeriesDescriptor, region: &Region) -> Vec<u8> {
    vec![0; descriptor.plane_size(region.width, region.height)]
}

/// Convert a tag value for a metadata table.
pub(crate) fn metadata_value(value: &Value) -> MetadataValue {
    match value {
        Value::Byte(v) => MetadataValue::Integer((*v).into()),
        Value::Short(v) => MetadataValue::Integer((*v).into()),
        Value::SignedByte(v) => MetadataValue::Integer((*v).into()),
        Value::SignedShort(v) => MetadataValue::Integer((*v).into()),
        Value::Signed(v) => MetadataValue::Integer((*v).into()),
        Value::SignedBig(v) => MetadataValue::Integer(*v),
        Value::Unsigned(v) | Value::Ifd(v) => MetadataValue::Integer((*v).into()),
        Value::UnsignedBig(v) | Value::IfdBig(v) => match i64::try_from(*v) {
            Ok(v) => MetadataValue::Integer(v),
            Err(_) => MetadataValue::Text(v.to_string()),
        },
        Value::Float(v) => MetadataValue::Float((*v).into()),
        Value::Double(v) => MetadataValue::Float(*v),
        Value::Rational(n, d) if *d != 0 => MetadataValue::Float(*n as f64 / *d as f64),
        Value::SRational(n, d) if *d != 0 => MetadataValue::Float(*n as f64 / *d as f64),
        Value::Rational(n, d) => MetadataValue::Text(format!("{n}/{d}")),
        Value::SRational(n, d) => MetadataValue::Text(format!("{n}/{d}")),
        Value::Ascii(s) => MetadataValue::Text(s.clone()),
        Value::List(values) => MetadataValue::Text(
            values
                .iter()
                .map(|v| metadata_value(v).to_string())
                .collect::<Vec<_>>()
                .join(", "),
        ),
    }
}

/// Record the entries of `ifd` as values of `series`, keyed by tag name.
pub(crate) fn record_directory(store: &mut dyn MetadataStore, series: usize, ifd: &ImageFileDirectory) {
    for (tag, value) in ifd.tags().iter().filter(|(tag, _)| !LAYOUT_TAGS.contains(tag)) {
        let key = match tag {
            Tag::Unknown(id) => format!("Tag{id}"),
            tag => format!("{tag:?}"),
        };
        store.set_series_value(series, &key, metadata_value(value));
    }
}

/// Z, C and T counts from an ImageJ hyperstack description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageJStack {
    pub images: Option<usize>,
    pub channels: usize,
    pub slices: usize,
    pub frames: usize,
}

impl ImageJStack {
    /// Parse the `key=value` lines of a description starting with `ImageJ=`.
    pub fn parse(description: &str) -> Option<Self> {
        if !description.starts_with("ImageJ=") {
            return None;
        }
        let mut stack = Self {
            images: None,
            channels: 1,
            slices: 1,
            frames: 1,
        };
        for line in description.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let Ok(value) = value.trim().parse::<usize>() else {
                continue;
            };
            match key.trim() {
                "images" => stack.images = Some(value),
                "channels" => stack.channels = value.max(1),
                "slices" => stack.slices = value.max(1),
                "frames" => stack.frames = value.max(1),
                _ => {}
            }
        }
        Some(stack)
    }

    /// `None` when the counts overflow, in which case the description is ignored.
    pub fn planes(&self) -> Option<usize> {
        self.channels
            .checked_mul(self.slices)?
            .checked_mul(self.frames)
    }
}

#[derive(Debug)]
struct TiffSeries {
    descriptor: SeriesDescriptor,
    ifds: Vec<usize>,
}

#[derive(Debug)]
struct OpenTiff {
    path: PathBuf,
    tiff: TIFF,
    series: Vec<TiffSeries>,
    descriptors: Vec<SeriesDescriptor>,
}

/// Geometry shared by the directories of one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    width: u32,
    height: u32,
    pixel_type: PixelType,
    samples: u16,
    planar: PlanarConfiguration,
}

impl Geometry {
    fn of(ifd: &ImageFileDirectory) -> MicroscopyResult<Self> {
        Ok(Self {
            width: ifd.image_width(),
            height: ifd.image_height(),
            pixel_type: ifd.pixel_type()?,
            samples: ifd.samples_per_pixel(),
            planar: ifd.planar_configuration(),
        })
    }
}

/// Reader for plain TIFF and BigTIFF files.
///
/// Consecutive full-resolution directories of equal geometry form one series whose planes run
/// along T. Reduced-resolution directories are skipped. An ImageJ hyperstack description on
/// the first directory of a series replaces T with its channel, slice and frame counts.
#[derive(Debug)]
pub struct TiffReader {
    options: ReaderOptions,
    prefetch: u64,
    series: usize,
    metadata: MetadataTable,
    dataset: Option<OpenTiff>,
}

impl Default for TiffReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TiffReader {
    /// Registry name.
    pub const KIND: &'static str = "tiff";

    /// A closed reader.
    pub fn new() -> Self {
        Self::with_prefetch(DEFAULT_PREFETCH)
    }

    /// A closed reader prefetching `prefetch` bytes of directory data on open.
    pub fn with_prefetch(prefetch: u64) -> Self {
        Self {
            options: ReaderOptions::default(),
            prefetch,
            series: 0,
            metadata: MetadataTable::default(),
            dataset: None,
        }
    }

    /// The directories of `series`, one per plane.
    pub fn series_ifds(&self, series: usize) -> MicroscopyResult<&[usize]> {
        let dataset = self.open_dataset()?;
        select(&dataset.descriptors, series)?;
        Ok(&dataset.series[series].ifds)
    }

    fn open_dataset(&self) -> MicroscopyResult<&OpenTiff> {
        self.dataset
            .as_ref()
            .ok_or(MicroscopyError::NotInitialized)
    }

    fn group_series(tiff: &TIFF) -> MicroscopyResult<Vec<TiffSeries>> {
        let mut groups: Vec<(Geometry, Vec<usize>)> = Vec::new();
        for (index, ifd) in tiff.ifds().iter().enumerate() {
            if ifd.is_reduced_resolution() {
                continue;
            }
            let geometry = Geometry::of(ifd)?;
            match groups.last_mut() {
                Some((last, ifds)) if *last == geometry => ifds.push(index),
                _ => groups.push((geometry, vec![index])),
            }
        }

        let mut series = Vec::with_capacity(groups.len());
        for (_, ifds) in groups {
            let first = &tiff.ifds()[ifds[0]];
            let mut descriptor = base_descriptor(first)?;
            descriptor.size_t = ifds.len();

            if let Some(stack) = first.image_description().and_then(ImageJStack::parse) {
                if !descriptor.rgb && stack.planes() == Some(ifds.len()) {
                    descriptor.size_z = stack.slices;
                    descriptor.size_c = stack.channels;
                    descriptor.size_t = stack.frames;
                } else {
                    tracing::warn!(
                        planes = ifds.len(),
                        declared = ?stack.planes(),
                        "ignoring ImageJ hyperstack dimensions"
                    );
                }
            }
            descriptor.update_image_count();
            descriptor.validate()?;
            series.push(TiffSeries { descriptor, ifds });
        }
        Ok(series)
    }
}

impl FormatReader for TiffReader {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_this_type(&self, path: &Path) -> bool {
        matches!(detect::sniff_tiff(path), Ok(Some(_)))
    }

    fn set_id(&mut self, path: &Path) -> MicroscopyResult<()> {
        self.close()?;
        self.options.notify(ReaderEvent::Opening {
            kind: Self::KIND,
            path,
        });

        let tiff = open_tiff(path, self.prefetch)?;
        let series = Self::group_series(&tiff)?;

        let mut metadata = self.options.new_metadata();
        if self.options.collect_metadata {
            for (index, entry) in series.iter().enumerate() {
                record_directory(&mut metadata, index, &tiff.ifds()[entry.ifds[0]]);
            }
            metadata.set_global("BigTIFF", tiff.bigtiff().into());
            metadata.set_global("DirectoryCount", tiff.ifds().len().into());
        }

        let descriptors = series.iter().map(|s| s.descriptor.clone()).collect();
        tracing::debug!(path = %path.display(), series = series.len(), "opened TIFF");
        let series_count = series.len();
        self.dataset = Some(OpenTiff {
            path: path.to_path_buf(),
            tiff,
            series,
            descriptors,
        });
        self.metadata = metadata;
        self.series = 0;
        self.options.notify(ReaderEvent::Opened {
            kind: Self::KIND,
            series_count,
        });
        Ok(())
    }

    fn close(&mut self) -> MicroscopyResult<()> {
        if self.dataset.take().is_some() {
            self.metadata = MetadataTable::default();
            self.series = 0;
            self.options.notify(ReaderEvent::Closed { kind: Self::KIND });
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.dataset.is_some()
    }

    fn series_count(&self) -> MicroscopyResult<usize> {
        Ok(self.open_dataset()?.descriptors.len())
    }

    fn descriptor(&self, series: usize) -> MicroscopyResult<&SeriesDescriptor> {
        select(&self.open_dataset()?.descriptors, series)
    }

    fn series(&self) -> usize {
        self.series
    }

    fn set_series(&mut self, series: usize) -> MicroscopyResult<()> {
        select(&self.open_dataset()?.descriptors, series)?;
        self.series = series;
        Ok(())
    }

    fn open_plane(&self, series: usize, no: usize, region: Region) -> MicroscopyResult<Vec<u8>> {
        let dataset = self.open_dataset()?;
        let descriptor = select(&dataset.descriptors, series)?;
        check_read(descriptor, no, &region)?;
        let ifd = dataset.series[series].ifds[no];
        read_plane(&dataset.tiff, ifd, &region, descriptor, &self.options)
    }

    fn used_files(&self, include_pixel_data: bool) -> MicroscopyResult<Vec<PathBuf>> {
        let dataset = self.open_dataset()?;
        Ok(if include_pixel_data {
            vec![dataset.path.clone()]
        } else {
            Vec::new()
        })
    }

    fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    fn options(&self) -> &ReaderOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut ReaderOptions {
        &mut self.options
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imagej_descriptions() {
        let stack =
            ImageJStack::parse("ImageJ=1.53t\nimages=24\nchannels=2\nslices=3\nframes=4\n").unwrap();
        assert_eq!(stack.images, Some(24));
        assert_eq!((stack.channels, stack.slices, stack.frames), (2, 3, 4));
        assert_eq!(stack.planes(), Some(24));
        assert_eq!(ImageJStack::parse("images=24").and_then(|s| s.planes()), None);
        assert_eq!(ImageJStack::parse("ImageJ=1.0\nslices=5").and_then(|s| s.planes()), Some(5));

        let overflowing = ImageJStack::parse(
            "ImageJ=1.53t\nchannels=4294967296\nslices=4294967296\nframes=4294967296\n",
        )
        .unwrap();
        assert_eq!(overflowing.planes(), None);
    }

    #[test]
    fn tag_values_for_metadata() {
        assert_eq!(metadata_value(&Value::Short(7)), MetadataValue::Integer(7));
        assert_eq!(metadata_value(&Value::Rational(1, 4)), MetadataValue::Float(0.25));
        assert_eq!(
            metadata_value(&Value::Rational(1, 0)),
            MetadataValue::Text("1/0".into())
        );
        assert_eq!(
            metadata_value(&Value::List(vec![Value::Short(8), Value::Short(8)])),
            MetadataValue::Text("8, 8".into())
        );
    }

    #[test]
    fn closed_reader_rejects_reads() {
        let reader = TiffReader::new();
        assert!(!reader.is_open());
        assert!(matches!(
            reader.open_plane(0, 0, Region::new(0, 0, 1, 1)),
            Err(MicroscopyError::NotInitialized)
        ));
        assert!(reader.series_count().is_err());
    }
}
