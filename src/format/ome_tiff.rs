//! TIFF files carrying an OME-XML document in their first ImageDescription.
//!
//! Only the parts of OME-XML needed to lay out planes are read: each `Image` and its `Pixels`
//! sizes, dimension order and type, the first `Channel`'s samples per pixel, and the `TiffData`
//! elements mapping runs of directories (optionally in sibling files named by a `UUID`
//! element's `FileName`) onto `(z, c, t)` planes.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::dataset::{Locator, LogicalKey, ResourceMap};
use crate::dimensions::DimensionOrder;
use crate::error::{MicroscopyError, MicroscopyResult};
use crate::format::tiff::{base_descriptor, blank_plane, open_tiff, read_plane};
use crate::format::{
    check_read, detect, select, FormatReader, ReaderEvent, ReaderOptions, Region,
    SeriesDescriptor,
};
use crate::reconcile::{PlaneFragment, ReconcileError, Reconciler};
use crate::series::PixelType;
use crate::store::{MetadataStore, MetadataTable};
use crate::tiff_file::{DEFAULT_PREFETCH, TIFF};

/// One `TiffData` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TiffData {
    /// `IFD` attribute.
    pub ifd: Option<usize>,
    /// `FirstZ` attribute.
    pub first_z: usize,
    /// `FirstC` attribute.
    pub first_c: usize,
    /// `FirstT` attribute.
    pub first_t: usize,
    /// `PlaneCount` attribute.
    pub plane_count: Option<usize>,
    /// `FileName` of a nested `UUID` element.
    pub file_name: Option<String>,
}

/// The `Pixels` element of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmePixels {
    /// `DimensionOrder` attribute.
    pub dimension_order: DimensionOrder,
    /// `Type` attribute, e.g. `uint16`.
    pub pixel_type: Option<String>,
    /// `SizeX` attribute.
    pub size_x: usize,
    /// `SizeY` attribute.
    pub size_y: usize,
    /// `SizeZ` attribute.
    pub size_z: usize,
    /// `SizeC` attribute.
    pub size_c: usize,
    /// `SizeT` attribute.
    pub size_t: usize,
    /// `SamplesPerPixel` of the first `Channel`.
    pub samples_per_pixel: Option<usize>,
    /// `TiffData` children in document order.
    pub tiff_data: Vec<TiffData>,
}

/// One `Image` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmeImage {
    /// `ID` attribute.
    pub id: Option<String>,
    /// `Name` attribute.
    pub name: Option<String>,
    /// The image's pixels.
    pub pixels: OmePixels,
}

fn attribute(element: &BytesStart, name: &str) -> MicroscopyResult<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            let value = std::str::from_utf8(&attr.value)
                .map_err(|err| MicroscopyError::General(format!("attribute {name}: {err}")))?;
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

fn number(element: &BytesStart, name: &str) -> MicroscopyResult<Option<usize>> {
    attribute(element, name)?
        .map(|value| {
            value.trim().parse().map_err(|_| {
                MicroscopyError::General(format!("attribute {name}={value:?} is not a count"))
            })
        })
        .transpose()
}

fn required(element: &BytesStart, name: &str) -> MicroscopyResult<usize> {
    number(element, name)?
        .ok_or_else(|| MicroscopyError::General(format!("Pixels is missing {name}")))
}

/// Parse the images of an OME-XML document.
pub fn parse_ome_xml(xml: &str) -> MicroscopyResult<Vec<OmeImage>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut images = Vec::new();
    let mut image: Option<(Option<String>, Option<String>)> = None;
    let mut pixels: Option<OmePixels> = None;

    loop {
        let event = reader.read_event()?;
        let is_empty = matches!(event, Event::Empty(_));
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"Image" => {
                    image = Some((attribute(e, "ID")?, attribute(e, "Name")?));
                }
                b"Pixels" if image.is_some() => {
                    let order = attribute(e, "DimensionOrder")?.unwrap_or_default();
                    pixels = Some(OmePixels {
                        dimension_order: DimensionOrder::from_str(&order)?,
                        pixel_type: attribute(e, "Type")?,
                        size_x: required(e, "SizeX")?,
                        size_y: required(e, "SizeY")?,
                        size_z: required(e, "SizeZ")?,
                        size_c: required(e, "SizeC")?,
                        size_t: required(e, "SizeT")?,
                        samples_per_pixel: None,
                        tiff_data: Vec::new(),
                    });
                    if is_empty {
                        finish_image(&mut images, &mut image, &mut pixels);
                    }
                }
                b"Channel" => {
                    if let Some(pixels) = pixels.as_mut() {
                        if pixels.samples_per_pixel.is_none() {
                            pixels.samples_per_pixel = number(e, "SamplesPerPixel")?;
                        }
                    }
                }
                b"TiffData" => {
                    if let Some(pixels) = pixels.as_mut() {
                        pixels.tiff_data.push(TiffData {
                            ifd: number(e, "IFD")?,
                            first_z: number(e, "FirstZ")?.unwrap_or(0),
                            first_c: number(e, "FirstC")?.unwrap_or(0),
                            first_t: number(e, "FirstT")?.unwrap_or(0),
                            plane_count: number(e, "PlaneCount")?,
                            file_name: None,
                        });
                    }
                }
                b"UUID" => {
                    let last = pixels.as_mut().and_then(|p| p.tiff_data.last_mut());
                    if let Some(tiff_data) = last {
                        tiff_data.file_name = attribute(e, "FileName")?;
                    }
                }
                _ => {}
            },
            Event::End(ref e) if e.local_name().as_ref() == b"Image" => {
                finish_image(&mut images, &mut image, &mut pixels);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(images)
}

fn finish_image(
    images: &mut Vec<OmeImage>,
    image: &mut Option<(Option<String>, Option<String>)>,
    pixels: &mut Option<OmePixels>,
) {
    if let (Some((id, name)), Some(pixels)) = (image.take(), pixels.take()) {
        images.push(OmeImage { id, name, pixels });
    }
}

#[derive(Debug)]
struct OpenOme {
    files: Vec<PathBuf>,
    tiffs: Vec<TIFF>,
    descriptors: Vec<SeriesDescriptor>,
    resources: ResourceMap,
}

impl OpenOme {
    fn tiff_for(&self, path: &Path) -> Option<&TIFF> {
        self.files
            .iter()
            .position(|file| file == path)
            .map(|index| &self.tiffs[index])
    }
}

/// Reader for OME-TIFF datasets, single-file or spread over sibling files.
///
/// Declared sizes are reconciled against the directories the `TiffData` elements actually
/// cover, and every plane is located through a [`ResourceMap`].
#[derive(Debug)]
pub struct OmeTiffReader {
    options: ReaderOptions,
    prefetch: u64,
    series: usize,
    metadata: MetadataTable,
    dataset: Option<OpenOme>,
}

impl Default for OmeTiffReader {
    fn default() -> Self {
        Self::new()
    }
}

impl OmeTiffReader {
    /// Registry name.
    pub const KIND: &'static str = "ome-tiff";

    /// A closed reader.
    pub fn new() -> Self {
        Self {
            options: ReaderOptions::default(),
            prefetch: DEFAULT_PREFETCH,
            series: 0,
            metadata: MetadataTable::default(),
            dataset: None,
        }
    }

    /// The resource map of the open dataset.
    pub fn resources(&self) -> MicroscopyResult<&ResourceMap> {
        Ok(&self.open_dataset()?.resources)
    }

    fn open_dataset(&self) -> MicroscopyResult<&OpenOme> {
        self.dataset.as_ref().ok_or(MicroscopyError::NotInitialized)
    }

    /// Resolve the file of a `TiffData` element to a resource index, opening it if new.
    fn resource_of(
        &self,
        dir: &Path,
        file_name: Option<&str>,
        files: &mut Vec<PathBuf>,
        tiffs: &mut Vec<TIFF>,
    ) -> MicroscopyResult<usize> {
        let Some(file_name) = file_name else {
            return Ok(0);
        };
        let path = dir.join(file_name);
        if let Some(index) = files.iter().position(|file| *file == path) {
            return Ok(index);
        }
        tiffs.push(open_tiff(&path, self.prefetch)?);
        files.push(path);
        Ok(files.len() - 1)
    }
}

impl FormatReader for OmeTiffReader {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_this_type(&self, path: &Path) -> bool {
        matches!(detect::sniff_tiff(path), Ok(Some(_)))
            && matches!(detect::first_description(path), Ok(Some(d)) if detect::is_ome_xml(&d))
    }

    fn set_id(&mut self, path: &Path) -> MicroscopyResult<()> {
        self.close()?;
        self.options.notify(ReaderEvent::Opening {
            kind: Self::KIND,
            path,
        });

        let seed = open_tiff(path, self.prefetch)?;
        let xml = seed
            .ifds()
            .first()
            .and_then(|ifd| ifd.image_description())
            .filter(|d| detect::is_ome_xml(d))
            .map(str::to_string)
            .ok_or_else(|| {
                MicroscopyError::UnsupportedFormat(format!("{} has no OME-XML", path.display()))
            })?;
        let images = parse_ome_xml(&xml)?;
        if images.is_empty() {
            return Err(MicroscopyError::UnsupportedFormat(format!(
                "OME-XML of {} declares no images",
                path.display()
            )));
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        // Sibling files are named relative to the seed; the seed itself may be listed too.
        let mut files = vec![path.to_path_buf()];
        let mut tiffs = vec![seed];
        let mut metadata = self.options.new_metadata();
        let mut descriptors = Vec::with_capacity(images.len());
        let mut builder = ResourceMap::builder();

        for (series, image) in images.iter().enumerate() {
            let pixels = &image.pixels;
            let mut resources = Vec::with_capacity(pixels.tiff_data.len());
            for tiff_data in &pixels.tiff_data {
                let file_name = tiff_data.file_name.as_deref().filter(|name| {
                    Path::new(name).file_name() != path.file_name()
                });
                resources.push(self.resource_of(dir, file_name, &mut files, &mut tiffs)?);
            }
            let ifd_counts: Vec<usize> = tiffs.iter().map(|tiff| tiff.ifds().len()).collect();

            let (first_resource, first_ifd) = match pixels.tiff_data.first() {
                Some(tiff_data) => (resources[0], tiff_data.ifd.unwrap_or(0)),
                None => (0, 0),
            };
            let first = tiffs[first_resource].ifds().get(first_ifd).ok_or_else(|| {
                MicroscopyError::General(format!(
                    "image {series} starts at missing directory {first_ifd}"
                ))
            })?;
            let mut descriptor = base_descriptor(first)?;
            let samples = descriptor.samples_per_pixel;
            if let Some(declared) = pixels.samples_per_pixel.filter(|s| *s != samples) {
                tracing::warn!(series, declared, samples, "OME-XML samples per pixel differ from the file");
            }
            let size_c = if descriptor.rgb {
                (pixels.size_c / samples).max(1)
            } else {
                pixels.size_c
            };
            let declared_planes = pixels
                .size_z
                .checked_mul(size_c)
                .and_then(|planes| planes.checked_mul(pixels.size_t))
                .ok_or(ReconcileError::TooManyPlanes {
                    size_z: pixels.size_z,
                    size_c,
                    size_t: pixels.size_t,
                    present: ifd_counts.iter().sum(),
                })?;

            let fragments: Vec<PlaneFragment> = if pixels.tiff_data.is_empty() {
                vec![PlaneFragment::new(0, 0, declared_planes.min(ifd_counts[0]))]
            } else {
                pixels
                    .tiff_data
                    .iter()
                    .zip(&resources)
                    .map(|(tiff_data, &resource)| {
                        let ifd = tiff_data.ifd.unwrap_or(0);
                        let count = match (tiff_data.ifd, tiff_data.plane_count) {
                            (_, Some(count)) => count,
                            (Some(_), None) => 1,
                            (None, None) => ifd_counts[resource]
                                .saturating_sub(ifd)
                                .min(declared_planes),
                        };
                        PlaneFragment::new(resource, ifd, count).starting_at(
                            tiff_data.first_z,
                            tiff_data.first_c,
                            tiff_data.first_t,
                        )
                    })
                    .collect()
            };

            let reconciliation =
                Reconciler::new(pixels.dimension_order, pixels.size_z, size_c, pixels.size_t)
                    .reconcile(&fragments, &ifd_counts)?;

            descriptor.dimension_order = pixels.dimension_order;
            descriptor.size_z = reconciliation.size_z;
            descriptor.size_c = reconciliation.size_c * if descriptor.rgb { samples } else { 1 };
            descriptor.size_t = reconciliation.size_t;
            descriptor.update_image_count();
            descriptor.validate()?;

            if (pixels.size_x, pixels.size_y) != (descriptor.size_x, descriptor.size_y) {
                tracing::warn!(
                    series,
                    declared_x = pixels.size_x,
                    declared_y = pixels.size_y,
                    size_x = descriptor.size_x,
                    size_y = descriptor.size_y,
                    "OME-XML plane size differs from the file"
                );
            }
            if let Some(declared) = pixels.pixel_type.as_deref() {
                if PixelType::from_str(declared).ok() != Some(descriptor.pixel_type) {
                    tracing::warn!(
                        series,
                        declared,
                        actual = %descriptor.pixel_type,
                        "OME-XML pixel type differs from the file"
                    );
                }
            }

            for (no, source) in reconciliation.planes().iter().enumerate() {
                let ifd = &tiffs[source.resource].ifds()[source.ifd];
                if (ifd.image_width() as usize, ifd.image_height() as usize)
                    != (descriptor.size_x, descriptor.size_y)
                {
                    return Err(MicroscopyError::General(format!(
                        "plane {no} of image {series} is stored in a directory of another size"
                    )));
                }
                let address = descriptor.zct(no)?;
                let key = LogicalKey::Series {
                    series,
                    z: address.z,
                    c: address.c,
                    t: address.t,
                };
                builder.insert(key, Locator::new(files[source.resource].clone(), source.ifd))?;
                if self.options.collect_metadata {
                    metadata.set_plane_value(series, no, "IFD", source.ifd.into());
                    let file = files[source.resource].display().to_string();
                    metadata.set_plane_value(series, no, "File", file.into());
                }
            }

            if self.options.collect_metadata {
                if let Some(name) = &image.name {
                    metadata.set_series_value(series, "Name", name.as_str().into());
                }
                if let Some(id) = &image.id {
                    metadata.set_series_value(series, "ID", id.as_str().into());
                }
                let order = descriptor.dimension_order.to_string();
                metadata.set_series_value(series, "DimensionOrder", order.into());
                metadata.set_series_value(series, "SizeZ", descriptor.size_z.into());
                metadata.set_series_value(series, "SizeC", descriptor.size_c.into());
                metadata.set_series_value(series, "SizeT", descriptor.size_t.into());
                let shape = reconciliation.shape.to_string();
                metadata.set_series_value(series, "PlaneLayout", shape.into());
            }
            descriptors.push(descriptor);
        }
        if self.options.collect_metadata {
            metadata.set_global("ImageCount", images.len().into());
            metadata.set_global("FileCount", files.len().into());
        }

        tracing::debug!(path = %path.display(), series = descriptors.len(), files = files.len(), "opened OME-TIFF");
        let series_count = descriptors.len();
        self.dataset = Some(OpenOme {
            files,
            tiffs,
            descriptors,
            resources: builder.build(),
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
        let address = descriptor.zct(no)?;
        let key = LogicalKey::Series {
            series,
            z: address.z,
            c: address.c,
            t: address.t,
        };
        let Some(locator) = dataset.resources.get(&key) else {
            tracing::warn!(series, no, "plane has no backing directory");
            return Ok(blank_plane(descriptor, &region));
        };
        let tiff = dataset.tiff_for(&locator.path).ok_or_else(|| {
            MicroscopyError::General(format!("{} is not open", locator.path.display()))
        })?;
        read_plane(tiff, locator.plane, &region, descriptor, &self.options)
    }

    fn used_files(&self, include_pixel_data: bool) -> MicroscopyResult<Vec<PathBuf>> {
        let dataset = self.open_dataset()?;
        Ok(if include_pixel_data {
            dataset.files.clone()
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
