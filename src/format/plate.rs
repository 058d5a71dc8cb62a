//! High-content screening plates stored as one TIFF per well, field and channel.

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::dataset::{assemble_plate, LogicalKey, PlateLayout, PlateName};
use crate::dimensions::DimensionOrder;
use crate::error::{MicroscopyError, MicroscopyResult};
use crate::format::tiff::{base_descriptor, blank_plane, open_tiff, ParsedTiff};
use crate::format::{
    check_read, detect, select, FormatReader, ReaderEvent, ReaderOptions, Region,
    SeriesDescriptor,
};
use crate::store::{MetadataStore, MetadataTable};
use crate::tiff_file::DEFAULT_PREFETCH;

#[derive(Debug)]
struct OpenPlate {
    layout: PlateLayout,
    descriptors: Vec<SeriesDescriptor>,
    files: HashMap<PathBuf, ParsedTiff>,
}

/// Reader for plate directories named `<Row><Col>_s<field>_w<channel>.tif`.
///
/// Every field of every well in the grid spanned by the files present is a series, so series
/// numbering does not depend on which wells were acquired. Planes of fields without a file read
/// as zeros, and such fields contribute no used files.
#[derive(Debug)]
pub struct PlateReader {
    options: ReaderOptions,
    prefetch: u64,
    series: usize,
    metadata: MetadataTable,
    dataset: Option<OpenPlate>,
}

impl Default for PlateReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PlateReader {
    /// Registry name.
    pub const KIND: &'static str = "plate";

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

    /// The plate grid of the open dataset.
    pub fn layout(&self) -> MicroscopyResult<&PlateLayout> {
        Ok(&self.open_dataset()?.layout)
    }

    /// `(row, col, field)` of `series`.
    pub fn well_of(&self, series: usize) -> MicroscopyResult<(usize, usize, usize)> {
        let dataset = self.open_dataset()?;
        dataset
            .layout
            .series_position(series)
            .ok_or(MicroscopyError::SeriesOutOfRange {
                series,
                series_count: dataset.descriptors.len(),
            })
    }

    /// Files holding planes of `series`; empty for a field that was not acquired.
    pub fn series_used_files(&self, series: usize) -> MicroscopyResult<Vec<PathBuf>> {
        let (row, col, field) = self.well_of(series)?;
        Ok(self.open_dataset()?.layout.resources.used_files_where(|key| {
            matches!(*key, LogicalKey::Well { row: r, col: c, field: f, .. }
                if (r, c, f) == (row, col, field))
        }))
    }

    fn open_dataset(&self) -> MicroscopyResult<&OpenPlate> {
        self.dataset.as_ref().ok_or(MicroscopyError::NotInitialized)
    }
}

impl FormatReader for PlateReader {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_this_type(&self, path: &Path) -> bool {
        detect::is_plate_name(path) && matches!(detect::sniff_tiff(path), Ok(Some(_)))
    }

    fn set_id(&mut self, path: &Path) -> MicroscopyResult<()> {
        self.close()?;
        self.options.notify(ReaderEvent::Opening {
            kind: Self::KIND,
            path,
        });

        let prefetch = self.prefetch;
        let mut first: Option<SeriesDescriptor> = None;
        let mut files = HashMap::new();
        let layout = assemble_plate(path, |file| {
            let tiff = open_tiff(file, prefetch)?;
            let ifd = tiff.ifds().first().ok_or_else(|| {
                MicroscopyError::General(format!("{} has no directories", file.display()))
            })?;
            let descriptor = base_descriptor(ifd)?;
            match &first {
                None => first = Some(descriptor),
                Some(expected) if *expected != descriptor => {
                    return Err(MicroscopyError::General(format!(
                        "{} differs in geometry from the other plate images",
                        file.display()
                    )));
                }
                Some(_) => {}
            }
            let planes = tiff.ifds().len();
            files.insert(file.to_path_buf(), ParsedTiff::new(file, &tiff));
            Ok(planes)
        })?;
        let base = first.ok_or_else(|| {
            MicroscopyError::UnsupportedFormat(format!("no plate images next to {}", path.display()))
        })?;

        let mut descriptor = base.clone();
        descriptor.dimension_order = DimensionOrder::XYZCT;
        descriptor.size_z = layout.size_z;
        descriptor.size_c = layout.channels * if base.rgb { base.samples_per_pixel } else { 1 };
        descriptor.size_t = 1;
        descriptor.update_image_count();
        descriptor.validate()?;

        let series_count = layout.well_count() * layout.fields;
        let mut metadata = self.options.new_metadata();
        if self.options.collect_metadata {
            metadata.set_global("Rows", layout.rows.into());
            metadata.set_global("Columns", layout.cols.into());
            metadata.set_global("Fields", layout.fields.into());
            metadata.set_global("Channels", layout.channels.into());
            for series in 0..series_count {
                let Some((row, col, field)) = layout.series_position(series) else {
                    continue;
                };
                let well = format!("{}{:02}", PlateName::row_label(row), col + 1);
                metadata.set_series_value(series, "Well", well.into());
                metadata.set_series_value(series, "Field", (field + 1).into());
                let acquired = layout.resources.iter().any(|(key, _)| {
                    matches!(*key, LogicalKey::Well { row: r, col: c, field: f, .. }
                        if (r, c, f) == (row, col, field))
                });
                metadata.set_series_value(series, "Acquired", acquired.into());
            }
        }

        tracing::debug!(path = %path.display(), series = series_count, "opened plate");
        self.dataset = Some(OpenPlate {
            layout,
            descriptors: vec![descriptor; series_count],
            files,
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
        let (row, col, field) = self.well_of(series)?;
        let address = descriptor.zct(no)?;
        let key = LogicalKey::Well {
            row,
            col,
            field,
            z: address.z,
            c: address.c,
            t: address.t,
        };
        let Some(locator) = dataset.layout.resources.get(&key) else {
            tracing::warn!(
                well = %format!("{}{:02}", PlateName::row_label(row), col + 1),
                field = field + 1,
                no,
                "no image acquired; returning a blank plane"
            );
            return Ok(blank_plane(descriptor, &region));
        };
        let file = dataset.files.get(&locator.path).ok_or_else(|| {
            MicroscopyError::General(format!("{} was not part of the dataset", locator.path.display()))
        })?;
        file.read_plane(locator.plane, &region, descriptor, &self.options)
    }

    fn used_files(&self, include_pixel_data: bool) -> MicroscopyResult<Vec<PathBuf>> {
        let dataset = self.open_dataset()?;
        Ok(if include_pixel_data {
            dataset.layout.resources.used_files()
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
