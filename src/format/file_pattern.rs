//! Series split over one TIFF per channel, focal plane or timepoint.

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::dataset::{assemble_pattern, LogicalKey, PatternLayout};
use crate::dimensions::{Axis, DimensionOrder};
use crate::error::{MicroscopyError, MicroscopyResult};
use crate::format::tiff::{base_descriptor, blank_plane, open_tiff, ParsedTiff};
use crate::format::{
    check_read, detect, select, FormatReader, ReaderEvent, ReaderOptions, Region,
    SeriesDescriptor,
};
use crate::store::{MetadataStore, MetadataTable};
use crate::tiff_file::DEFAULT_PREFETCH;

#[derive(Debug)]
struct OpenPattern {
    layout: PatternLayout,
    descriptors: Vec<SeriesDescriptor>,
    files: HashMap<PathBuf, ParsedTiff>,
}

/// Reader for files named `<prefix>_<c|z|t><n>.tif`.
///
/// Opening any member gathers every sibling with the same prefix and axis letter into one
/// series, ordered by `n`. Each member supplies the first plane of its file.
#[derive(Debug)]
pub struct FilePatternReader {
    options: ReaderOptions,
    prefetch: u64,
    series: usize,
    metadata: MetadataTable,
    dataset: Option<OpenPattern>,
}

impl Default for FilePatternReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FilePatternReader {
    /// Registry name.
    pub const KIND: &'static str = "file-pattern";

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

    /// The axis varying across member files.
    pub fn axis(&self) -> MicroscopyResult<Axis> {
        Ok(self.open_dataset()?.layout.axis)
    }

    fn open_dataset(&self) -> MicroscopyResult<&OpenPattern> {
        self.dataset.as_ref().ok_or(MicroscopyError::NotInitialized)
    }
}

impl FormatReader for FilePatternReader {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_this_type(&self, path: &Path) -> bool {
        detect::is_pattern_member(path) && matches!(detect::sniff_tiff(path), Ok(Some(_)))
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
        let layout = assemble_pattern(path, |file| {
            let tiff = open_tiff(file, prefetch)?;
            let ifd = tiff.ifds().first().ok_or_else(|| {
                MicroscopyError::General(format!("{} has no directories", file.display()))
            })?;
            let descriptor = base_descriptor(ifd)?;
            match &first {
                None => first = Some(descriptor),
                Some(expected) if *expected != descriptor => {
                    return Err(MicroscopyError::General(format!(
                        "{} differs in geometry from the other members",
                        file.display()
                    )));
                }
                Some(_) => {}
            }
            let planes = tiff.ifds().len();
            files.insert(file.to_path_buf(), ParsedTiff::new(file, &tiff));
            Ok(planes)
        })?;
        let mut descriptor = first.ok_or_else(|| {
            MicroscopyError::UnsupportedFormat(format!("no members for {}", path.display()))
        })?;

        let members = layout.files.len();
        let samples = if descriptor.rgb { descriptor.samples_per_pixel } else { 1 };
        descriptor.dimension_order = DimensionOrder::XYZCT;
        match layout.axis {
            Axis::Z => descriptor.size_z = members,
            Axis::C => descriptor.size_c = members * samples,
            Axis::T => descriptor.size_t = members,
        }
        descriptor.update_image_count();
        descriptor.validate()?;

        let mut metadata = self.options.new_metadata();
        if self.options.collect_metadata {
            metadata.set_global("Axis", format!("{:?}", layout.axis).into());
            metadata.set_global("MemberCount", members.into());
            for (no, file) in layout.files.iter().enumerate() {
                let name = file.display().to_string();
                metadata.set_plane_value(0, no, "File", name.into());
            }
        }

        tracing::debug!(path = %path.display(), members, axis = ?layout.axis, "opened file pattern");
        self.dataset = Some(OpenPattern {
            layout,
            descriptors: vec![descriptor],
            files,
        });
        self.metadata = metadata;
        self.series = 0;
        self.options.notify(ReaderEvent::Opened {
            kind: Self::KIND,
            series_count: 1,
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
        let Some(locator) = dataset.layout.resources.get(&key) else {
            tracing::warn!(no, "no member file for plane");
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
