use std::any::Any;
use std::path::{Path, PathBuf};

use crate::error::{MicroscopyError, MicroscopyResult};
use crate::format::{
    FilePatternReader, FormatReader, OmeTiffReader, PlateReader, ReaderOptions, Region,
    SeriesDescriptor, TiffReader,
};
use crate::store::MetadataTable;
use crate::wrapper::ReaderRegistry;

/// Candidate kinds tried by [`ImageReader::new`], most specific first.
const DEFAULT_CANDIDATES: [&str; 4] = [
    OmeTiffReader::KIND,
    PlateReader::KIND,
    FilePatternReader::KIND,
    TiffReader::KIND,
];

/// Picks a concrete reader when a dataset is opened.
///
/// Candidates are asked in order whether they recognise the file; the first that does is
/// configured with this reader's options and opened. Until then, and after
/// [`close`](FormatReader::close), the options live here.
#[derive(Debug)]
pub struct ImageReader {
    registry: ReaderRegistry,
    candidates: Vec<&'static str>,
    options: ReaderOptions,
    empty: MetadataTable,
    reader: Option<Box<dyn FormatReader>>,
}

impl Default for ImageReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader {
    /// Registry name.
    pub const KIND: &'static str = "image-reader";

    /// A dispatcher over the built-in readers.
    pub fn new() -> Self {
        Self::with_candidates(ReaderRegistry::default(), DEFAULT_CANDIDATES.to_vec())
    }

    /// A dispatcher trying `candidates`, constructed from `registry`, in order.
    pub fn with_candidates(registry: ReaderRegistry, candidates: Vec<&'static str>) -> Self {
        Self {
            registry,
            candidates,
            options: ReaderOptions::default(),
            empty: MetadataTable::default(),
            reader: None,
        }
    }

    /// Kind of the reader chosen for the open dataset.
    pub fn chosen_kind(&self) -> Option<&'static str> {
        self.reader.as_ref().map(|reader| reader.kind())
    }

    fn current(&self) -> MicroscopyResult<&dyn FormatReader> {
        self.reader.as_deref().ok_or(MicroscopyError::NotInitialized)
    }
}

impl FormatReader for ImageReader {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_this_type(&self, path: &Path) -> bool {
        self.candidates.iter().any(|kind| {
            self.registry
                .create(kind)
                .is_ok_and(|candidate| candidate.is_this_type(path))
        })
    }

    fn set_id(&mut self, path: &Path) -> MicroscopyResult<()> {
        self.close()?;
        for kind in &self.candidates {
            let mut candidate = self.registry.create(kind)?;
            if !candidate.is_this_type(path) {
                continue;
            }
            tracing::debug!(kind, path = %path.display(), "dispatching");
            *candidate.options_mut() = self.options.clone();
            candidate.set_id(path)?;
            self.reader = Some(candidate);
            return Ok(());
        }
        Err(MicroscopyError::UnsupportedFormat(format!(
            "no reader recognises {}",
            path.display()
        )))
    }

    fn close(&mut self) -> MicroscopyResult<()> {
        if let Some(mut reader) = self.reader.take() {
            self.options = reader.options().clone();
            reader.close()?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.reader.as_ref().is_some_and(|reader| reader.is_open())
    }

    fn series_count(&self) -> MicroscopyResult<usize> {
        self.current()?.series_count()
    }

    fn descriptor(&self, series: usize) -> MicroscopyResult<&SeriesDescriptor> {
        self.current()?.descriptor(series)
    }

    fn series(&self) -> usize {
        self.reader.as_ref().map_or(0, |reader| reader.series())
    }

    fn set_series(&mut self, series: usize) -> MicroscopyResult<()> {
        match self.reader.as_mut() {
            Some(reader) => reader.set_series(series),
            None => Err(MicroscopyError::NotInitialized),
        }
    }

    fn open_plane(&self, series: usize, no: usize, region: Region) -> MicroscopyResult<Vec<u8>> {
        self.current()?.open_plane(series, no, region)
    }

    fn used_files(&self, include_pixel_data: bool) -> MicroscopyResult<Vec<PathBuf>> {
        self.current()?.used_files(include_pixel_data)
    }

    fn metadata(&self) -> &MetadataTable {
        match &self.reader {
            Some(reader) => reader.metadata(),
            None => &self.empty,
        }
    }

    fn options(&self) -> &ReaderOptions {
        match &self.reader {
            Some(reader) => reader.options(),
            None => &self.options,
        }
    }

    fn options_mut(&mut self) -> &mut ReaderOptions {
        match &mut self.reader {
            Some(reader) => reader.options_mut(),
            None => &mut self.options,
        }
    }

    fn inner(&self) -> Option<&dyn FormatReader> {
        self.reader.as_deref()
    }

    fn inner_mut(&mut self) -> Option<&mut dyn FormatReader> {
        match &mut self.reader {
            Some(reader) => Some(reader.as_mut()),
            None => None,
        }
    }

    fn is_dispatcher(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
