use std::any::Any;
use std::path::{Path, PathBuf};

use crate::dimensions::{Axis, DimensionOrder};
use crate::error::{MicroscopyError, MicroscopyResult};
use crate::format::{check_read, select, FormatReader, ReaderOptions, Region, SeriesDescriptor};
use crate::store::MetadataTable;

/// Re-labels the Z, C and T axes of a series.
///
/// Planes keep their linear order; only the names of the axes change. After
/// `swap_dimensions(series, XYTCZ)` on an `XYZCT` series, the size that was Z becomes T, C
/// stays C and the size that was T becomes Z.
#[derive(Debug)]
pub struct DimensionSwapper {
    inner: Box<dyn FormatReader>,
    descriptors: Vec<SeriesDescriptor>,
}

impl DimensionSwapper {
    /// Registry name.
    pub const KIND: &'static str = "dimension-swapper";

    /// Wrap `inner`, which may already be open.
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        let mut swapper = Self {
            inner,
            descriptors: Vec::new(),
        };
        if swapper.inner.is_open() {
            if let Err(err) = swapper.refresh() {
                tracing::warn!(%err, "could not describe the wrapped reader's series");
            }
        }
        swapper
    }

    fn refresh(&mut self) -> MicroscopyResult<()> {
        let count = self.inner.series_count()?;
        self.descriptors = (0..count)
            .map(|series| self.inner.descriptor(series).cloned())
            .collect::<MicroscopyResult<_>>()?;
        Ok(())
    }

    fn opened(&self) -> MicroscopyResult<&[SeriesDescriptor]> {
        if !self.inner.is_open() {
            return Err(MicroscopyError::NotInitialized);
        }
        Ok(&self.descriptors)
    }

    /// Re-label `series` so that its planes read in `order`.
    ///
    /// The axis at each position of `order` takes the size of the axis at the same position of
    /// the current order.
    pub fn swap_dimensions(&mut self, series: usize, order: DimensionOrder) -> MicroscopyResult<()> {
        if !self.inner.is_open() {
            return Err(MicroscopyError::NotInitialized);
        }
        let series_count = self.descriptors.len();
        let descriptor = self
            .descriptors
            .get_mut(series)
            .ok_or(MicroscopyError::SeriesOutOfRange {
                series,
                series_count,
            })?;

        let size_of = |d: &SeriesDescriptor, axis: Axis| match axis {
            Axis::Z => d.size_z,
            Axis::C => d.effective_size_c(),
            Axis::T => d.size_t,
        };
        let mut sizes = [(Axis::Z, 1), (Axis::C, 1), (Axis::T, 1)];
        for (old, new) in descriptor.dimension_order.axes().into_iter().zip(order.axes()) {
            let size = size_of(descriptor, old);
            if let Some(slot) = sizes.iter_mut().find(|(axis, _)| *axis == new) {
                slot.1 = size;
            }
        }

        let packing = if descriptor.rgb { descriptor.samples_per_pixel } else { 1 };
        for (axis, size) in sizes {
            match axis {
                Axis::Z => descriptor.size_z = size,
                Axis::C => descriptor.size_c = size * packing,
                Axis::T => descriptor.size_t = size,
            }
        }
        tracing::debug!(series, from = %descriptor.dimension_order, to = %order, "swapped dimensions");
        descriptor.dimension_order = order;
        descriptor.update_image_count();
        descriptor.validate()
    }
}

impl FormatReader for DimensionSwapper {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_this_type(&self, path: &Path) -> bool {
        self.inner.is_this_type(path)
    }

    fn set_id(&mut self, path: &Path) -> MicroscopyResult<()> {
        self.descriptors.clear();
        self.inner.set_id(path)?;
        self.refresh()
    }

    fn close(&mut self) -> MicroscopyResult<()> {
        self.descriptors.clear();
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn series_count(&self) -> MicroscopyResult<usize> {
        Ok(self.opened()?.len())
    }

    fn descriptor(&self, series: usize) -> MicroscopyResult<&SeriesDescriptor> {
        select(self.opened()?, series)
    }

    fn series(&self) -> usize {
        self.inner.series()
    }

    fn set_series(&mut self, series: usize) -> MicroscopyResult<()> {
        self.inner.set_series(series)
    }

    fn open_plane(&self, series: usize, no: usize, region: Region) -> MicroscopyResult<Vec<u8>> {
        check_read(self.descriptor(series)?, no, &region)?;
        self.inner.open_plane(series, no, region)
    }

    fn used_files(&self, include_pixel_data: bool) -> MicroscopyResult<Vec<PathBuf>> {
        self.inner.used_files(include_pixel_data)
    }

    fn metadata(&self) -> &MetadataTable {
        self.inner.metadata()
    }

    fn options(&self) -> &ReaderOptions {
        self.inner.options()
    }

    fn options_mut(&mut self) -> &mut ReaderOptions {
        self.inner.options_mut()
    }

    fn inner(&self) -> Option<&dyn FormatReader> {
        Some(self.inner.as_ref())
    }

    fn inner_mut(&mut self) -> Option<&mut dyn FormatReader> {
        Some(self.inner.as_mut())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
