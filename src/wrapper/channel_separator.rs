use std::any::Any;
use std::path::{Path, PathBuf};

use crate::dimensions::PlaneAddress;
use crate::error::{MicroscopyError, MicroscopyResult};
use crate::format::{check_read, select, FormatReader, ReaderOptions, Region, SeriesDescriptor};
use crate::store::MetadataTable;

/// Presents every sample of a packed series as its own plane.
///
/// Series that are not `rgb` pass through untouched. For packed series, channel `c` of the
/// separated series is sample `c % samples_per_pixel` of channel group `c / samples_per_pixel`
/// of the wrapped series.
#[derive(Debug)]
pub struct ChannelSeparator {
    inner: Box<dyn FormatReader>,
    descriptors: Vec<SeriesDescriptor>,
}

impl ChannelSeparator {
    /// Registry name.
    pub const KIND: &'static str = "channel-separator";

    /// Wrap `inner`, which may already be open.
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        let mut separator = Self {
            inner,
            descriptors: Vec::new(),
        };
        if separator.inner.is_open() {
            if let Err(err) = separator.refresh() {
                tracing::warn!(%err, "could not describe the wrapped reader's series");
            }
        }
        separator
    }

    fn refresh(&mut self) -> MicroscopyResult<()> {
        let count = self.inner.series_count()?;
        self.descriptors = (0..count)
            .map(|series| self.inner.descriptor(series).map(separated))
            .collect::<MicroscopyResult<_>>()?;
        Ok(())
    }

    fn opened(&self) -> MicroscopyResult<&[SeriesDescriptor]> {
        if !self.inner.is_open() {
            return Err(MicroscopyError::NotInitialized);
        }
        Ok(&self.descriptors)
    }
}

fn separated(packed: &SeriesDescriptor) -> SeriesDescriptor {
    let mut descriptor = packed.clone();
    if descriptor.rgb {
        descriptor.rgb = false;
        descriptor.samples_per_pixel = 1;
        descriptor.interleaved = false;
        descriptor.update_image_count();
    }
    descriptor
}

/// Pull sample `sample` out of a packed region of `pixels` pixels.
fn extract_sample(
    packed: &[u8],
    sample: usize,
    samples: usize,
    sample_bytes: usize,
    pixels: usize,
    interleaved: bool,
) -> Vec<u8> {
    if interleaved {
        let pixel_bytes = samples * sample_bytes;
        packed
            .chunks_exact(pixel_bytes)
            .take(pixels)
            .flat_map(|pixel| &pixel[sample * sample_bytes..(sample + 1) * sample_bytes])
            .copied()
            .collect()
    } else {
        let block = pixels * sample_bytes;
        packed[sample * block..(sample + 1) * block].to_vec()
    }
}

impl FormatReader for ChannelSeparator {
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
        let packed = self.inner.descriptor(series)?;
        if !packed.rgb {
            return self.inner.open_plane(series, no, region);
        }
        let descriptor = self.descriptor(series)?;
        check_read(descriptor, no, &region)?;

        let samples = packed.samples_per_pixel;
        let address = descriptor.zct(no)?;
        let source = packed.index(PlaneAddress::new(address.z, address.c / samples, address.t))?;
        let bytes = self.inner.open_plane(series, source, region)?;
        Ok(extract_sample(
            &bytes,
            address.c % samples,
            samples,
            packed.pixel_type.bytes_per_pixel(),
            region.width * region.height,
            packed.interleaved,
        ))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::PixelType;

    #[test]
    fn separated_descriptor() {
        let mut rgb = SeriesDescriptor::new(4, 4, PixelType::Uint8);
        rgb.rgb = true;
        rgb.samples_per_pixel = 3;
        rgb.size_c = 3;
        rgb.size_t = 2;
        rgb.interleaved = true;
        rgb.update_image_count();
        assert_eq!(rgb.image_count, 2);

        let split = separated(&rgb);
        assert!(!split.rgb);
        assert_eq!(split.image_count, 6);
        assert_eq!(split.size_c, 3);
        split.validate().unwrap();
    }

    #[test]
    fn extracts_samples() {
        // Two RGB pixels of 16-bit samples.
        let interleaved = [1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0];
        assert_eq!(extract_sample(&interleaved, 1, 3, 2, 2, true), vec![2, 0, 5, 0]);
        let planar = [1, 4, 2, 5, 3, 6];
        assert_eq!(extract_sample(&planar, 2, 3, 1, 2, false), vec![3, 6]);
    }
}
