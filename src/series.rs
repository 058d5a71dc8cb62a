//! The per-series dimensional model.

use std::fmt;
use std::str::FromStr;

use crate::dimensions::{to_index, to_zct, DimensionOrder, PlaneAddress};
use crate::error::{MicroscopyError, MicroscopyResult};

/// Storage type of one pixel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum PixelType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float,
    Double,
}

impl PixelType {
    /// Size of one sample in bytes.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelType::Int8 | PixelType::Uint8 => 1,
            PixelType::Int16 | PixelType::Uint16 => 2,
            PixelType::Int32 | PixelType::Uint32 | PixelType::Float => 4,
            PixelType::Double => 8,
        }
    }

    /// `true` for `Float` and `Double`.
    pub fn is_floating_point(&self) -> bool {
        matches!(self, PixelType::Float | PixelType::Double)
    }

    /// `true` for the signed integer types.
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            PixelType::Int8 | PixelType::Int16 | PixelType::Int32 | PixelType::Float | PixelType::Double
        )
    }

    /// The lower-case name used in OME-XML, e.g. `uint16`.
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelType::Int8 => "int8",
            PixelType::Uint8 => "uint8",
            PixelType::Int16 => "int16",
            PixelType::Uint16 => "uint16",
            PixelType::Int32 => "int32",
            PixelType::Uint32 => "uint32",
            PixelType::Float => "float",
            PixelType::Double => "double",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelType {
    type Err = MicroscopyError;

    fn from_str(s: &str) -> MicroscopyResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "int8" => Ok(PixelType::Int8),
            "uint8" => Ok(PixelType::Uint8),
            "int16" => Ok(PixelType::Int16),
            "uint16" => Ok(PixelType::Uint16),
            "int32" => Ok(PixelType::Int32),
            "uint32" => Ok(PixelType::Uint32),
            "float" => Ok(PixelType::Float),
            "double" => Ok(PixelType::Double),
            other => Err(MicroscopyError::General(format!(
                "unknown pixel type {other:?}"
            ))),
        }
    }
}

/// Dimensions and storage layout of one series.
///
/// `image_count` is the number of physical planes, `size_z * size_t * effective_size_c()`.
/// Samples of an `rgb` series are packed `samples_per_pixel` to a pixel, so one physical plane
/// carries that many channels.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesDescriptor {
    /// Plane width in pixels.
    pub size_x: usize,
    /// Plane height in pixels.
    pub size_y: usize,
    /// Number of focal planes.
    pub size_z: usize,
    /// Number of channels, counting packed samples.
    pub size_c: usize,
    /// Number of timepoints.
    pub size_t: usize,
    /// Sample storage type.
    pub pixel_type: PixelType,
    /// Traversal order of the planes.
    pub dimension_order: DimensionOrder,
    /// Whether samples are packed per pixel.
    pub rgb: bool,
    /// Samples per pixel, the channel packing factor when `rgb`.
    pub samples_per_pixel: usize,
    /// Whether packed samples are interleaved (`RGBRGB`) rather than stored as sample blocks.
    pub interleaved: bool,
    /// Byte order of the plane bytes returned by the reader.
    pub little_endian: bool,
    /// Whether pixel values index a color table.
    pub indexed: bool,
    /// Whether the color table is only for display.
    pub false_color: bool,
    /// Number of physical planes.
    pub image_count: usize,
}

impl SeriesDescriptor {
    /// A single-plane grayscale series.
    pub fn new(size_x: usize, size_y: usize, pixel_type: PixelType) -> Self {
        Self {
            size_x,
            size_y,
            size_z: 1,
            size_c: 1,
            size_t: 1,
            pixel_type,
            dimension_order: DimensionOrder::default(),
            rgb: false,
            samples_per_pixel: 1,
            interleaved: false,
            little_endian: true,
            indexed: false,
            false_color: false,
            image_count: 1,
        }
    }

    /// Channel count divided by the packing factor.
    pub fn effective_size_c(&self) -> usize {
        if self.rgb && self.samples_per_pixel > 0 {
            self.size_c / self.samples_per_pixel
        } else {
            self.size_c
        }
    }

    /// Recompute `image_count` from the axis sizes.
    pub fn update_image_count(&mut self) {
        self.image_count = self.size_z * self.size_t * self.effective_size_c();
    }

    /// Check the invariants relating sizes, packing and plane count.
    pub fn validate(&self) -> MicroscopyResult<()> {
        let sizes = [
            ("size_x", self.size_x),
            ("size_y", self.size_y),
            ("size_z", self.size_z),
            ("size_c", self.size_c),
            ("size_t", self.size_t),
            ("samples_per_pixel", self.samples_per_pixel),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(MicroscopyError::General(format!("{name} must be positive")));
        }
        if self.rgb && self.size_c % self.samples_per_pixel != 0 {
            return Err(MicroscopyError::General(format!(
                "size_c {} is not a multiple of samples_per_pixel {}",
                self.size_c, self.samples_per_pixel
            )));
        }
        let expected = self.size_z * self.size_t * self.effective_size_c();
        if self.image_count != expected {
            return Err(MicroscopyError::General(format!(
                "image_count {} does not match {}x{}x{} planes",
                self.image_count,
                self.size_z,
                self.effective_size_c(),
                self.size_t
            )));
        }
        Ok(())
    }

    /// Decode a plane index of this series.
    pub fn zct(&self, no: usize) -> MicroscopyResult<PlaneAddress> {
        to_zct(
            &self.dimension_order,
            self.size_z,
            self.effective_size_c(),
            self.size_t,
            no,
        )
    }

    /// Encode a plane address of this series.
    pub fn index(&self, address: PlaneAddress) -> MicroscopyResult<usize> {
        to_index(
            &self.dimension_order,
            self.size_z,
            self.effective_size_c(),
            self.size_t,
            address,
        )
    }

    /// Bytes needed for a `width` x `height` region of one plane.
    pub fn plane_size(&self, width: usize, height: usize) -> usize {
        let samples = if self.rgb { self.samples_per_pixel } else { 1 };
        width * height * samples * self.pixel_type.bytes_per_pixel()
    }

    /// Check a plane index against `image_count`.
    pub fn check_plane(&self, no: usize) -> MicroscopyResult<()> {
        if no >= self.image_count {
            return Err(MicroscopyError::PlaneIndexOutOfRange {
                index: no,
                image_count: self.image_count,
            });
        }
        Ok(())
    }

    /// Check that `region` lies inside the plane.
    pub fn check_region(&self, region: &Region) -> MicroscopyResult<()> {
        let fits_x = region.x.checked_add(region.width).is_some_and(|r| r <= self.size_x);
        let fits_y = region.y.checked_add(region.height).is_some_and(|b| b <= self.size_y);
        if !fits_x || !fits_y || region.width == 0 || region.height == 0 {
            return Err(MicroscopyError::InvalidRegion {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                size_x: self.size_x,
                size_y: self.size_y,
            });
        }
        Ok(())
    }
}

/// A sub-rectangle of a plane, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Left edge.
    pub x: usize,
    /// Top edge.
    pub y: usize,
    /// Width.
    pub width: usize,
    /// Height.
    pub height: usize,
}

impl Region {
    /// Construct a region.
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole plane of `descriptor`.
    pub fn full(descriptor: &SeriesDescriptor) -> Self {
        Self::new(0, 0, descriptor.size_x, descriptor.size_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_series() -> SeriesDescriptor {
        let mut series = SeriesDescriptor::new(4, 3, PixelType::Uint8);
        series.size_c = 6;
        series.size_z = 2;
        series.rgb = true;
        series.samples_per_pixel = 3;
        series.update_image_count();
        series
    }

    #[test]
    fn effective_channels_of_packed_series() {
        let series = rgb_series();
        assert_eq!(series.effective_size_c(), 2);
        assert_eq!(series.image_count, 4);
        series.validate().unwrap();
        assert_eq!(series.plane_size(4, 3), 36);
        assert_eq!(series.zct(3).unwrap(), PlaneAddress::new(1, 1, 0));
    }

    #[test]
    fn validate_rejects_bad_counts() {
        let mut series = rgb_series();
        series.image_count = 12;
        assert!(series.validate().is_err());

        let mut series = SeriesDescriptor::new(4, 3, PixelType::Uint16);
        series.size_t = 0;
        assert!(series.validate().is_err());
    }

    #[test]
    fn regions_must_fit() {
        let series = SeriesDescriptor::new(10, 8, PixelType::Uint16);
        series.check_region(&Region::full(&series)).unwrap();
        series.check_region(&Region::new(2, 3, 8, 5)).unwrap();
        assert!(series.check_region(&Region::new(3, 0, 8, 1)).is_err());
        assert!(series.check_region(&Region::new(0, 0, 0, 1)).is_err());
    }

    #[test]
    fn pixel_type_names() {
        assert_eq!("UINT16".parse::<PixelType>().unwrap(), PixelType::Uint16);
        assert_eq!(PixelType::Double.to_string(), "double");
        assert!("bit".parse::<PixelType>().is_err());
    }
}
