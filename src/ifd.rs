use std::collections::HashMap;
use std::ops::Range;

use bytes::Bytes;

use crate::decoder::DecoderRegistry;
use crate::error::MicroscopyResult;
use crate::predictor::PredictorInfo;
use crate::reader::{Endianness, FileReader};
use crate::series::{PixelType, Region};
use crate::tiff::tags::{
    CompressionMethod, PhotometricInterpretation, PlanarConfiguration, Predictor, SampleFormat, Tag,
};
use crate::tiff::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError, Value};
use crate::tile::Chunk;

/// NewSubfileType bit marking a reduced-resolution copy of another image.
const REDUCED_RESOLUTION: u32 = 1;

/// An ImageFileDirectory representing Image content
///
/// Tags the engine interprets are decoded into fields; every entry, interpreted or not, stays
/// available through [`get`][Self::get].
#[derive(Debug, Clone)]
pub struct ImageFileDirectory {
    pub(crate) endianness: Endianness,

    pub(crate) new_subfile_type: Option<u32>,

    /// The number of columns in the image, i.e., the number of pixels per row.
    pub(crate) image_width: u32,

    /// The number of rows of pixels in the image.
    pub(crate) image_height: u32,

    pub(crate) bits_per_sample: Vec<u16>,

    pub(crate) compression: CompressionMethod,

    pub(crate) photometric_interpretation: PhotometricInterpretation,

    pub(crate) image_description: Option<String>,

    pub(crate) strip_offsets: Option<Vec<u64>>,

    /// The number of components per pixel.
    pub(crate) samples_per_pixel: u16,

    pub(crate) rows_per_strip: Option<u32>,

    pub(crate) strip_byte_counts: Option<Vec<u64>>,

    /// How the components of each pixel are stored.
    ///
    /// - Chunky format. The component values for each pixel are stored contiguously, e.g.
    ///   RGBRGBRGB
    /// - Planar format. The components are stored in separate component planes.
    ///
    /// If SamplesPerPixel is 1, PlanarConfiguration is irrelevant, and need not be included.
    pub(crate) planar_configuration: PlanarConfiguration,

    pub(crate) predictor: Predictor,

    /// A color map for palette color images, all red values first, then green, then blue.
    pub(crate) color_map: Option<Vec<u16>>,

    pub(crate) tile_width: Option<u32>,
    pub(crate) tile_height: Option<u32>,

    pub(crate) tile_offsets: Option<Vec<u64>>,
    pub(crate) tile_byte_counts: Option<Vec<u64>>,

    pub(crate) sample_format: Vec<SampleFormat>,

    pub(crate) jpeg_tables: Option<Bytes>,

    pub(crate) tags: HashMap<Tag, Value>,
}

impl ImageFileDirectory {
    /// Build a directory from its decoded entries.
    ///
    /// `ImageWidth` and `ImageLength` are required; every other interpreted tag falls back to its
    /// TIFF default when absent.
    pub fn from_tags(tags: HashMap<Tag, Value>, endianness: Endianness) -> TiffResult<Self> {
        let get = |tag: Tag| tags.get(&tag).cloned();
        let required = |tag: Tag| get(tag).ok_or(TiffFormatError::RequiredTagNotFound(tag));

        let image_width = required(Tag::ImageWidth)?.into_u32()?;
        let image_height = required(Tag::ImageLength)?.into_u32()?;

        let samples_per_pixel = get(Tag::SamplesPerPixel)
            .map(Value::into_u16)
            .transpose()?
            .unwrap_or(1);
        if samples_per_pixel == 0 {
            return Err(TiffFormatError::SamplesPerPixelIsZero.into());
        }

        // Default is 1 bit per sample
        let bits_per_sample = get(Tag::BitsPerSample)
            .map(Value::into_u16_vec)
            .transpose()?
            .unwrap_or_else(|| vec![1; samples_per_pixel as usize]);
        if bits_per_sample.is_empty() {
            return Err(TiffFormatError::RequiredTagEmpty(Tag::BitsPerSample).into());
        }

        let compression = get(Tag::Compression)
            .map(Value::into_u16)
            .transpose()?
            .map(CompressionMethod::from_u16_exhaustive)
            .unwrap_or(CompressionMethod::None);

        let photometric_interpretation = get(Tag::PhotometricInterpretation)
            .map(Value::into_u16)
            .transpose()?
            .map(PhotometricInterpretation::from_u16_exhaustive)
            .unwrap_or(PhotometricInterpretation::BlackIsZero);

        let planar_configuration = match get(Tag::PlanarConfiguration) {
            Some(value) => {
                let raw = value.into_u16()?;
                PlanarConfiguration::from_u16(raw).ok_or_else(|| {
                    TiffFormatError::InvalidTagValueType(format!("PlanarConfiguration {raw}"))
                })?
            }
            None => PlanarConfiguration::Chunky,
        };

        let predictor = match get(Tag::Predictor) {
            Some(value) => {
                let raw = value.into_u16()?;
                Predictor::from_u16(raw).ok_or_else(|| {
                    TiffFormatError::InvalidTagValueType(format!("Predictor {raw}"))
                })?
            }
            None => Predictor::None,
        };

        // Uint is the default for SampleFormat
        let sample_format = match get(Tag::SampleFormat) {
            Some(value) => value
                .into_u16_vec()?
                .into_iter()
                .map(SampleFormat::from_u16_exhaustive)
                .collect(),
            None => vec![SampleFormat::Uint; samples_per_pixel as usize],
        };

        let u64_vec = |tag: Tag| get(tag).map(Value::into_u64_vec).transpose();
        let u32_val = |tag: Tag| get(tag).map(Value::into_u32).transpose();

        Ok(Self {
            endianness,
            new_subfile_type: u32_val(Tag::NewSubfileType)?,
            image_width,
            image_height,
            bits_per_sample,
            compression,
            photometric_interpretation,
            image_description: get(Tag::ImageDescription).map(Value::into_string).transpose()?,
            strip_offsets: u64_vec(Tag::StripOffsets)?,
            samples_per_pixel,
            rows_per_strip: u32_val(Tag::RowsPerStrip)?,
            strip_byte_counts: u64_vec(Tag::StripByteCounts)?,
            planar_configuration,
            predictor,
            color_map: get(Tag::ColorMap).map(Value::into_u16_vec).transpose()?,
            tile_width: u32_val(Tag::TileWidth)?,
            tile_height: u32_val(Tag::TileLength)?,
            tile_offsets: u64_vec(Tag::TileOffsets)?,
            tile_byte_counts: u64_vec(Tag::TileByteCounts)?,
            sample_format,
            jpeg_tables: get(Tag::JPEGTables)
                .map(Value::into_u8_vec)
                .transpose()?
                .map(Bytes::from),
            tags,
        })
    }

    /// Look up any entry by tag.
    pub fn get(&self, tag: Tag) -> Option<&Value> {
        self.tags.get(&tag)
    }

    /// Look up an unsigned entry, falling back to `default` when absent.
    pub fn get_u32_or(&self, tag: Tag, default: u32) -> TiffResult<u32> {
        match self.tags.get(&tag) {
            Some(value) => value.clone().into_u32(),
            None => Ok(default),
        }
    }

    /// All entries of this directory.
    pub fn tags(&self) -> &HashMap<Tag, Value> {
        &self.tags
    }

    /// Byte order of the file this directory was read from.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// A general indication of the kind of data contained in this subfile.
    pub fn new_subfile_type(&self) -> Option<u32> {
        self.new_subfile_type
    }

    /// `true` if this directory is a reduced-resolution copy of another image.
    pub fn is_reduced_resolution(&self) -> bool {
        self.new_subfile_type
            .is_some_and(|t| t & REDUCED_RESOLUTION != 0)
    }

    /// The number of columns in the image, i.e., the number of pixels per row.
    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    /// The number of rows of pixels in the image.
    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    /// Number of bits per component.
    pub fn bits_per_sample(&self) -> &[u16] {
        &self.bits_per_sample
    }

    /// Compression scheme used on the image data.
    pub fn compression(&self) -> CompressionMethod {
        self.compression
    }

    /// The color space of the image data.
    pub fn photometric_interpretation(&self) -> PhotometricInterpretation {
        self.photometric_interpretation
    }

    /// A string that describes the subject of the image.
    pub fn image_description(&self) -> Option<&str> {
        self.image_description.as_deref()
    }

    /// The number of components per pixel.
    pub fn samples_per_pixel(&self) -> u16 {
        self.samples_per_pixel
    }

    /// How the components of each pixel are stored.
    pub fn planar_configuration(&self) -> PlanarConfiguration {
        self.planar_configuration
    }

    /// Differencing applied to the image data before compression.
    pub fn predictor(&self) -> Predictor {
        self.predictor
    }

    /// Name and version number of the software package(s) used to create the image.
    pub fn software(&self) -> Option<&str> {
        match self.tags.get(&Tag::Software) {
            Some(Value::Ascii(s)) => Some(s),
            _ => None,
        }
    }

    /// The RGB color map of a palette image.
    pub fn color_map(&self) -> Option<&[u16]> {
        self.color_map.as_deref()
    }

    /// How to interpret each data sample in a pixel.
    pub fn sample_format(&self) -> &[SampleFormat] {
        &self.sample_format
    }

    /// `true` if the image data is organized in tiles rather than strips.
    pub fn is_tiled(&self) -> bool {
        self.tile_width.is_some() && self.tile_offsets.is_some()
    }

    /// The tile size in pixels, for tiled images.
    pub fn tile_size(&self) -> Option<(u32, u32)> {
        Some((self.tile_width?, self.tile_height?))
    }

    /// Resolve the sample storage type from bits per sample and sample format.
    ///
    /// Bit depths are rounded up to the next byte boundary, so 12-bit data resolves to a 16-bit
    /// type.
    pub fn pixel_type(&self) -> TiffResult<PixelType> {
        let bits = self.uniform_bits_per_sample()?;
        let bytes = (bits as usize).div_ceil(8);
        let format = self
            .sample_format
            .first()
            .copied()
            .unwrap_or(SampleFormat::Uint);

        match (format, bytes) {
            (SampleFormat::Uint | SampleFormat::Void, 1) => Ok(PixelType::Uint8),
            (SampleFormat::Uint | SampleFormat::Void, 2) => Ok(PixelType::Uint16),
            (SampleFormat::Uint | SampleFormat::Void, 4) => Ok(PixelType::Uint32),
            (SampleFormat::Int, 1) => Ok(PixelType::Int8),
            (SampleFormat::Int, 2) => Ok(PixelType::Int16),
            (SampleFormat::Int, 4) => Ok(PixelType::Int32),
            (SampleFormat::IEEEFP, 4) => Ok(PixelType::Float),
            (SampleFormat::IEEEFP, 8) => Ok(PixelType::Double),
            (
                SampleFormat::Uint | SampleFormat::Int | SampleFormat::Void | SampleFormat::IEEEFP,
                _,
            ) => Err(TiffUnsupportedError::UnsupportedBitsPerChannel(bits).into()),
            (format, _) => Err(TiffUnsupportedError::UnsupportedSampleFormat(vec![format]).into()),
        }
    }

    fn uniform_bits_per_sample(&self) -> TiffResult<u16> {
        let bits = self.bits_per_sample[0];
        if self.bits_per_sample.iter().any(|b| *b != bits) {
            return Err(
                TiffUnsupportedError::InconsistentBitsPerSample(self.bits_per_sample.clone()).into(),
            );
        }
        Ok(bits)
    }

    /// Bytes per sample for directories whose samples can be read without bit unpacking.
    fn bytes_per_sample(&self) -> TiffResult<usize> {
        let bits = self.uniform_bits_per_sample()?;
        if bits == 0 || bits % 8 != 0 {
            return Err(TiffUnsupportedError::UnsupportedBitsPerChannel(bits).into());
        }
        Ok(bits as usize / 8)
    }

    /// Describe how the image data is split into strips or tiles, validating the offset and
    /// byte count arrays against that layout.
    pub(crate) fn chunk_layout(&self) -> TiffResult<ChunkLayout<'_>> {
        let width = self.image_width as usize;
        let height = self.image_height as usize;
        if width == 0 || height == 0 {
            return Err(TiffFormatError::InvalidDimensions(self.image_width, self.image_height).into());
        }

        let (chunk_width, chunk_height, offsets, byte_counts) = match (
            &self.tile_offsets,
            &self.tile_byte_counts,
            &self.strip_offsets,
            &self.strip_byte_counts,
        ) {
            (Some(offsets), Some(byte_counts), _, _) => {
                let (tile_width, tile_height) = self
                    .tile_size()
                    .ok_or(TiffFormatError::RequiredTagNotFound(Tag::TileWidth))?;
                if tile_width == 0 || tile_height == 0 {
                    return Err(TiffFormatError::InvalidDimensions(tile_width, tile_height).into());
                }
                (tile_width as usize, tile_height as usize, offsets, byte_counts)
            }
            (None, None, Some(offsets), Some(byte_counts)) => {
                let rows = match self.rows_per_strip {
                    Some(0) | None => height,
                    Some(rows) => (rows as usize).min(height),
                };
                (width, rows, offsets, byte_counts)
            }
            _ => return Err(TiffFormatError::StripTileTagConflict.into()),
        };

        if offsets.len() != byte_counts.len() {
            return Err(TiffFormatError::StripTileArrayMismatch {
                offsets: offsets.len(),
                byte_counts: byte_counts.len(),
            }
            .into());
        }

        let sample_planes = match self.planar_configuration {
            PlanarConfiguration::Chunky => 1,
            PlanarConfiguration::Planar => self.samples_per_pixel as usize,
        };
        let layout = ChunkLayout {
            tiled: self.tile_offsets.is_some(),
            chunk_width,
            chunk_height,
            chunks_across: width.div_ceil(chunk_width),
            chunks_down: height.div_ceil(chunk_height),
            sample_planes,
            offsets,
            byte_counts,
        };

        let required_chunks = layout.chunks_per_plane() * sample_planes;
        if offsets.len() < required_chunks {
            return Err(TiffFormatError::ChunkCountMismatch {
                actual_chunks: offsets.len(),
                required_chunks,
            }
            .into());
        }
        Ok(layout)
    }

    /// Fetch the compressed bytes of one strip or tile.
    pub(crate) fn fetch_chunk(
        &self,
        reader: &dyn FileReader,
        layout: &ChunkLayout<'_>,
        info: PredictorInfo,
        sample: usize,
        column: usize,
        row: usize,
    ) -> MicroscopyResult<Chunk> {
        let index = layout.chunk_index(sample, column, row);
        let range = layout
            .byte_range(index)
            .ok_or(TiffError::UsageError(crate::tiff::UsageError::InvalidChunkIndex(
                index as u32,
            )))?;
        Ok(Chunk {
            sample,
            column,
            row,
            info,
            predictor: self.predictor,
            compression: self.compression,
            photometric_interpretation: self.photometric_interpretation,
            jpeg_tables: self.jpeg_tables.clone(),
            bytes: reader.get_bytes(range)?,
        })
    }

    /// Read a sub-rectangle of this directory's image.
    ///
    /// The returned bytes keep the file byte order. Chunky data is returned as interleaved rows;
    /// planar data as one block per sample, each `region.width * region.height` samples long.
    pub fn read_region(
        &self,
        reader: &dyn FileReader,
        registry: &DecoderRegistry,
        region: &Region,
    ) -> MicroscopyResult<Vec<u8>> {
        let bytes_per_sample = self.bytes_per_sample()?;
        let layout = self.chunk_layout()?;

        let samples_in_chunk = match self.planar_configuration {
            PlanarConfiguration::Chunky => self.samples_per_pixel as usize,
            PlanarConfiguration::Planar => 1,
        };
        let pixel_bytes = bytes_per_sample * samples_in_chunk;
        let out_row_bytes = region.width * pixel_bytes;
        let block_bytes = out_row_bytes * region.height;
        let mut output = vec![0u8; block_bytes * layout.sample_planes];

        if region.width == 0 || region.height == 0 {
            return Ok(output);
        }

        let image_width = self.image_width as usize;
        let image_height = self.image_height as usize;
        let region_right = (region.x + region.width).min(image_width);
        let region_bottom = (region.y + region.height).min(image_height);

        for sample in 0..layout.sample_planes {
            for chunk_y in region.y / layout.chunk_height..region_bottom.div_ceil(layout.chunk_height)
            {
                for chunk_x in
                    region.x / layout.chunk_width..region_right.div_ceil(layout.chunk_width)
                {
                    let chunk_x0 = chunk_x * layout.chunk_width;
                    let chunk_y0 = chunk_y * layout.chunk_height;
                    // Tiles are always stored whole; the last strip may be short.
                    let chunk_rows = if layout.tiled {
                        layout.chunk_height
                    } else {
                        layout.chunk_height.min(image_height - chunk_y0)
                    };
                    let info = PredictorInfo {
                        endianness: self.endianness,
                        chunk_width: layout.chunk_width,
                        chunk_height: chunk_rows,
                        bytes_per_sample,
                        samples_per_pixel: samples_in_chunk,
                    };

                    let chunk = self
                        .fetch_chunk(reader, &layout, info, sample, chunk_x, chunk_y)?
                        .decode(registry)?;

                    let x_start = region.x.max(chunk_x0);
                    let x_end = region_right.min(chunk_x0 + layout.chunk_width);
                    let y_start = region.y.max(chunk_y0);
                    let y_end = region_bottom.min(chunk_y0 + chunk_rows);
                    let copy_bytes = (x_end - x_start) * pixel_bytes;

                    for row in y_start..y_end {
                        let src = (row - chunk_y0) * info.row_bytes()
                            + (x_start - chunk_x0) * pixel_bytes;
                        let dst = sample * block_bytes
                            + (row - region.y) * out_row_bytes
                            + (x_start - region.x) * pixel_bytes;
                        output[dst..dst + copy_bytes]
                            .copy_from_slice(&chunk[src..src + copy_bytes]);
                    }
                }
            }
        }

        Ok(output)
    }
}

/// The strip or tile grid of one directory.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkLayout<'a> {
    pub tiled: bool,
    pub chunk_width: usize,
    pub chunk_height: usize,
    pub chunks_across: usize,
    pub chunks_down: usize,
    /// 1 for chunky data, samples per pixel for planar data.
    pub sample_planes: usize,
    offsets: &'a [u64],
    byte_counts: &'a [u64],
}

impl ChunkLayout<'_> {
    pub fn chunks_per_plane(&self) -> usize {
        self.chunks_across * self.chunks_down
    }

    pub fn chunk_index(&self, sample: usize, x: usize, y: usize) -> usize {
        sample * self.chunks_per_plane() + y * self.chunks_across + x
    }

    fn byte_range(&self, index: usize) -> Option<Range<u64>> {
        let offset = *self.offsets.get(index)?;
        let byte_count = *self.byte_counts.get(index)?;
        Some(offset..offset.checked_add(byte_count)?)
    }
}
