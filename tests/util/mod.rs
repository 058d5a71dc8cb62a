//! Synthetic little-endian TIFF files for the integration tests.
//!
//! Every directory is written after the strips or tiles it points at, so offsets are known by
//! the time an entry is encoded.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

const SHORT: u16 = 3;
const LONG: u16 = 4;
const ASCII: u16 = 2;

const IMAGE_WIDTH: u16 = 256;
const IMAGE_LENGTH: u16 = 257;
const BITS_PER_SAMPLE: u16 = 258;
const COMPRESSION: u16 = 259;
const PHOTOMETRIC: u16 = 262;
const IMAGE_DESCRIPTION: u16 = 270;
const STRIP_OFFSETS: u16 = 273;
const SAMPLES_PER_PIXEL: u16 = 277;
const ROWS_PER_STRIP: u16 = 278;
const STRIP_BYTE_COUNTS: u16 = 279;
const PLANAR_CONFIGURATION: u16 = 284;
const PREDICTOR: u16 = 317;
const TILE_WIDTH: u16 = 322;
const TILE_LENGTH: u16 = 323;
const TILE_OFFSETS: u16 = 324;
const TILE_BYTE_COUNTS: u16 = 325;
const SAMPLE_FORMAT: u16 = 339;

/// One image file directory and the chunks it owns.
#[derive(Debug, Clone)]
pub struct IfdPlan {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: u16,
    pub samples_per_pixel: u16,
    pub planar: u16,
    pub compression: u16,
    pub photometric: u16,
    pub predictor: Option<u16>,
    pub sample_format: Option<u16>,
    pub description: Option<String>,
    /// `Some` for strips, `None` for a single strip covering the image.
    pub rows_per_strip: Option<u32>,
    /// Tile size; chunks are tiles when set.
    pub tile: Option<(u32, u32)>,
    /// Strip or tile payloads, already compressed.
    pub chunks: Vec<Vec<u8>>,
    /// Replaces the byte counts written for the chunks.
    pub byte_counts: Option<Vec<u32>>,
}

impl IfdPlan {
    /// An uncompressed grayscale image stored as one strip.
    pub fn gray(width: u32, height: u32, bits_per_sample: u16, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bits_per_sample,
            samples_per_pixel: 1,
            planar: 1,
            compression: 1,
            photometric: 1,
            predictor: None,
            sample_format: None,
            description: None,
            rows_per_strip: None,
            tile: None,
            chunks: vec![pixels],
            byte_counts: None,
        }
    }

    /// An uncompressed 8-bit RGB image stored as one chunky strip.
    pub fn rgb(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            samples_per_pixel: 3,
            photometric: 2,
            ..Self::gray(width, height, 8, pixels)
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn strips(mut self, rows_per_strip: u32, chunks: Vec<Vec<u8>>) -> Self {
        self.rows_per_strip = Some(rows_per_strip);
        self.chunks = chunks;
        self
    }

    pub fn tiles(mut self, tile_width: u32, tile_height: u32, chunks: Vec<Vec<u8>>) -> Self {
        self.tile = Some((tile_width, tile_height));
        self.chunks = chunks;
        self
    }

    pub fn compression(mut self, compression: u16) -> Self {
        self.compression = compression;
        self
    }

    pub fn predictor(mut self, predictor: u16) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn planar(mut self) -> Self {
        self.planar = 2;
        self
    }

    pub fn sample_format(mut self, sample_format: u16) -> Self {
        self.sample_format = Some(sample_format);
        self
    }

    pub fn byte_counts(mut self, byte_counts: Vec<u32>) -> Self {
        self.byte_counts = Some(byte_counts);
        self
    }
}

struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    payload: Vec<u8>,
}

fn shorts(tag: u16, values: &[u16]) -> Entry {
    Entry {
        tag,
        field_type: SHORT,
        count: values.len() as u32,
        payload: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

fn longs(tag: u16, values: &[u32]) -> Entry {
    Entry {
        tag,
        field_type: LONG,
        count: values.len() as u32,
        payload: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

fn ascii(tag: u16, text: &str) -> Entry {
    let mut payload = text.as_bytes().to_vec();
    payload.push(0);
    Entry {
        tag,
        field_type: ASCII,
        count: payload.len() as u32,
        payload,
    }
}

/// Assembles a classic little-endian TIFF.
#[derive(Debug, Clone, Default)]
pub struct TiffBuilder {
    ifds: Vec<IfdPlan>,
    /// Point the last directory back at itself.
    cycle: bool,
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ifd(mut self, ifd: IfdPlan) -> Self {
        self.ifds.push(ifd);
        self
    }

    pub fn cycle(mut self) -> Self {
        self.cycle = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        // Where the offset of the next directory goes.
        let mut next_slot = 4usize;
        let mut last_ifd = 0u32;

        for plan in &self.ifds {
            let mut offsets = Vec::with_capacity(plan.chunks.len());
            for chunk in &plan.chunks {
                offsets.push(out.len() as u32);
                out.extend_from_slice(chunk);
            }
            let byte_counts = plan
                .byte_counts
                .clone()
                .unwrap_or_else(|| plan.chunks.iter().map(|c| c.len() as u32).collect());

            let samples = plan.samples_per_pixel as usize;
            let mut entries = vec![
                longs(IMAGE_WIDTH, &[plan.width]),
                longs(IMAGE_LENGTH, &[plan.height]),
                shorts(BITS_PER_SAMPLE, &vec![plan.bits_per_sample; samples]),
                shorts(COMPRESSION, &[plan.compression]),
                shorts(PHOTOMETRIC, &[plan.photometric]),
                shorts(SAMPLES_PER_PIXEL, &[plan.samples_per_pixel]),
                shorts(PLANAR_CONFIGURATION, &[plan.planar]),
            ];
            if let Some(description) = &plan.description {
                entries.push(ascii(IMAGE_DESCRIPTION, description));
            }
            if let Some(predictor) = plan.predictor {
                entries.push(shorts(PREDICTOR, &[predictor]));
            }
            if let Some(format) = plan.sample_format {
                entries.push(shorts(SAMPLE_FORMAT, &vec![format; samples]));
            }
            match plan.tile {
                Some((tile_width, tile_height)) => {
                    entries.push(longs(TILE_WIDTH, &[tile_width]));
                    entries.push(longs(TILE_LENGTH, &[tile_height]));
                    entries.push(longs(TILE_OFFSETS, &offsets));
                    entries.push(longs(TILE_BYTE_COUNTS, &byte_counts));
                }
                None => {
                    let rows = plan.rows_per_strip.unwrap_or(plan.height);
                    entries.push(longs(ROWS_PER_STRIP, &[rows]));
                    entries.push(longs(STRIP_OFFSETS, &offsets));
                    entries.push(longs(STRIP_BYTE_COUNTS, &byte_counts));
                }
            }
            entries.sort_by_key(|entry| entry.tag);

            // Values too long for the entry slot go before the directory.
            let mut slots = Vec::with_capacity(entries.len());
            for entry in &entries {
                if entry.payload.len() > 4 {
                    if out.len() % 2 == 1 {
                        out.push(0);
                    }
                    slots.push((out.len() as u32).to_le_bytes());
                    out.extend_from_slice(&entry.payload);
                } else {
                    let mut slot = [0u8; 4];
                    slot[..entry.payload.len()].copy_from_slice(&entry.payload);
                    slots.push(slot);
                }
            }

            if out.len() % 2 == 1 {
                out.push(0);
            }
            let ifd_offset = out.len() as u32;
            out[next_slot..next_slot + 4].copy_from_slice(&ifd_offset.to_le_bytes());
            last_ifd = ifd_offset;

            out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for (entry, slot) in entries.iter().zip(&slots) {
                out.extend_from_slice(&entry.tag.to_le_bytes());
                out.extend_from_slice(&entry.field_type.to_le_bytes());
                out.extend_from_slice(&entry.count.to_le_bytes());
                out.extend_from_slice(slot);
            }
            next_slot = out.len();
            out.extend_from_slice(&0u32.to_le_bytes());
        }

        if self.cycle {
            out[next_slot..next_slot + 4].copy_from_slice(&last_ifd.to_le_bytes());
        }
        out
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        std::fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }
}

/// `count` bytes counting up from `start`, wrapping.
pub fn ramp(start: u8, count: usize) -> Vec<u8> {
    (0..count).map(|i| start.wrapping_add(i as u8)).collect()
}

/// Little-endian bytes of 16-bit samples.
pub fn u16_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// A minimal OME-XML document with one image.
pub fn ome_xml(
    order: &str,
    (size_z, size_c, size_t): (usize, usize, usize),
    (size_x, size_y): (u32, u32),
    tiff_data: &str,
) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <OME xmlns=\"http://www.openmicroscopy.org/Schemas/OME/2016-06\">\
         <Image ID=\"Image:0\" Name=\"synthetic\">\
         <Pixels ID=\"Pixels:0\" DimensionOrder=\"{order}\" Type=\"uint8\" \
         SizeX=\"{size_x}\" SizeY=\"{size_y}\" SizeZ=\"{size_z}\" SizeC=\"{size_c}\" SizeT=\"{size_t}\">\
         <Channel ID=\"Channel:0:0\" SamplesPerPixel=\"1\"/>\
         {tiff_data}\
         </Pixels></Image></OME>"
    )
}
