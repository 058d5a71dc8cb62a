//! Reversing the differencing predictors applied before compression.
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::MicroscopyResult;
use crate::reader::Endianness;
use crate::tiff::tags::Predictor;
use crate::tiff::{TiffError, TiffUnsupportedError};

/// Geometry of one decompressed strip or tile, as needed to undo prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorInfo {
    /// Byte order of the samples.
    pub endianness: Endianness,
    /// Width of the chunk in pixels, padding included.
    pub chunk_width: usize,
    /// Rows in the chunk.
    pub chunk_height: usize,
    /// Bytes of one sample.
    pub bytes_per_sample: usize,
    /// Samples stored per pixel in this chunk; 1 for planar data.
    pub samples_per_pixel: usize,
}

impl PredictorInfo {
    /// Bytes of one row of the chunk.
    pub fn row_bytes(&self) -> usize {
        self.chunk_width * self.samples_per_pixel * self.bytes_per_sample
    }

    /// Bytes of the whole decompressed chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.row_bytes() * self.chunk_height
    }
}

/// Undo `predictor` in place on a decompressed chunk.
pub fn unpredict(
    predictor: Predictor,
    buffer: &mut [u8],
    info: &PredictorInfo,
) -> MicroscopyResult<()> {
    match predictor {
        Predictor::None => Ok(()),
        Predictor::Horizontal => {
            unpredict_hdiff(buffer, info);
            Ok(())
        }
        Predictor::FloatingPoint => Err(TiffError::UnsupportedError(
            TiffUnsupportedError::UnsupportedPredictor(predictor),
        )
        .into()),
    }
}

/// Reverse horizontal differencing, row by row, keeping the file byte order.
pub fn unpredict_hdiff(buffer: &mut [u8], info: &PredictorInfo) {
    let row_bytes = info.row_bytes();
    if row_bytes == 0 {
        return;
    }
    for row in buffer.chunks_mut(row_bytes) {
        match info.endianness {
            Endianness::LittleEndian => {
                rev_hpredict_nsamp::<LittleEndian>(row, info.bytes_per_sample, info.samples_per_pixel)
            }
            Endianness::BigEndian => {
                rev_hpredict_nsamp::<BigEndian>(row, info.bytes_per_sample, info.samples_per_pixel)
            }
        }
    }
}

/// Each sample is stored as the difference to the same sample of the previous pixel.
fn rev_hpredict_nsamp<B: ByteOrder>(row: &mut [u8], bytes_per_sample: usize, samples: usize) {
    let stride = bytes_per_sample * samples;
    match bytes_per_sample {
        1 => {
            for i in samples..row.len() {
                row[i] = row[i].wrapping_add(row[i - samples]);
            }
        }
        2 => {
            for i in (stride..row.len().saturating_sub(1)).step_by(2) {
                let v = B::read_u16(&row[i..]);
                let p = B::read_u16(&row[i - stride..]);
                B::write_u16(&mut row[i..], v.wrapping_add(p));
            }
        }
        4 => {
            for i in (stride..row.len().saturating_sub(3)).step_by(4) {
                let v = B::read_u32(&row[i..]);
                let p = B::read_u32(&row[i - stride..]);
                B::write_u32(&mut row[i..], v.wrapping_add(p));
            }
        }
        8 => {
            for i in (stride..row.len().saturating_sub(7)).step_by(8) {
                let v = B::read_u64(&row[i..]);
                let p = B::read_u64(&row[i - stride..]);
                B::write_u64(&mut row[i..], v.wrapping_add(p));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn info(endianness: Endianness, bytes_per_sample: usize, samples: usize) -> PredictorInfo {
        PredictorInfo {
            endianness,
            chunk_width: 3,
            chunk_height: 2,
            bytes_per_sample,
            samples_per_pixel: samples,
        }
    }

    #[test]
    fn hpredict_u8_rgb() {
        let mut buf = vec![
            10, 20, 30, 1, 1, 1, 2, 2, 2, // row 0
            5, 5, 5, 0, 1, 255, 0, 0, 0, // row 1
        ];
        unpredict_hdiff(&mut buf, &info(Endianness::LittleEndian, 1, 3));
        assert_eq!(
            buf,
            vec![10, 20, 30, 11, 21, 31, 13, 23, 33, 5, 5, 5, 5, 6, 4, 5, 6, 4]
        );
    }

    #[test]
    fn hpredict_u16_keeps_byte_order() {
        let values = [1000u16, 5, 65535, 0, 2, 3];
        for endianness in [Endianness::LittleEndian, Endianness::BigEndian] {
            let mut buf = vec![0u8; 12];
            for (i, v) in values.iter().enumerate() {
                match endianness {
                    Endianness::LittleEndian => LittleEndian::write_u16(&mut buf[i * 2..], *v),
                    Endianness::BigEndian => BigEndian::write_u16(&mut buf[i * 2..], *v),
                }
            }
            unpredict_hdiff(&mut buf, &info(endianness, 2, 1));
            let read = |i: usize| match endianness {
                Endianness::LittleEndian => LittleEndian::read_u16(&buf[i * 2..]),
                Endianness::BigEndian => BigEndian::read_u16(&buf[i * 2..]),
            };
            assert_eq!([read(0), read(1), read(2)], [1000, 1005, 1004]);
            assert_eq!([read(3), read(4), read(5)], [0, 2, 5]);
        }
    }

    #[test]
    fn floating_point_predictor_is_unsupported() {
        let mut buf = vec![0u8; 24];
        assert!(unpredict(
            Predictor::FloatingPoint,
            &mut buf,
            &info(Endianness::LittleEndian, 4, 1)
        )
        .is_err());
    }
}
