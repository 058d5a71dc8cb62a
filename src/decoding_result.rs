use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{MicroscopyError, MicroscopyResult};
use crate::series::PixelType;

/// Result of a decoding process
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DecodingResult {
    /// A vector of unsigned bytes
    U8(Vec<u8>),
    /// A vector of unsigned words
    U16(Vec<u16>),
    /// A vector of 32 bit unsigned ints
    U32(Vec<u32>),
    /// A vector of 32 bit IEEE floats
    F32(Vec<f32>),
    /// A vector of 64 bit IEEE floats
    F64(Vec<f64>),
    /// A vector of 8 bit signed ints
    I8(Vec<i8>),
    /// A vector of 16 bit signed ints
    I16(Vec<i16>),
    /// A vector of 32 bit signed ints
    I32(Vec<i32>),
}

impl DecodingResult {
    /// Interpret raw plane bytes as samples of `pixel_type` in the given byte order.
    pub fn from_bytes(
        bytes: &[u8],
        pixel_type: PixelType,
        little_endian: bool,
    ) -> MicroscopyResult<Self> {
        let sample_bytes = pixel_type.bytes_per_pixel();
        if bytes.len() % sample_bytes != 0 {
            return Err(MicroscopyError::General(format!(
                "{} bytes is not a whole number of {pixel_type} samples",
                bytes.len()
            )));
        }
        Ok(if little_endian {
            typed::<LittleEndian>(bytes, pixel_type)
        } else {
            typed::<BigEndian>(bytes, pixel_type)
        })
    }

    /// The sample type held.
    pub fn pixel_type(&self) -> PixelType {
        match self {
            DecodingResult::U8(_) => PixelType::Uint8,
            DecodingResult::U16(_) => PixelType::Uint16,
            DecodingResult::U32(_) => PixelType::Uint32,
            DecodingResult::F32(_) => PixelType::Float,
            DecodingResult::F64(_) => PixelType::Double,
            DecodingResult::I8(_) => PixelType::Int8,
            DecodingResult::I16(_) => PixelType::Int16,
            DecodingResult::I32(_) => PixelType::Int32,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            DecodingResult::U8(v) => v.len(),
            DecodingResult::U16(v) => v.len(),
            DecodingResult::U32(v) => v.len(),
            DecodingResult::F32(v) => v.len(),
            DecodingResult::F64(v) => v.len(),
            DecodingResult::I8(v) => v.len(),
            DecodingResult::I16(v) => v.len(),
            DecodingResult::I32(v) => v.len(),
        }
    }

    /// `true` if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the samples back into bytes of the given byte order.
    pub fn to_bytes(&self, little_endian: bool) -> Vec<u8> {
        if little_endian {
            untyped::<LittleEndian>(self)
        } else {
            untyped::<BigEndian>(self)
        }
    }
}

fn typed<B: ByteOrder>(bytes: &[u8], pixel_type: PixelType) -> DecodingResult {
    let n = bytes.len() / pixel_type.bytes_per_pixel();
    match pixel_type {
        PixelType::Uint8 => DecodingResult::U8(bytes.to_vec()),
        PixelType::Int8 => DecodingResult::I8(bytes.iter().map(|b| *b as i8).collect()),
        PixelType::Uint16 => {
            let mut v = vec![0; n];
            B::read_u16_into(bytes, &mut v);
            DecodingResult::U16(v)
        }
        PixelType::Int16 => {
            let mut v = vec![0; n];
            B::read_i16_into(bytes, &mut v);
            DecodingResult::I16(v)
        }
        PixelType::Uint32 => {
            let mut v = vec![0; n];
            B::read_u32_into(bytes, &mut v);
            DecodingResult::U32(v)
        }
        PixelType::Int32 => {
            let mut v = vec![0; n];
            B::read_i32_into(bytes, &mut v);
            DecodingResult::I32(v)
        }
        PixelType::Float => {
            let mut v = vec![0.0; n];
            B::read_f32_into(bytes, &mut v);
            DecodingResult::F32(v)
        }
        PixelType::Double => {
            let mut v = vec![0.0; n];
            B::read_f64_into(bytes, &mut v);
            DecodingResult::F64(v)
        }
    }
}

fn untyped<B: ByteOrder>(result: &DecodingResult) -> Vec<u8> {
    let mut out = vec![0u8; result.len() * result.pixel_type().bytes_per_pixel()];
    match result {
        DecodingResult::U8(v) => out.copy_from_slice(v),
        DecodingResult::I8(v) => {
            for (dst, src) in out.iter_mut().zip(v) {
                *dst = *src as u8;
            }
        }
        DecodingResult::U16(v) => B::write_u16_into(v, &mut out),
        DecodingResult::I16(v) => B::write_i16_into(v, &mut out),
        DecodingResult::U32(v) => B::write_u32_into(v, &mut out),
        DecodingResult::I32(v) => B::write_i32_into(v, &mut out),
        DecodingResult::F32(v) => B::write_f32_into(v, &mut out),
        DecodingResult::F64(v) => B::write_f64_into(v, &mut out),
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn typed_views_honor_byte_order() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(
            DecodingResult::from_bytes(&bytes, PixelType::Uint16, true).unwrap(),
            DecodingResult::U16(vec![0x0201, 0x0403])
        );
        assert_eq!(
            DecodingResult::from_bytes(&bytes, PixelType::Uint16, false).unwrap(),
            DecodingResult::U16(vec![0x0102, 0x0304])
        );
        assert_eq!(
            DecodingResult::from_bytes(&[0xFF], PixelType::Int8, true).unwrap(),
            DecodingResult::I8(vec![-1])
        );
        assert!(DecodingResult::from_bytes(&bytes[..3], PixelType::Uint16, true).is_err());
    }

    #[test]
    fn floats_back_to_bytes() {
        let result = DecodingResult::F32(vec![0.5, -2.0]);
        let bytes = result.to_bytes(false);
        assert_eq!(
            DecodingResult::from_bytes(&bytes, PixelType::Float, false).unwrap(),
            result
        );
    }
}
