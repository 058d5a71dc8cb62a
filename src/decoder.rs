//! Decoders for different TIFF compression methods.

use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{Cursor, Read};
use std::sync::OnceLock;

use bytes::Bytes;
use flate2::bufread::ZlibDecoder;

use crate::error::{MicroscopyError, MicroscopyResult};
use crate::tiff::tags::{CompressionMethod, PhotometricInterpretation};
use crate::tiff::{TiffError, TiffFormatError, TiffUnsupportedError};

static GLOBAL_REGISTRY: OnceLock<DecoderRegistry> = OnceLock::new();

/// A registry of decoders.
///
/// This allows end users to register their own decoders, for custom compression methods, or
/// override the default decoder implementations.
///
/// One registry can be installed process-wide with [`install_global`][Self::install_global]
/// before first use; readers fall back to [`global`][Self::global], which is read-only once
/// initialized.
#[derive(Debug)]
pub struct DecoderRegistry(HashMap<CompressionMethod, Box<dyn Decoder>>);

impl DecoderRegistry {
    /// Create a new decoder registry with no decoders registered
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Register `decoder` for `method`, replacing any previous entry.
    pub fn register(&mut self, method: CompressionMethod, decoder: Box<dyn Decoder>) {
        self.0.insert(method, decoder);
    }

    /// Look up the decoder for `method`.
    ///
    /// Methods without a decoder are reported as unsupported, carrying the compression id.
    pub fn get(&self, method: CompressionMethod) -> MicroscopyResult<&dyn Decoder> {
        self.0.get(&method).map(|d| d.as_ref()).ok_or_else(|| {
            TiffError::UnsupportedError(TiffUnsupportedError::UnsupportedCompressionMethod(method))
                .into()
        })
    }

    /// Install `self` as the process-wide registry.
    ///
    /// Fails if a registry was already installed or the default one was already used.
    pub fn install_global(self) -> MicroscopyResult<()> {
        GLOBAL_REGISTRY.set(self).map_err(|_| {
            MicroscopyError::General("a global decoder registry is already installed".to_string())
        })
    }

    /// The process-wide registry, initialized with the defaults if none was installed.
    pub fn global() -> &'static DecoderRegistry {
        GLOBAL_REGISTRY.get_or_init(DecoderRegistry::default)
    }
}

impl AsRef<HashMap<CompressionMethod, Box<dyn Decoder>>> for DecoderRegistry {
    fn as_ref(&self) -> &HashMap<CompressionMethod, Box<dyn Decoder>> {
        &self.0
    }
}

impl AsMut<HashMap<CompressionMethod, Box<dyn Decoder>>> for DecoderRegistry {
    fn as_mut(&mut self) -> &mut HashMap<CompressionMethod, Box<dyn Decoder>> {
        &mut self.0
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        let mut registry = HashMap::with_capacity(6);
        registry.insert(CompressionMethod::None, Box::new(UncompressedDecoder) as _);
        registry.insert(CompressionMethod::Deflate, Box::new(DeflateDecoder) as _);
        registry.insert(CompressionMethod::OldDeflate, Box::new(DeflateDecoder) as _);
        registry.insert(CompressionMethod::LZW, Box::new(LZWDecoder) as _);
        registry.insert(CompressionMethod::ModernJPEG, Box::new(JPEGDecoder) as _);
        registry.insert(CompressionMethod::PackBits, Box::new(PackBitsDecoder) as _);
        Self(registry)
    }
}

/// A trait to decode a TIFF tile.
pub trait Decoder: Debug + Send + Sync {
    /// Decode a TIFF tile, filling `result_buffer` completely.
    fn decode_tile(
        &self,
        compressed_buffer: Bytes,
        result_buffer: &mut [u8],
        photometric_interpretation: PhotometricInterpretation,
        jpeg_tables: Option<&[u8]>,
    ) -> MicroscopyResult<()>;
}

fn short_output(actual_bytes: usize, required_bytes: usize) -> MicroscopyError {
    TiffError::FormatError(TiffFormatError::UnexpectedCompressedData {
        actual_bytes,
        required_bytes,
    })
    .into()
}

/// A decoder for the Deflate compression method.
#[derive(Debug, Clone)]
pub struct DeflateDecoder;

impl Decoder for DeflateDecoder {
    fn decode_tile(
        &self,
        compressed_buffer: Bytes,
        result_buffer: &mut [u8],
        _photometric_interpretation: PhotometricInterpretation,
        _jpeg_tables: Option<&[u8]>,
    ) -> MicroscopyResult<()> {
        let mut decoder = ZlibDecoder::new(Cursor::new(compressed_buffer));
        decoder.read_exact(result_buffer)?;
        Ok(())
    }
}

/// A decoder for the JPEG compression method.
#[derive(Debug, Clone)]
pub struct JPEGDecoder;

impl Decoder for JPEGDecoder {
    fn decode_tile(
        &self,
        compressed_buffer: Bytes,
        result_buffer: &mut [u8],
        photometric_interpretation: PhotometricInterpretation,
        jpeg_tables: Option<&[u8]>,
    ) -> MicroscopyResult<()> {
        decode_modern_jpeg(
            compressed_buffer,
            result_buffer,
            photometric_interpretation,
            jpeg_tables,
        )
    }
}

/// A decoder for the LZW compression method.
#[derive(Debug, Clone)]
pub struct LZWDecoder;

impl Decoder for LZWDecoder {
    fn decode_tile(
        &self,
        compressed_buffer: Bytes,
        result_buffer: &mut [u8],
        _photometric_interpretation: PhotometricInterpretation,
        _jpeg_tables: Option<&[u8]>,
    ) -> MicroscopyResult<()> {
        let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
        let mut input = &compressed_buffer[..];
        let mut written = 0;
        while written < result_buffer.len() {
            let result = decoder.decode_bytes(input, &mut result_buffer[written..]);
            written += result.consumed_out;
            input = &input[result.consumed_in..];
            match result.status {
                Err(e) => return Err(MicroscopyError::External(Box::new(e))),
                Ok(weezl::LzwStatus::Done) | Ok(weezl::LzwStatus::NoProgress) => break,
                Ok(weezl::LzwStatus::Ok) => {
                    if result.consumed_in == 0 && result.consumed_out == 0 {
                        break;
                    }
                }
            }
        }
        if written < result_buffer.len() {
            return Err(short_output(written, result_buffer.len()));
        }
        Ok(())
    }
}

/// A decoder for PackBits run-length encoded data.
#[derive(Debug, Clone)]
pub struct PackBitsDecoder;

impl Decoder for PackBitsDecoder {
    fn decode_tile(
        &self,
        compressed_buffer: Bytes,
        result_buffer: &mut [u8],
        _photometric_interpretation: PhotometricInterpretation,
        _jpeg_tables: Option<&[u8]>,
    ) -> MicroscopyResult<()> {
        let mut input = compressed_buffer.iter().copied();
        let mut written = 0;
        while written < result_buffer.len() {
            let Some(header) = input.next() else { break };
            let header = header as i8;
            if header >= 0 {
                // Copy the next header + 1 bytes literally
                for _ in 0..=header as usize {
                    let Some(byte) = input.next() else { break };
                    if written == result_buffer.len() {
                        break;
                    }
                    result_buffer[written] = byte;
                    written += 1;
                }
            } else if header != -128 {
                // Repeat the next byte 1 - header times
                let Some(byte) = input.next() else { break };
                let run = (1 - header as isize) as usize;
                let end = (written + run).min(result_buffer.len());
                result_buffer[written..end].fill(byte);
                written = end;
            }
        }
        if written < result_buffer.len() {
            return Err(short_output(written, result_buffer.len()));
        }
        Ok(())
    }
}

/// A decoder for uncompressed data.
#[derive(Debug, Clone)]
pub struct UncompressedDecoder;

impl Decoder for UncompressedDecoder {
    fn decode_tile(
        &self,
        compressed_buffer: Bytes,
        result_buffer: &mut [u8],
        _photometric_interpretation: PhotometricInterpretation,
        _jpeg_tables: Option<&[u8]>,
    ) -> MicroscopyResult<()> {
        // Strips may carry trailing padding
        if compressed_buffer.len() < result_buffer.len() {
            return Err(short_output(compressed_buffer.len(), result_buffer.len()));
        }
        result_buffer.copy_from_slice(&compressed_buffer[..result_buffer.len()]);
        Ok(())
    }
}

fn decode_modern_jpeg(
    compressed_buffer: Bytes,
    result_buffer: &mut [u8],
    photometric_interpretation: PhotometricInterpretation,
    jpeg_tables: Option<&[u8]>,
) -> MicroscopyResult<()> {
    // JPEG compression in TIFF allows saving quantization and/or huffman tables in one central
    // location. These `jpeg_tables` are simply prepended to the remaining jpeg image data. The
    // tables end with an EOI marker and the image data starts with an SOI marker; both have to go
    // for the decoder to see one stream.
    let reader = Cursor::new(compressed_buffer);

    let jpeg_reader = match jpeg_tables {
        Some(jpeg_tables) if jpeg_tables.len() >= 2 => {
            let mut reader = reader;
            reader.read_exact(&mut [0; 2])?;

            Box::new(Cursor::new(&jpeg_tables[..jpeg_tables.len() - 2]).chain(reader))
                as Box<dyn Read>
        }
        _ => Box::new(reader),
    };

    let mut decoder = jpeg::Decoder::new(jpeg_reader);

    match photometric_interpretation {
        PhotometricInterpretation::RGB => decoder.set_color_transform(jpeg::ColorTransform::RGB),
        PhotometricInterpretation::WhiteIsZero
        | PhotometricInterpretation::BlackIsZero
        | PhotometricInterpretation::TransparencyMask => {
            decoder.set_color_transform(jpeg::ColorTransform::None)
        }
        PhotometricInterpretation::CMYK => decoder.set_color_transform(jpeg::ColorTransform::CMYK),
        PhotometricInterpretation::YCbCr => {
            decoder.set_color_transform(jpeg::ColorTransform::YCbCr)
        }
        photometric_interpretation => {
            return Err(TiffError::UnsupportedError(
                TiffUnsupportedError::UnsupportedInterpretation(photometric_interpretation),
            )
            .into());
        }
    }

    let data = decoder.decode()?;
    if data.len() < result_buffer.len() {
        return Err(short_output(data.len(), result_buffer.len()));
    }
    // jpeg decoder doesn't support decoding into a buffer -> copy
    let len = result_buffer.len();
    result_buffer.copy_from_slice(&data[..len]);
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;

    fn decode(method: CompressionMethod, data: Vec<u8>, out_len: usize) -> MicroscopyResult<Vec<u8>> {
        let registry = DecoderRegistry::default();
        let mut out = vec![0u8; out_len];
        registry.get(method)?.decode_tile(
            data.into(),
            &mut out,
            PhotometricInterpretation::BlackIsZero,
            None,
        )?;
        Ok(out)
    }

    #[test]
    fn packbits() {
        // PackBits sample from TIFF 6.0, section 9
        let encoded = vec![
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ];
        let expected = vec![
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(
            decode(CompressionMethod::PackBits, encoded, expected.len()).unwrap(),
            expected
        );
    }

    #[test]
    fn deflate() {
        let raw: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let encoded = encoder.finish().unwrap();
        assert_eq!(decode(CompressionMethod::Deflate, encoded.clone(), 1000).unwrap(), raw);
        assert_eq!(decode(CompressionMethod::OldDeflate, encoded, 1000).unwrap(), raw);
    }

    #[test]
    fn uncompressed_too_short() {
        assert!(matches!(
            decode(CompressionMethod::None, vec![1, 2, 3], 4),
            Err(MicroscopyError::InternalTIFFError(TiffError::FormatError(
                TiffFormatError::UnexpectedCompressedData {
                    actual_bytes: 3,
                    required_bytes: 4
                }
            )))
        ));
        assert_eq!(decode(CompressionMethod::None, vec![1, 2, 3, 4, 0], 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn unknown_method_is_unsupported() {
        let err = decode(CompressionMethod::Unknown(50_000), vec![0], 1).unwrap_err();
        assert!(matches!(
            err,
            MicroscopyError::InternalTIFFError(TiffError::UnsupportedError(
                TiffUnsupportedError::UnsupportedCompressionMethod(CompressionMethod::Unknown(
                    50_000
                ))
            ))
        ));
    }

    #[test]
    fn registry_overrides() {
        let mut registry = DecoderRegistry::new();
        assert!(registry.get(CompressionMethod::None).is_err());
        registry.register(CompressionMethod::None, Box::new(UncompressedDecoder));
        assert!(registry.get(CompressionMethod::None).is_ok());
        assert!(DecoderRegistry::global().get(CompressionMethod::LZW).is_ok());
    }

    #[test]
    fn global_registry_is_write_once() {
        DecoderRegistry::global();
        assert!(DecoderRegistry::new().install_global().is_err());
    }
}
