use bytes::Bytes;

use crate::decoder::DecoderRegistry;
use crate::error::MicroscopyResult;
use crate::predictor::{unpredict, PredictorInfo};
use crate::tiff::tags::{CompressionMethod, PhotometricInterpretation, Predictor};

/// The compressed bytes of one strip or tile, with what is needed to expand them.
///
/// A strip is a tile as wide as the image and `RowsPerStrip` tall.
#[derive(Debug)]
pub(crate) struct Chunk {
    /// Sample plane the chunk belongs to; always 0 for chunky data.
    pub sample: usize,
    /// Grid column.
    pub column: usize,
    /// Grid row.
    pub row: usize,
    pub info: PredictorInfo,
    pub predictor: Predictor,
    pub compression: CompressionMethod,
    pub photometric_interpretation: PhotometricInterpretation,
    pub jpeg_tables: Option<Bytes>,
    pub bytes: Bytes,
}

impl Chunk {
    /// Decompress and undo the predictor, leaving samples in file byte order.
    pub fn decode(&self, registry: &DecoderRegistry) -> MicroscopyResult<Vec<u8>> {
        let mut buffer = vec![0u8; self.info.chunk_bytes()];
        let decoder = registry.get(self.compression)?;
        decoder.decode_tile(
            self.bytes.clone(),
            &mut buffer,
            self.photometric_interpretation,
            self.jpeg_tables.as_deref(),
        )?;
        unpredict(self.predictor, &mut buffer, &self.info)?;
        tracing::trace!(
            sample = self.sample,
            column = self.column,
            row = self.row,
            bytes = buffer.len(),
            "decoded chunk"
        );
        Ok(buffer)
    }
}
