//! TIFF-family vocabulary: tag ids, field types, typed values and the TIFF error split.

mod error;
mod ifd;
pub mod tags;

pub use error::{TiffError, TiffFormatError, TiffResult, TiffUnsupportedError, UsageError};
pub use ifd::Value;
