#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod reader;
pub mod dataset;
pub mod decoder;
mod decoding_result;
pub mod dimensions;
pub mod error;
pub mod format;
mod ifd;
pub mod metadata;
pub mod predictor;
pub mod reconcile;
pub mod series;
pub mod store;
pub mod tiff;
mod tiff_file;
mod tile;
pub mod wrapper;

pub use decoding_result::DecodingResult;
pub use ifd::ImageFileDirectory;
pub use tiff_file::{DEFAULT_PREFETCH, TIFF};

