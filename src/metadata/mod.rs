//! API for reading metadata out of a TIFF file.
//!
//! ### Reading all TIFF metadata
//!
//! We can use [`TiffMetadataReader::read_all_ifds`] to read all IFDs up front:
//!
//! ```no_run
//! use microscopy_io::metadata::{PrefetchBuffer, TiffMetadataReader};
//! use microscopy_io::reader::LocalFileReader;
//!
//! let reader = LocalFileReader::open("cells.tif").unwrap();
//!
//! // Serve the many small tag reads from the first 32 KiB of the file.
//! let prefetch_reader = PrefetchBuffer::new(reader, 32 * 1024).unwrap();
//!
//! let mut metadata_reader = TiffMetadataReader::try_open(&prefetch_reader).unwrap();
//! let ifds = metadata_reader.read_all_ifds(&prefetch_reader).unwrap();
//! println!("{} directories", ifds.len());
//! ```
//!
//! ### Caching/prefetching/buffering
//!
//! The underlying [`ImageFileDirectoryReader`] reads each tag individually, which makes many
//! small byte range requests to the [`MetadataFetch`] implementation. [`PrefetchBuffer`] fetches
//! the first `N` bytes of a file once and serves those requests from memory.

mod fetch;
mod reader;

pub use fetch::{MetadataFetch, PrefetchBuffer};
pub use reader::{ImageFileDirectoryReader, TiffMetadataReader};
