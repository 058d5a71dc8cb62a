//! Reader chains over real files: wrappers, unwrapping, duplication and listeners.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use microscopy_io::dimensions::DimensionOrder;
use microscopy_io::format::{FormatReader, ReaderEvent, ReaderListener, Region, TiffReader};
use microscopy_io::wrapper::{
    duplicate, unwrap, unwrap_mut, ChannelSeparator, DimensionSwapper, ImageReader,
    ReaderRegistry,
};

mod util;

use util::{ramp, IfdPlan, TiffBuilder};

/// Two 2x2 interleaved RGB timepoints.
fn write_rgb(dir: &Path) -> PathBuf {
    TiffBuilder::new()
        .ifd(IfdPlan::rgb(2, 2, ramp(0, 12)))
        .ifd(IfdPlan::rgb(2, 2, ramp(100, 12)))
        .write(&dir.join("rgb.tif"))
}

/// Three 4x3 grayscale planes.
fn write_gray(dir: &Path) -> PathBuf {
    let mut builder = TiffBuilder::new();
    for plane in 0..3 {
        builder = builder.ifd(IfdPlan::gray(4, 3, 8, ramp(40 * plane, 12)));
    }
    builder.write(&dir.join("gray.tif"))
}

#[derive(Debug, Default)]
struct Recorder(Mutex<Vec<String>>);

impl ReaderListener for Recorder {
    fn reader_event(&self, event: &ReaderEvent<'_>) {
        let line = match event {
            ReaderEvent::Opening { kind, .. } => format!("opening {kind}"),
            ReaderEvent::Opened { kind, series_count } => format!("opened {kind} {series_count}"),
            ReaderEvent::Closed { kind } => format!("closed {kind}"),
        };
        self.0.lock().unwrap().push(line);
    }
}

impl Recorder {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

#[test]
fn channel_separator_splits_packed_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rgb(dir.path());

    let mut reader = ChannelSeparator::new(Box::new(TiffReader::new()));
    reader.set_id(&path).unwrap();

    let packed = unwrap(&reader, Some(TiffReader::KIND))
        .unwrap()
        .descriptor(0)
        .unwrap()
        .clone();
    assert!(packed.rgb);
    assert_eq!(packed.image_count, 2);

    let split = reader.descriptor(0).unwrap().clone();
    assert!(!split.rgb);
    assert_eq!((split.size_c, split.size_t), (3, 2));
    assert_eq!(split.image_count, 6);
    assert_eq!(split.plane_size(2, 2), 4);

    // XYZCT with Z=1, C=3: plane 4 is c=1 of t=1, the green samples of the second directory.
    let green = reader.open_plane(0, 4, Region::full(&split)).unwrap();
    assert_eq!(green, vec![101, 104, 107, 110]);
    let red_corner = reader.open_plane(0, 0, Region::new(1, 1, 1, 1)).unwrap();
    assert_eq!(red_corner, vec![9]);
}

#[test]
fn dimension_swapper_relabels_axes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gray(dir.path());

    let mut reader = DimensionSwapper::new(Box::new(TiffReader::new()));
    reader.set_id(&path).unwrap();
    let before = reader.descriptor(0).unwrap().clone();
    assert_eq!((before.size_z, before.size_t), (1, 3));

    reader.swap_dimensions(0, DimensionOrder::XYTCZ).unwrap();
    let after = reader.descriptor(0).unwrap().clone();
    assert_eq!(after.dimension_order, DimensionOrder::XYTCZ);
    assert_eq!((after.size_z, after.size_c, after.size_t), (3, 1, 1));
    assert_eq!(after.image_count, 3);

    let address = reader.zct(0, 2).unwrap();
    assert_eq!((address.z, address.c, address.t), (2, 0, 0));
    assert_eq!(
        reader.open_plane(0, 2, Region::full(&after)).unwrap(),
        ramp(80, 12)
    );
    assert!(reader.swap_dimensions(1, DimensionOrder::XYZCT).is_err());
}

#[test]
fn swapping_before_open_is_an_error() {
    let mut reader = DimensionSwapper::new(Box::new(TiffReader::new()));
    assert!(reader.swap_dimensions(0, DimensionOrder::XYCZT).is_err());
}

#[test]
fn duplicates_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gray(dir.path());
    let registry = ReaderRegistry::default();

    let mut original: Box<dyn FormatReader> =
        Box::new(ChannelSeparator::new(Box::new(TiffReader::new())));
    original.options_mut().filter_metadata = true;
    original.set_id(&path).unwrap();

    let mut copy = duplicate(original.as_ref(), &registry, None).unwrap();
    assert!(!copy.is_open());
    assert!(copy.options().filter_metadata);
    assert_eq!(copy.kind(), ChannelSeparator::KIND);

    copy.options_mut().normalize = true;
    assert!(!original.options().normalize);

    copy.set_id(&path).unwrap();
    assert_eq!(copy.open_bytes(1).unwrap(), ramp(40, 12));
    copy.close().unwrap();

    assert!(!copy.is_open());
    assert!(original.is_open());
    assert_eq!(original.open_bytes(2).unwrap(), ramp(80, 12));
}

#[test]
fn unwrap_finds_the_chosen_reader() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gray(dir.path());

    let mut chain: Box<dyn FormatReader> =
        Box::new(DimensionSwapper::new(Box::new(ImageReader::new())));
    chain.set_id(&path).unwrap();

    assert_eq!(
        unwrap(chain.as_ref(), None).map(|reader| reader.kind()),
        Some(TiffReader::KIND)
    );
    let tiff = unwrap(chain.as_ref(), Some(TiffReader::KIND))
        .and_then(|reader| reader.as_any().downcast_ref::<TiffReader>())
        .unwrap();
    assert_eq!(tiff.series_ifds(0).unwrap(), &[0, 1, 2]);

    let dispatcher = unwrap_mut(chain.as_mut(), Some(ImageReader::KIND)).unwrap();
    dispatcher.options_mut().normalize = true;
    assert!(chain.options().normalize);

    // A duplicate gets a fresh dispatcher, not the reader it had picked.
    let registry = ReaderRegistry::default();
    let copy = duplicate(chain.as_ref(), &registry, None).unwrap();
    assert_eq!(
        copy.inner().map(|reader| reader.kind()),
        Some(ImageReader::KIND)
    );
    assert!(copy.options().normalize);
    let substituted = duplicate(chain.as_ref(), &registry, Some(TiffReader::KIND)).unwrap();
    assert_eq!(
        unwrap(substituted.as_ref(), None).map(|reader| reader.kind()),
        Some(TiffReader::KIND)
    );
}

#[test]
fn listeners_hear_open_and_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gray(dir.path());
    let recorder = Arc::new(Recorder::default());

    let mut reader = TiffReader::new();
    reader.options_mut().add_listener(recorder.clone());
    reader.set_id(&path).unwrap();
    reader.close().unwrap();
    reader.close().unwrap();
    assert_eq!(
        recorder.take(),
        vec!["opening tiff", "opened tiff 1", "closed tiff"]
    );

    // Listeners travel with the options into a duplicate.
    reader.set_id(&path).unwrap();
    recorder.take();
    let mut copy = duplicate(&reader, &ReaderRegistry::default(), None).unwrap();
    copy.set_id(&path).unwrap();
    assert_eq!(recorder.take(), vec!["opening tiff", "opened tiff 1"]);
    assert!(reader.is_open());
}
