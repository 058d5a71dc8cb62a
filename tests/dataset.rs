//! Datasets assembled from several files: plates and file patterns.

use std::path::{Path, PathBuf};

use microscopy_io::dataset::{LogicalKey, PlateName};
use microscopy_io::error::MicroscopyError;
use microscopy_io::format::{FilePatternReader, FormatReader, PlateReader, Region};
use microscopy_io::store::MetadataValue;
use microscopy_io::wrapper::ImageReader;

mod util;

use util::{ramp, IfdPlan, TiffBuilder};

fn write_image(dir: &Path, name: &str, start: u8) -> PathBuf {
    TiffBuilder::new()
        .ifd(IfdPlan::gray(4, 3, 8, ramp(start, 12)))
        .write(&dir.join(name))
}

/// A 2x2 plate with two fields per well; field 2 of well B02 was never acquired.
fn write_plate(dir: &Path) -> Vec<PathBuf> {
    let names = [
        "A01_s1_w1.tif",
        "A01_s2_w1.tif",
        "A02_s1_w1.tif",
        "A02_s2_w1.tif",
        "B01_s1_w1.tif",
        "B01_s2_w1.tif",
        "B02_s1_w1.tif",
    ];
    names
        .iter()
        .enumerate()
        .map(|(i, name)| write_image(dir, name, 20 * i as u8))
        .collect()
}

#[test]
fn plate_with_a_missing_field() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_plate(dir.path());

    let mut reader = PlateReader::new();
    assert!(reader.is_this_type(&files[0]));
    reader.set_id(&files[0]).unwrap();

    let layout = reader.layout().unwrap();
    assert_eq!((layout.rows, layout.cols, layout.fields), (2, 2, 2));
    assert_eq!(reader.series_count().unwrap(), 8);
    assert_eq!(reader.well_of(7).unwrap(), (1, 1, 1));

    let missing = LogicalKey::Well {
        row: 1,
        col: 1,
        field: 1,
        z: 0,
        c: 0,
        t: 0,
    };
    assert!(layout.resources.get(&missing).is_none());
    assert!(layout.has_well(1, 1));

    let descriptor = reader.descriptor(7).unwrap().clone();
    let blank = reader.open_plane(7, 0, Region::full(&descriptor)).unwrap();
    assert_eq!(blank, vec![0; 12]);
    // Field 1 of the same well was acquired.
    assert_eq!(
        reader.open_plane(6, 0, Region::full(&descriptor)).unwrap(),
        ramp(120, 12)
    );

    assert!(reader.series_used_files(7).unwrap().is_empty());
    assert_eq!(reader.series_used_files(6).unwrap(), vec![files[6].clone()]);
    let used = reader.used_files(true).unwrap();
    assert_eq!(used.len(), 7);
    assert!(!used.iter().any(|path| path.ends_with("B02_s2_w1.tif")));
    assert!(reader.used_files(false).unwrap().is_empty());

    let metadata = reader.metadata();
    assert_eq!(
        metadata.series_value(7, "Well"),
        Some(&MetadataValue::from("B02"))
    );
    assert_eq!(
        metadata.series_value(7, "Acquired"),
        Some(&MetadataValue::Bool(false))
    );
    assert_eq!(
        metadata.series_value(6, "Acquired"),
        Some(&MetadataValue::Bool(true))
    );
}

#[test]
fn plates_disagreeing_on_geometry_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let seed = write_image(dir.path(), "A01_s1_w1.tif", 0);
    TiffBuilder::new()
        .ifd(IfdPlan::gray(5, 3, 8, ramp(0, 15)))
        .write(&dir.path().join("A02_s1_w1.tif"));

    let mut reader = PlateReader::new();
    assert!(reader.set_id(&seed).is_err());
    assert!(!reader.is_open());
}

#[test]
fn pattern_members_become_focal_planes() {
    let dir = tempfile::tempdir().unwrap();
    let z1 = write_image(dir.path(), "embryo_z1.tif", 0);
    let z2 = write_image(dir.path(), "embryo_z2.tif", 50);
    let z3 = write_image(dir.path(), "embryo_z3.tif", 100);
    // Different prefix, different axis: neither belongs to the series.
    write_image(dir.path(), "larva_z1.tif", 200);
    write_image(dir.path(), "embryo_t1.tif", 200);

    let mut reader = FilePatternReader::new();
    assert!(reader.is_this_type(&z2));
    reader.set_id(&z2).unwrap();

    let descriptor = reader.descriptor(0).unwrap().clone();
    assert_eq!(
        (descriptor.size_z, descriptor.size_c, descriptor.size_t),
        (3, 1, 1)
    );
    assert_eq!(descriptor.image_count, 3);
    assert_eq!(
        reader.open_plane(0, 2, Region::full(&descriptor)).unwrap(),
        ramp(100, 12)
    );
    assert_eq!(reader.used_files(true).unwrap(), vec![z1, z2, z3]);
    assert_eq!(
        reader.metadata().global("MemberCount"),
        Some(&MetadataValue::Integer(3))
    );
}

#[test]
fn lone_pattern_name_is_plain_tiff() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "single_c1.tif", 0);

    assert!(!FilePatternReader::new().is_this_type(&path));
    let mut dispatcher = ImageReader::new();
    dispatcher.set_id(&path).unwrap();
    assert_eq!(dispatcher.chosen_kind(), Some("tiff"));
}

#[test]
fn dispatcher_recognises_multi_file_datasets() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_plate(dir.path());
    let mut dispatcher = ImageReader::new();
    dispatcher.set_id(&files[3]).unwrap();
    assert_eq!(dispatcher.chosen_kind(), Some("plate"));
    assert_eq!(dispatcher.series_count().unwrap(), 8);

    let pattern_dir = tempfile::tempdir().unwrap();
    let c1 = write_image(pattern_dir.path(), "cells_c1.tif", 0);
    write_image(pattern_dir.path(), "cells_c2.tif", 9);
    dispatcher.set_id(&c1).unwrap();
    assert_eq!(dispatcher.chosen_kind(), Some("file-pattern"));
    assert_eq!(dispatcher.descriptor(0).unwrap().size_c, 2);
    assert_eq!(dispatcher.open_bytes(1).unwrap(), ramp(9, 12));
}

#[test]
fn implausible_plate_grid_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let stray = write_image(dir.path(), "ZZZZZZ99_s1_w1.tif", 0);

    let mut reader = PlateReader::new();
    assert!(matches!(
        reader.set_id(&stray),
        Err(MicroscopyError::UnsupportedFormat(_))
    ));
    assert!(!reader.is_open());
}

#[test]
fn overflowing_row_letters_are_not_plate_names() {
    assert_eq!(PlateName::parse("AAAAAAAAAAAAAAAA01_s1_w1.tif"), None);

    let dir = tempfile::tempdir().unwrap();
    let files = write_plate(dir.path());
    write_image(dir.path(), "AAAAAAAAAAAAAAAA01_s1_w1.tif", 0);

    let mut reader = PlateReader::new();
    reader.set_id(&files[0]).unwrap();
    assert_eq!(reader.series_count().unwrap(), 8);
    assert_eq!(reader.used_files(true).unwrap().len(), 7);
}

/// Cut a member back to its header and pixels, dropping the directory that follows them.
fn drop_directory(path: &Path) {
    std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .unwrap()
        .set_len(20)
        .unwrap();
}

#[test]
fn member_directories_are_parsed_once() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_plate(dir.path());
    let mut plate = PlateReader::new();
    plate.set_id(&files[0]).unwrap();
    drop_directory(&files[6]);
    let descriptor = plate.descriptor(6).unwrap().clone();
    assert_eq!(
        plate.open_plane(6, 0, Region::full(&descriptor)).unwrap(),
        ramp(120, 12)
    );

    let z1 = write_image(dir.path(), "embryo_z1.tif", 0);
    let z2 = write_image(dir.path(), "embryo_z2.tif", 50);
    let mut pattern = FilePatternReader::new();
    pattern.set_id(&z1).unwrap();
    drop_directory(&z2);
    let descriptor = pattern.descriptor(0).unwrap().clone();
    assert_eq!(
        pattern.open_plane(0, 1, Region::full(&descriptor)).unwrap(),
        ramp(50, 12)
    );

    // A fresh open has to walk the chain again and finds it gone.
    assert!(FilePatternReader::new().set_id(&z1).is_err());
}
