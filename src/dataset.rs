//! Assembly of datasets spread over several files.
//!
//! A [`ResourceMap`] maps logical plane coordinates to the file and intra-file plane holding
//! them. It is built once when a reader opens a dataset and is read-only afterwards. Keys
//! without an entry are legal: a plate acquired over only some wells has no entry for the
//! rest, and such planes read as blank rather than failing.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dimensions::Axis;
use crate::error::{MicroscopyError, MicroscopyResult};

/// The logical coordinate of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogicalKey {
    /// A plane of a series.
    Series {
        /// Series index.
        series: usize,
        /// Z index.
        z: usize,
        /// Effective channel index.
        c: usize,
        /// T index.
        t: usize,
    },
    /// A plane of one field of a plate well.
    Well {
        /// Zero-based row.
        row: usize,
        /// Zero-based column.
        col: usize,
        /// Zero-based field.
        field: usize,
        /// Z index.
        z: usize,
        /// Effective channel index.
        c: usize,
        /// T index.
        t: usize,
    },
}

/// Where a plane is physically stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    /// File holding the plane.
    pub path: PathBuf,
    /// Plane (directory) index within the file.
    pub plane: usize,
}

impl Locator {
    /// Plane `plane` of the file at `path`.
    pub fn new(path: impl Into<PathBuf>, plane: usize) -> Self {
        Self {
            path: path.into(),
            plane,
        }
    }
}

/// Logical coordinate to physical plane mapping of an open dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceMap {
    entries: BTreeMap<LogicalKey, Locator>,
}

impl ResourceMap {
    /// Start building a map.
    pub fn builder() -> ResourceMapBuilder {
        ResourceMapBuilder::default()
    }

    /// The locator of `key`, or `None` if nothing was acquired there.
    pub fn get(&self, key: &LogicalKey) -> Option<&Locator> {
        self.entries.get(key)
    }

    /// Number of mapped planes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no plane is mapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&LogicalKey, &Locator)> {
        self.entries.iter()
    }

    /// Every distinct file referenced, in key order of first reference.
    pub fn used_files(&self) -> Vec<PathBuf> {
        self.used_files_where(|_| true)
    }

    /// Distinct files referenced by the keys accepted by `filter`.
    pub fn used_files_where(&self, filter: impl Fn(&LogicalKey) -> bool) -> Vec<PathBuf> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .filter(|(key, _)| filter(key))
            .filter(|(_, locator)| seen.insert(locator.path.clone()))
            .map(|(_, locator)| locator.path.clone())
            .collect()
    }
}

/// Accumulates entries of a [`ResourceMap`].
#[derive(Debug, Default)]
pub struct ResourceMapBuilder {
    entries: BTreeMap<LogicalKey, Locator>,
}

impl ResourceMapBuilder {
    /// Map `key` to `locator`. Mapping the same key twice is an error.
    pub fn insert(&mut self, key: LogicalKey, locator: Locator) -> MicroscopyResult<()> {
        match self.entries.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(locator);
                Ok(())
            }
            Entry::Occupied(entry) => Err(MicroscopyError::General(format!(
                "{key:?} is mapped to both {} and {}",
                entry.get().path.display(),
                locator.path.display()
            ))),
        }
    }

    /// Freeze the map.
    pub fn build(self) -> ResourceMap {
        ResourceMap {
            entries: self.entries,
        }
    }
}

fn strip_tiff_extension(name: &str) -> Option<&str> {
    let (stem, extension) = name.rsplit_once('.')?;
    if extension.eq_ignore_ascii_case("tif") || extension.eq_ignore_ascii_case("tiff") {
        Some(stem)
    } else {
        None
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

fn list_directory(dir: &Path) -> MicroscopyResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// A plate image name of the form `<Row><Col>_s<field>_w<channel>.tif`, e.g. `B03_s2_w1.tif`.
///
/// Rows are letters (`A` is row 0, `AA` follows `Z`), columns, fields and channels are
/// one-based in the name and zero-based here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlateName {
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column.
    pub col: usize,
    /// Zero-based field.
    pub field: usize,
    /// Zero-based channel.
    pub channel: usize,
}

impl PlateName {
    /// Parse a file name, returning `None` for anything not following the convention.
    pub fn parse(name: &str) -> Option<Self> {
        let stem = strip_tiff_extension(name)?;
        let mut parts = stem.split('_');
        let well = parts.next()?;
        let field = parts.next()?.strip_prefix('s')?;
        let channel = parts.next()?.strip_prefix('w')?;
        if parts.next().is_some() {
            return None;
        }

        let digits_at = well.find(|c: char| c.is_ascii_digit())?;
        let (row, col) = well.split_at(digits_at);
        if row.is_empty() || !row.chars().all(|c| c.is_ascii_uppercase()) {
            return None;
        }
        let row = row
            .bytes()
            .try_fold(0usize, |acc, b| {
                acc.checked_mul(26)?.checked_add((b - b'A') as usize + 1)
            })?
            - 1;

        Some(Self {
            row,
            col: one_based(col)?,
            field: one_based(field)?,
            channel: one_based(channel)?,
        })
    }

    /// The row label, `A` for row 0.
    pub fn row_label(row: usize) -> String {
        let mut label = Vec::new();
        let mut n = row + 1;
        while n > 0 {
            let digit = (n - 1) % 26;
            label.push(b'A' + digit as u8);
            n = (n - 1) / 26;
        }
        label.reverse();
        String::from_utf8_lossy(&label).into_owned()
    }
}

fn one_based(digits: &str) -> Option<usize> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok()?.checked_sub(1)
}

/// Largest plate grid accepted: 48 rows by 72 columns covers a 3456-well plate.
pub const MAX_PLATE_ROWS: usize = 48;
/// See [`MAX_PLATE_ROWS`].
pub const MAX_PLATE_COLS: usize = 72;
/// Most fields imaged per well.
pub const MAX_PLATE_FIELDS: usize = 1024;
/// Most channels per field.
pub const MAX_PLATE_CHANNELS: usize = 64;

/// The grid of a plate directory and its resource map.
#[derive(Debug, Clone)]
pub struct PlateLayout {
    /// Number of rows, up to the last row with an image.
    pub rows: usize,
    /// Number of columns, up to the last column with an image.
    pub cols: usize,
    /// Fields per well.
    pub fields: usize,
    /// Channels per field.
    pub channels: usize,
    /// Planes per channel file, along Z.
    pub size_z: usize,
    /// Map from [`LogicalKey::Well`] keys to files.
    pub resources: ResourceMap,
}

impl PlateLayout {
    /// Number of wells in the full grid.
    pub fn well_count(&self) -> usize {
        self.rows * self.cols
    }

    /// `(row, col, field)` of series `series`, enumerating the full grid row-major with fields
    /// fastest.
    pub fn series_position(&self, series: usize) -> Option<(usize, usize, usize)> {
        if self.fields == 0 || series >= self.well_count() * self.fields {
            return None;
        }
        let field = series % self.fields;
        let well = series / self.fields;
        Some((well / self.cols, well % self.cols, field))
    }

    /// `true` if at least one plane of the well was acquired.
    pub fn has_well(&self, row: usize, col: usize) -> bool {
        self.resources.iter().any(|(key, _)| {
            matches!(*key, LogicalKey::Well { row: r, col: c, .. } if r == row && c == col)
        })
    }
}

/// Scan the directory holding `seed` for plate images and map every acquired plane.
///
/// `planes_in` reports the number of planes in a file; they are taken as the Z stack of that
/// channel. Files of one plate must agree on it.
pub fn assemble_plate<F>(seed: &Path, mut planes_in: F) -> MicroscopyResult<PlateLayout>
where
    F: FnMut(&Path) -> MicroscopyResult<usize>,
{
    let dir = seed.parent().unwrap_or_else(|| Path::new("."));
    let named: Vec<(PlateName, PathBuf)> = list_directory(dir)?
        .into_iter()
        .filter_map(|path| Some((PlateName::parse(file_name(&path)?)?, path)))
        .collect();
    if named.is_empty() {
        return Err(MicroscopyError::UnsupportedFormat(format!(
            "no plate images next to {}",
            seed.display()
        )));
    }

    let max = |f: fn(&PlateName) -> usize| {
        named
            .iter()
            .map(|(n, _)| f(n))
            .max()
            .unwrap_or(0)
            .saturating_add(1)
    };
    let (rows, cols, fields, channels) = (
        max(|n| n.row),
        max(|n| n.col),
        max(|n| n.field),
        max(|n| n.channel),
    );
    if rows > MAX_PLATE_ROWS
        || cols > MAX_PLATE_COLS
        || fields > MAX_PLATE_FIELDS
        || channels > MAX_PLATE_CHANNELS
    {
        return Err(MicroscopyError::UnsupportedFormat(format!(
            "plate names next to {} span {rows} rows, {cols} columns, {fields} fields and \
             {channels} channels",
            seed.display()
        )));
    }

    let mut size_z = None;
    let mut builder = ResourceMap::builder();
    for (name, path) in &named {
        let planes = planes_in(path)?;
        match size_z {
            None => size_z = Some(planes),
            Some(expected) if expected != planes => {
                return Err(MicroscopyError::General(format!(
                    "{} holds {planes} planes, other plate images hold {expected}",
                    path.display()
                )));
            }
            Some(_) => {}
        }
        for z in 0..planes {
            let key = LogicalKey::Well {
                row: name.row,
                col: name.col,
                field: name.field,
                z,
                c: name.channel,
                t: 0,
            };
            builder.insert(key, Locator::new(path.clone(), z))?;
        }
    }

    let layout = PlateLayout {
        rows,
        cols,
        fields,
        channels,
        size_z: size_z.unwrap_or(1),
        resources: builder.build(),
    };
    tracing::debug!(
        rows = layout.rows,
        cols = layout.cols,
        fields = layout.fields,
        channels = layout.channels,
        files = named.len(),
        "assembled plate"
    );
    Ok(layout)
}

/// A multi-file series name of the form `<prefix>_<c|z|t><n>.tif`, e.g. `embryo_z07.tif`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternName {
    /// Everything before the last underscore.
    pub prefix: String,
    /// The axis varying across files.
    pub axis: Axis,
    /// The number after the axis letter.
    pub number: usize,
}

impl PatternName {
    /// Parse a file name, returning `None` for anything not following the convention.
    pub fn parse(name: &str) -> Option<Self> {
        let stem = strip_tiff_extension(name)?;
        let (prefix, suffix) = stem.rsplit_once('_')?;
        let mut chars = suffix.chars();
        let axis = match chars.next()?.to_ascii_lowercase() {
            'z' => Axis::Z,
            'c' => Axis::C,
            't' => Axis::T,
            _ => return None,
        };
        let digits = chars.as_str();
        if prefix.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            prefix: prefix.to_string(),
            axis,
            number: digits.parse().ok()?,
        })
    }
}

/// The members of a multi-file series and its resource map.
#[derive(Debug, Clone)]
pub struct PatternLayout {
    /// The axis varying across files.
    pub axis: Axis,
    /// Member files ordered by their number.
    pub files: Vec<PathBuf>,
    /// Map from [`LogicalKey::Series`] keys of series 0 to the first plane of each member.
    pub resources: ResourceMap,
}

/// Collect the siblings of `seed` sharing its prefix and axis letter.
///
/// Each member contributes one plane along the varying axis; `planes_in` is consulted so
/// members carrying more than one plane can be reported.
pub fn assemble_pattern<F>(seed: &Path, mut planes_in: F) -> MicroscopyResult<PatternLayout>
where
    F: FnMut(&Path) -> MicroscopyResult<usize>,
{
    let seed_name = file_name(seed)
        .and_then(PatternName::parse)
        .ok_or_else(|| {
            MicroscopyError::UnsupportedFormat(format!(
                "{} is not named <prefix>_<c|z|t><n>.tif",
                seed.display()
            ))
        })?;
    let dir = seed.parent().unwrap_or_else(|| Path::new("."));

    let mut members: Vec<(usize, PathBuf)> = list_directory(dir)?
        .into_iter()
        .filter_map(|path| {
            let name = PatternName::parse(file_name(&path)?)?;
            (name.prefix == seed_name.prefix && name.axis == seed_name.axis)
                .then_some((name.number, path))
        })
        .collect();
    members.sort();
    if let Some(pair) = members.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(MicroscopyError::General(format!(
            "{} and {} share the number {}",
            pair[0].1.display(),
            pair[1].1.display(),
            pair[0].0
        )));
    }

    let mut builder = ResourceMap::builder();
    for (index, (_, path)) in members.iter().enumerate() {
        let planes = planes_in(path)?;
        if planes > 1 {
            tracing::warn!(path = %path.display(), planes, "only the first plane of a member is used");
        }
        let (mut z, mut c, mut t) = (0, 0, 0);
        match seed_name.axis {
            Axis::Z => z = index,
            Axis::C => c = index,
            Axis::T => t = index,
        }
        builder.insert(
            LogicalKey::Series { series: 0, z, c, t },
            Locator::new(path.clone(), 0),
        )?;
    }

    Ok(PatternLayout {
        axis: seed_name.axis,
        files: members.into_iter().map(|(_, path)| path).collect(),
        resources: builder.build(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plate_names() {
        assert_eq!(
            PlateName::parse("B03_s2_w1.tif"),
            Some(PlateName {
                row: 1,
                col: 2,
                field: 1,
                channel: 0
            })
        );
        assert_eq!(PlateName::parse("AA1_s1_w1.TIFF").map(|n| n.row), Some(26));
        assert_eq!(PlateName::parse("B03_s0_w1.tif"), None);
        assert_eq!(PlateName::parse("b03_s1_w1.tif"), None);
        assert_eq!(PlateName::parse("B03_s1_w1.png"), None);
        assert_eq!(PlateName::parse("B03_s1.tif"), None);
        assert_eq!(PlateName::parse("AAAAAAAAAAAAAAAA01_s1_w1.tif"), None);
        assert_eq!(PlateName::row_label(0), "A");
        assert_eq!(PlateName::row_label(26), "AA");
    }

    #[test]
    fn pattern_names() {
        let name = PatternName::parse("embryo_z07.tif").unwrap();
        assert_eq!(name.prefix, "embryo");
        assert_eq!(name.axis, Axis::Z);
        assert_eq!(name.number, 7);
        assert_eq!(PatternName::parse("a_b_C2.tif").map(|n| n.prefix), Some("a_b".into()));
        assert_eq!(PatternName::parse("embryo_x07.tif"), None);
        assert_eq!(PatternName::parse("_z1.tif"), None);
        assert_eq!(PatternName::parse("embryo_z.tif"), None);
    }

    #[test]
    fn sparse_map_and_used_files() {
        let mut builder = ResourceMap::builder();
        let key = |field| LogicalKey::Well {
            row: 0,
            col: 0,
            field,
            z: 0,
            c: 0,
            t: 0,
        };
        builder.insert(key(0), Locator::new("A01_s1_w1.tif", 0)).unwrap();
        assert!(builder.insert(key(0), Locator::new("other.tif", 0)).is_err());
        let map = builder.build();

        assert!(map.get(&key(1)).is_none());
        assert_eq!(map.used_files(), vec![PathBuf::from("A01_s1_w1.tif")]);
        assert!(map
            .used_files_where(|k| matches!(k, LogicalKey::Well { field: 1, .. }))
            .is_empty());
    }

    #[test]
    fn series_positions_cover_the_grid() {
        let layout = PlateLayout {
            rows: 2,
            cols: 3,
            fields: 2,
            channels: 1,
            size_z: 1,
            resources: ResourceMap::default(),
        };
        assert_eq!(layout.series_position(0), Some((0, 0, 0)));
        assert_eq!(layout.series_position(1), Some((0, 0, 1)));
        assert_eq!(layout.series_position(2), Some((0, 1, 0)));
        assert_eq!(layout.series_position(7), Some((1, 0, 1)));
        assert_eq!(layout.series_position(12), None);
        assert!(!layout.has_well(0, 0));
    }
}
