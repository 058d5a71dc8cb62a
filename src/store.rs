//! The metadata sink readers write original key/value metadata into.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};

/// Longest text value kept when filtering is on.
pub const MAX_FILTERED_LEN: usize = 256;

/// One metadata value.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl MetadataValue {
    /// The text, for text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// `true` if the value survives metadata filtering: text must be printable and at most
    /// [`MAX_FILTERED_LEN`] characters long.
    pub fn is_printable(&self) -> bool {
        match self {
            MetadataValue::Text(s) => {
                s.chars().count() <= MAX_FILTERED_LEN
                    && s.chars().all(|c| !c.is_control() || c.is_whitespace())
            }
            _ => true,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::Integer(v) => write!(f, "{v}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        MetadataValue::Integer(value as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// A sink accepting metadata at dataset, series and plane scope.
pub trait MetadataStore: Debug + Send {
    /// Record a dataset-wide value.
    fn set_global(&mut self, key: &str, value: MetadataValue);

    /// Record a value for one series.
    fn set_series_value(&mut self, series: usize, key: &str, value: MetadataValue);

    /// Record a value for one plane of a series.
    fn set_plane_value(&mut self, series: usize, plane: usize, key: &str, value: MetadataValue);
}

/// In-memory [`MetadataStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    filter: bool,
    global: BTreeMap<String, MetadataValue>,
    series: BTreeMap<(usize, String), MetadataValue>,
    planes: BTreeMap<(usize, usize, String), MetadataValue>,
}

impl MetadataTable {
    /// An empty table; with `filter` set, values failing [`MetadataValue::is_printable`] are
    /// dropped on insertion.
    pub fn new(filter: bool) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    fn keep(&self, key: &str, value: &MetadataValue) -> bool {
        if self.filter && (key.is_empty() || !value.is_printable()) {
            tracing::trace!(key, "filtered metadata value");
            return false;
        }
        true
    }

    /// A dataset-wide value.
    pub fn global(&self, key: &str) -> Option<&MetadataValue> {
        self.global.get(key)
    }

    /// A series value.
    pub fn series_value(&self, series: usize, key: &str) -> Option<&MetadataValue> {
        self.series.get(&(series, key.to_string()))
    }

    /// A plane value.
    pub fn plane_value(&self, series: usize, plane: usize, key: &str) -> Option<&MetadataValue> {
        self.planes.get(&(series, plane, key.to_string()))
    }

    /// Dataset-wide values in key order.
    pub fn globals(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.global.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Values of one series in key order.
    pub fn series_values(&self, series: usize) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.series
            .iter()
            .filter(move |((s, _), _)| *s == series)
            .map(|((_, k), v)| (k.as_str(), v))
    }

    /// Number of values at every scope.
    pub fn len(&self) -> usize {
        self.global.len() + self.series.len() + self.planes.len()
    }

    /// `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataStore for MetadataTable {
    fn set_global(&mut self, key: &str, value: MetadataValue) {
        if self.keep(key, &value) {
            self.global.insert(key.to_string(), value);
        }
    }

    fn set_series_value(&mut self, series: usize, key: &str, value: MetadataValue) {
        if self.keep(key, &value) {
            self.series.insert((series, key.to_string()), value);
        }
    }

    fn set_plane_value(&mut self, series: usize, plane: usize, key: &str, value: MetadataValue) {
        if self.keep(key, &value) {
            self.planes.insert((series, plane, key.to_string()), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_separate() {
        let mut table = MetadataTable::new(false);
        table.set_global("Software", "scope".into());
        table.set_series_value(1, "SizeZ", 4usize.into());
        table.set_plane_value(1, 3, "IFD", 7usize.into());
        assert_eq!(table.global("Software").and_then(|v| v.as_str()), Some("scope"));
        assert_eq!(table.series_value(1, "SizeZ"), Some(&MetadataValue::Integer(4)));
        assert_eq!(table.series_value(0, "SizeZ"), None);
        assert_eq!(table.plane_value(1, 3, "IFD"), Some(&MetadataValue::Integer(7)));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn filtering_drops_binary_and_long_text() {
        let mut table = MetadataTable::new(true);
        table.set_global("ok", "line one\nline two".into());
        table.set_global("binary", "a\u{0}b".into());
        table.set_global("long", "x".repeat(MAX_FILTERED_LEN + 1).into());
        table.set_global("number", 3.5.into());
        assert!(table.global("ok").is_some());
        assert!(table.global("binary").is_none());
        assert!(table.global("long").is_none());
        assert!(table.global("number").is_some());

        let mut unfiltered = MetadataTable::new(false);
        unfiltered.set_global("binary", "a\u{0}b".into());
        assert!(unfiltered.global("binary").is_some());
    }
}
