//! Readers stacked over other readers, and the utilities that walk such stacks.
//!
//! A wrapper owns exactly one inner reader and forwards everything it does not change. Chains
//! are rebuilt from a [`ReaderRegistry`] of constructors rather than cloned, so a duplicate
//! never shares files or buffers with the original.

use std::collections::BTreeMap;

use crate::error::{MicroscopyError, MicroscopyResult};
use crate::format::{
    FilePatternReader, FormatReader, OmeTiffReader, PlateReader, TiffReader,
};

mod channel_separator;
mod dimension_swapper;
mod image_reader;

pub use channel_separator::ChannelSeparator;
pub use dimension_swapper::DimensionSwapper;
pub use image_reader::ImageReader;

/// Builds a closed reader.
pub type ReaderConstructor = fn() -> Box<dyn FormatReader>;

/// Builds a wrapper around a reader.
pub type WrapperConstructor = fn(Box<dyn FormatReader>) -> Box<dyn FormatReader>;

fn construct<R: FormatReader + Default + 'static>() -> Box<dyn FormatReader> {
    Box::new(R::default())
}

fn channel_separator(inner: Box<dyn FormatReader>) -> Box<dyn FormatReader> {
    Box::new(ChannelSeparator::new(inner))
}

fn dimension_swapper(inner: Box<dyn FormatReader>) -> Box<dyn FormatReader> {
    Box::new(DimensionSwapper::new(inner))
}

/// Constructors by reader kind.
#[derive(Debug, Clone)]
pub struct ReaderRegistry {
    readers: BTreeMap<&'static str, ReaderConstructor>,
    wrappers: BTreeMap<&'static str, WrapperConstructor>,
}

impl ReaderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            readers: BTreeMap::new(),
            wrappers: BTreeMap::new(),
        }
    }

    /// Register, or replace, the constructor of a reader kind.
    pub fn register_reader(&mut self, kind: &'static str, constructor: ReaderConstructor) {
        self.readers.insert(kind, constructor);
    }

    /// Register, or replace, the constructor of a wrapper kind.
    pub fn register_wrapper(&mut self, kind: &'static str, constructor: WrapperConstructor) {
        self.wrappers.insert(kind, constructor);
    }

    /// A new closed reader of `kind`.
    pub fn create(&self, kind: &str) -> MicroscopyResult<Box<dyn FormatReader>> {
        self.readers
            .get(kind)
            .map(|constructor| constructor())
            .ok_or_else(|| MicroscopyError::UnknownReaderKind(kind.to_string()))
    }

    /// Wrap `inner` in a new wrapper of `kind`.
    pub fn wrap(
        &self,
        kind: &str,
        inner: Box<dyn FormatReader>,
    ) -> MicroscopyResult<Box<dyn FormatReader>> {
        let constructor = self
            .wrappers
            .get(kind)
            .ok_or_else(|| MicroscopyError::UnknownReaderKind(kind.to_string()))?;
        Ok(constructor(inner))
    }

    /// Registered reader kinds.
    pub fn reader_kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.readers.keys().copied()
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register_reader(TiffReader::KIND, construct::<TiffReader>);
        registry.register_reader(OmeTiffReader::KIND, construct::<OmeTiffReader>);
        registry.register_reader(FilePatternReader::KIND, construct::<FilePatternReader>);
        registry.register_reader(PlateReader::KIND, construct::<PlateReader>);
        registry.register_reader(ImageReader::KIND, construct::<ImageReader>);
        registry.register_wrapper(ChannelSeparator::KIND, channel_separator);
        registry.register_wrapper(DimensionSwapper::KIND, dimension_swapper);
        registry
    }
}

/// Walk down a chain.
///
/// With `kind`, returns the outermost reader of that kind, or `None` if the chain has none.
/// Without, returns the innermost reader.
pub fn unwrap<'a>(reader: &'a dyn FormatReader, kind: Option<&str>) -> Option<&'a dyn FormatReader> {
    let mut current = reader;
    loop {
        if kind == Some(current.kind()) {
            return Some(current);
        }
        match current.inner() {
            Some(inner) => current = inner,
            None => return kind.is_none().then_some(current),
        }
    }
}

/// Mutable variant of [`unwrap`].
pub fn unwrap_mut<'a>(
    reader: &'a mut dyn FormatReader,
    kind: Option<&str>,
) -> Option<&'a mut dyn FormatReader> {
    if kind == Some(reader.kind()) {
        return Some(reader);
    }
    if reader.inner().is_none() {
        return if kind.is_none() { Some(reader) } else { None };
    }
    reader.inner_mut().and_then(|inner| unwrap_mut(inner, kind))
}

/// Rebuild a chain with fresh readers of the same kinds and copy its options.
///
/// A dispatching layer is rebuilt as `dispatcher_substitute` when given, or as a new empty
/// dispatcher; whatever it had chosen is not copied. The copy is closed and shares no open
/// files with `reader`; listeners are shared.
pub fn duplicate(
    reader: &dyn FormatReader,
    registry: &ReaderRegistry,
    dispatcher_substitute: Option<&str>,
) -> MicroscopyResult<Box<dyn FormatReader>> {
    let mut wrappers = Vec::new();
    let mut current = reader;
    let base = loop {
        if current.is_dispatcher() {
            break dispatcher_substitute.unwrap_or(current.kind());
        }
        match current.inner() {
            Some(inner) => {
                wrappers.push(current.kind());
                current = inner;
            }
            None => break current.kind(),
        }
    };

    let mut copy = registry.create(base)?;
    for kind in wrappers.iter().rev() {
        copy = registry.wrap(kind, copy)?;
    }
    *copy.options_mut() = reader.options().clone();
    tracing::debug!(base, wrappers = wrappers.len(), "duplicated reader chain");
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Box<dyn FormatReader> {
        let registry = ReaderRegistry::default();
        let base = registry.create(TiffReader::KIND).unwrap();
        let swapped = registry.wrap(DimensionSwapper::KIND, base).unwrap();
        registry.wrap(ChannelSeparator::KIND, swapped).unwrap()
    }

    #[test]
    fn unwrap_walks_the_chain() {
        let reader = chain();
        assert_eq!(unwrap(reader.as_ref(), None).map(|r| r.kind()), Some("tiff"));
        assert_eq!(
            unwrap(reader.as_ref(), Some("dimension-swapper")).map(|r| r.kind()),
            Some("dimension-swapper")
        );
        assert_eq!(
            unwrap(reader.as_ref(), Some("channel-separator")).map(|r| r.kind()),
            Some("channel-separator")
        );
        assert!(unwrap(reader.as_ref(), Some("plate")).is_none());
    }

    #[test]
    fn unwrap_mut_reaches_the_inner_reader() {
        let mut reader = chain();
        let tiff = unwrap_mut(reader.as_mut(), Some("tiff")).unwrap();
        tiff.options_mut().normalize = true;
        assert!(reader.options().normalize);
        assert!(unwrap_mut(reader.as_mut(), Some("plate")).is_none());
    }

    #[test]
    fn duplicate_rebuilds_same_kinds() {
        let registry = ReaderRegistry::default();
        let mut original = chain();
        original.options_mut().filter_metadata = true;

        let mut copy = duplicate(original.as_ref(), &registry, None).unwrap();
        assert_eq!(copy.kind(), "channel-separator");
        assert_eq!(copy.inner().map(|r| r.kind()), Some("dimension-swapper"));
        assert_eq!(unwrap(copy.as_ref(), None).map(|r| r.kind()), Some("tiff"));
        assert!(copy.options().filter_metadata);

        copy.options_mut().filter_metadata = false;
        assert!(original.options().filter_metadata);
    }

    #[test]
    fn duplicate_substitutes_the_dispatcher() {
        let registry = ReaderRegistry::default();
        let chain = registry
            .wrap(ChannelSeparator::KIND, Box::new(ImageReader::new()))
            .unwrap();

        let same = duplicate(chain.as_ref(), &registry, None).unwrap();
        assert_eq!(same.inner().map(|r| r.kind()), Some("image-reader"));

        let substituted = duplicate(chain.as_ref(), &registry, Some("plate")).unwrap();
        assert_eq!(substituted.inner().map(|r| r.kind()), Some("plate"));

        assert!(matches!(
            duplicate(chain.as_ref(), &registry, Some("nope")),
            Err(MicroscopyError::UnknownReaderKind(_))
        ));
    }
}
