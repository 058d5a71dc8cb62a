//! Plane index to (Z, C, T) addressing.
//!
//! The three non-XY letters of a dimension order form a mixed-radix number: the first of them is
//! the least significant digit and the last one the most significant. A linear plane index is
//! decoded by repeated division against the axis sizes in that order.

use std::fmt;
use std::str::FromStr;

use crate::error::{MicroscopyError, MicroscopyResult};

/// One of the three non-spatial axes of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Focal plane.
    Z,
    /// Channel.
    C,
    /// Timepoint.
    T,
}

impl Axis {
    fn letter(&self) -> char {
        match self {
            Axis::Z => 'Z',
            Axis::C => 'C',
            Axis::T => 'T',
        }
    }

    fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'Z' => Some(Axis::Z),
            'C' => Some(Axis::C),
            'T' => Some(Axis::T),
            _ => None,
        }
    }
}

/// A 5-symbol traversal order, always starting with `XY`.
///
/// Only the trailing permutation of `ZCT` is stored; [`Display`](fmt::Display) and
/// [`FromStr`] use the full `XY...` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionOrder([Axis; 3]);

impl DimensionOrder {
    /// `XYZCT`
    pub const XYZCT: Self = Self([Axis::Z, Axis::C, Axis::T]);
    /// `XYZTC`
    pub const XYZTC: Self = Self([Axis::Z, Axis::T, Axis::C]);
    /// `XYCZT`
    pub const XYCZT: Self = Self([Axis::C, Axis::Z, Axis::T]);
    /// `XYCTZ`
    pub const XYCTZ: Self = Self([Axis::C, Axis::T, Axis::Z]);
    /// `XYTZC`
    pub const XYTZC: Self = Self([Axis::T, Axis::Z, Axis::C]);
    /// `XYTCZ`
    pub const XYTCZ: Self = Self([Axis::T, Axis::C, Axis::Z]);

    /// All six orders.
    pub const ALL: [Self; 6] = [
        Self::XYZCT,
        Self::XYZTC,
        Self::XYCZT,
        Self::XYCTZ,
        Self::XYTZC,
        Self::XYTCZ,
    ];

    /// The non-spatial axes, fastest-varying first.
    pub fn axes(&self) -> [Axis; 3] {
        self.0
    }

    /// Rank of `axis` within the order, 0 being the fastest-varying.
    pub fn position(&self, axis: Axis) -> usize {
        self.0.iter().position(|a| *a == axis).unwrap_or(0)
    }
}

impl Default for DimensionOrder {
    fn default() -> Self {
        Self::XYCZT
    }
}

impl FromStr for DimensionOrder {
    type Err = MicroscopyError;

    fn from_str(s: &str) -> MicroscopyResult<Self> {
        let invalid = || MicroscopyError::InvalidDimensionOrder(s.to_string());

        let upper = s.to_ascii_uppercase();
        let rest = upper.strip_prefix("XY").ok_or_else(invalid)?;
        let axes = rest
            .chars()
            .map(Axis::from_letter)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;

        match axes.as_slice() {
            [a, b, c] if a != b && b != c && a != c => Ok(Self([*a, *b, *c])),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for DimensionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XY")?;
        for axis in self.0 {
            write!(f, "{}", axis.letter())?;
        }
        Ok(())
    }
}

/// A logical plane position within a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaneAddress {
    /// Focal plane index.
    pub z: usize,
    /// Effective channel index.
    pub c: usize,
    /// Timepoint index.
    pub t: usize,
}

impl PlaneAddress {
    /// Construct an address.
    pub fn new(z: usize, c: usize, t: usize) -> Self {
        Self { z, c, t }
    }

    pub(crate) fn get(&self, axis: Axis) -> usize {
        match axis {
            Axis::Z => self.z,
            Axis::C => self.c,
            Axis::T => self.t,
        }
    }

    pub(crate) fn set(&mut self, axis: Axis, value: usize) {
        match axis {
            Axis::Z => self.z = value,
            Axis::C => self.c = value,
            Axis::T => self.t = value,
        }
    }
}

/// Axis sizes `(Z, effective C, T)` of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Sizes {
    pub z: usize,
    pub c: usize,
    pub t: usize,
}

impl Sizes {
    pub fn get(&self, axis: Axis) -> usize {
        match axis {
            Axis::Z => self.z,
            Axis::C => self.c,
            Axis::T => self.t,
        }
    }

    /// Number of cells, saturating at `usize::MAX`.
    pub fn product(&self) -> usize {
        self.checked_product().unwrap_or(usize::MAX)
    }

    pub fn checked_product(&self) -> Option<usize> {
        self.z.checked_mul(self.c)?.checked_mul(self.t)
    }
}

/// Decode a linear plane index into its `(z, c, t)` address.
///
/// `size_c` must be the effective channel count (channels divided by samples per pixel for
/// packed RGB data).
pub fn to_zct(
    order: &DimensionOrder,
    size_z: usize,
    size_c: usize,
    size_t: usize,
    no: usize,
) -> MicroscopyResult<PlaneAddress> {
    let sizes = Sizes {
        z: size_z,
        c: size_c,
        t: size_t,
    };
    let image_count = sizes.product();
    if no >= image_count {
        return Err(MicroscopyError::PlaneIndexOutOfRange {
            index: no,
            image_count,
        });
    }

    let mut address = PlaneAddress::default();
    let mut remainder = no;
    for axis in order.axes() {
        let size = sizes.get(axis);
        address.set(axis, remainder % size);
        remainder /= size;
    }
    Ok(address)
}

/// Encode a `(z, c, t)` address as a linear plane index. Inverse of [`to_zct`].
pub fn to_index(
    order: &DimensionOrder,
    size_z: usize,
    size_c: usize,
    size_t: usize,
    address: PlaneAddress,
) -> MicroscopyResult<usize> {
    let sizes = Sizes {
        z: size_z,
        c: size_c,
        t: size_t,
    };
    if address.z >= size_z || address.c >= size_c || address.t >= size_t {
        return Err(MicroscopyError::CoordinateOutOfRange {
            z: address.z,
            c: address.c,
            t: address.t,
            size_z,
            size_c,
            size_t,
        });
    }

    let index = order
        .axes()
        .iter()
        .rev()
        .fold(0, |acc, axis| acc * sizes.get(*axis) + address.get(*axis));
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let order: DimensionOrder = "XYTZC".parse().unwrap();
        assert_eq!(order, DimensionOrder::XYTZC);
        assert_eq!(order.to_string(), "XYTZC");
        assert_eq!("xyczt".parse::<DimensionOrder>().unwrap(), DimensionOrder::XYCZT);

        for bad in ["XYZZT", "XYZC", "ZCTXY", "XYZCTT", "XYZCA", ""] {
            assert!(matches!(
                bad.parse::<DimensionOrder>(),
                Err(MicroscopyError::InvalidDimensionOrder(_))
            ));
        }
    }

    #[test]
    fn first_letter_varies_fastest() {
        let order = DimensionOrder::XYZCT;
        assert_eq!(to_zct(&order, 3, 2, 4, 0).unwrap(), PlaneAddress::new(0, 0, 0));
        assert_eq!(to_zct(&order, 3, 2, 4, 1).unwrap(), PlaneAddress::new(1, 0, 0));
        assert_eq!(to_zct(&order, 3, 2, 4, 3).unwrap(), PlaneAddress::new(0, 1, 0));
        assert_eq!(to_zct(&order, 3, 2, 4, 6).unwrap(), PlaneAddress::new(0, 0, 1));

        let order = DimensionOrder::XYTCZ;
        assert_eq!(to_zct(&order, 3, 2, 4, 1).unwrap(), PlaneAddress::new(0, 0, 1));
        assert_eq!(to_zct(&order, 3, 2, 4, 4).unwrap(), PlaneAddress::new(0, 1, 0));
        assert_eq!(to_zct(&order, 3, 2, 4, 8).unwrap(), PlaneAddress::new(1, 0, 0));
    }

    #[test]
    fn round_trip_every_order_and_size() {
        for order in DimensionOrder::ALL {
            for size_z in 1..=4 {
                for size_c in 1..=3 {
                    for size_t in 1..=4 {
                        for no in 0..size_z * size_c * size_t {
                            let zct = to_zct(&order, size_z, size_c, size_t, no).unwrap();
                            let back = to_index(&order, size_z, size_c, size_t, zct).unwrap();
                            assert_eq!(back, no, "{order} {size_z}x{size_c}x{size_t}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn out_of_range_is_rejected() {
        let order = DimensionOrder::XYCZT;
        assert!(matches!(
            to_zct(&order, 2, 2, 2, 8),
            Err(MicroscopyError::PlaneIndexOutOfRange {
                index: 8,
                image_count: 8
            })
        ));
        assert!(matches!(
            to_index(&order, 2, 2, 2, PlaneAddress::new(0, 2, 0)),
            Err(MicroscopyError::CoordinateOutOfRange { c: 2, .. })
        ));
        assert!(to_zct(&order, 0, 1, 1, 0).is_err());
    }
}
