//! Typed directory entry values.

use super::error::{TiffError, TiffFormatError, TiffResult};

use self::Value::{
    Ascii, Byte, Double, Float, Ifd, IfdBig, List, Rational, SRational, Short, Signed,
    SignedBig, SignedByte, SignedShort, Unsigned, UnsignedBig,
};

/// The decoded value of one directory entry.
///
/// Entries holding a single value decode to the scalar variant of their field type;
/// entries with several values decode to [`Value::List`].
#[allow(unused_qualifications, missing_docs)]
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    Byte(u8),
    Short(u16),
    SignedByte(i8),
    SignedShort(i16),
    Signed(i32),
    SignedBig(i64),
    Unsigned(u32),
    UnsignedBig(u64),
    Float(f32),
    Double(f64),
    List(Vec<Value>),
    Rational(u32, u32),
    SRational(i32, i32),
    Ascii(String),
    Ifd(u32),
    IfdBig(u64),
}

impl Value {
    /// Read a byte-valued entry.
    pub fn into_u8(self) -> TiffResult<u8> {
        match self {
            Byte(val) => Ok(val),
            val => Err(TiffError::FormatError(TiffFormatError::ByteExpected(val))),
        }
    }

    /// Read a short-valued entry, accepting bytes.
    pub fn into_u16(self) -> TiffResult<u16> {
        match self {
            Short(val) => Ok(val),
            Byte(val) => Ok(val.into()),
            Unsigned(val) => Ok(u16::try_from(val)?),
            UnsignedBig(val) => Ok(u16::try_from(val)?),
            val => Err(TiffError::FormatError(TiffFormatError::ShortExpected(val))),
        }
    }

    /// Read an unsigned 32-bit entry, accepting any narrower unsigned type.
    pub fn into_u32(self) -> TiffResult<u32> {
        match self {
            Short(val) => Ok(val.into()),
            Unsigned(val) => Ok(val),
            UnsignedBig(val) => Ok(u32::try_from(val)?),
            Byte(val) => Ok(val.into()),
            Ifd(val) => Ok(val),
            IfdBig(val) => Ok(u32::try_from(val)?),
            val => Err(TiffError::FormatError(
                TiffFormatError::UnsignedIntegerExpected(val),
            )),
        }
    }

    /// Read an unsigned 64-bit entry, accepting any narrower unsigned type.
    pub fn into_u64(self) -> TiffResult<u64> {
        match self {
            Short(val) => Ok(val.into()),
            Unsigned(val) => Ok(val.into()),
            UnsignedBig(val) => Ok(val),
            Byte(val) => Ok(val.into()),
            Ifd(val) => Ok(val.into()),
            IfdBig(val) => Ok(val),
            val => Err(TiffError::FormatError(
                TiffFormatError::UnsignedIntegerExpected(val),
            )),
        }
    }

    /// Read a signed 64-bit entry, accepting any integer type that fits.
    pub fn into_i64(self) -> TiffResult<i64> {
        match self {
            SignedByte(val) => Ok(val.into()),
            SignedShort(val) => Ok(val.into()),
            Signed(val) => Ok(val.into()),
            SignedBig(val) => Ok(val),
            Byte(val) => Ok(val.into()),
            Short(val) => Ok(val.into()),
            Unsigned(val) => Ok(val.into()),
            UnsignedBig(val) => Ok(i64::try_from(val)?),
            val => Err(TiffError::FormatError(
                TiffFormatError::SignedIntegerExpected(val),
            )),
        }
    }

    /// Read a numeric entry as a double, resolving rationals.
    pub fn into_f64(self) -> TiffResult<f64> {
        match self {
            Float(val) => Ok(val.into()),
            Double(val) => Ok(val),
            Rational(n, d) => Ok(n as f64 / d as f64),
            SRational(n, d) => Ok(n as f64 / d as f64),
            val => Ok(val.into_i64()? as f64),
        }
    }

    /// Read an ASCII entry.
    pub fn into_string(self) -> TiffResult<String> {
        match self {
            Ascii(val) => Ok(val),
            val => Err(TiffError::FormatError(TiffFormatError::InvalidTagValueType(
                format!("expected ASCII, found {val:?}"),
            ))),
        }
    }

    /// Read an entry of bytes, also accepting a single byte.
    pub fn into_u8_vec(self) -> TiffResult<Vec<u8>> {
        match self {
            List(vec) => vec.into_iter().map(Value::into_u8).collect(),
            Byte(val) => Ok(vec![val]),
            val => Err(TiffError::FormatError(TiffFormatError::ByteExpected(val))),
        }
    }

    /// Read an entry of shorts, also accepting a single value.
    pub fn into_u16_vec(self) -> TiffResult<Vec<u16>> {
        match self {
            List(vec) => vec.into_iter().map(Value::into_u16).collect(),
            val => Ok(vec![val.into_u16()?]),
        }
    }

    /// Read an entry of unsigned integers, also accepting a single value.
    pub fn into_u64_vec(self) -> TiffResult<Vec<u64>> {
        match self {
            List(vec) => vec.into_iter().map(Value::into_u64).collect(),
            val => Ok(vec![val.into_u64()?]),
        }
    }

    /// Read an entry of numbers as doubles, also accepting a single value.
    pub fn into_f64_vec(self) -> TiffResult<Vec<f64>> {
        match self {
            List(vec) => vec.into_iter().map(Value::into_f64).collect(),
            val => Ok(vec![val.into_f64()?]),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn widening_conversions() {
        assert_eq!(Value::Short(7).into_u32().unwrap(), 7);
        assert_eq!(Value::Rational(3, 2).into_f64().unwrap(), 1.5);
        assert_eq!(
            Value::List(vec![Value::Short(1), Value::Unsigned(2)])
                .into_u64_vec()
                .unwrap(),
            vec![1, 2]
        );
        assert_eq!(Value::Unsigned(9).into_u64_vec().unwrap(), vec![9]);
    }

    #[test]
    fn narrowing_overflow_is_an_error() {
        assert!(matches!(
            Value::Unsigned(70_000).into_u16(),
            Err(TiffError::IntSizeError)
        ));
        assert!(matches!(
            Value::Ascii("x".into()).into_u32(),
            Err(TiffError::FormatError(
                TiffFormatError::UnsignedIntegerExpected(_)
            ))
        ));
    }
}
