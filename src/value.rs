// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The typed value carried by a state interval.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::io::{Read, Write};

/// A typed attribute value, as stored inside an [`Interval`](crate::Interval).
///
/// Comparison between values is partial: numerics compare mutually, strings
/// compare with strings, booleans with booleans, and [`StateValue::Null`]
/// compares less than everything else (including itself being equal to
/// itself). Comparing incompatible types (e.g. a string with a boolean)
/// yields `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    /// No value.
    Null,
    /// A boolean.
    Boolean(bool),
    /// A 32-bit signed integer.
    Integer(i32),
    /// A 64-bit signed integer.
    Long(i64),
    /// A 64-bit float.
    Double(f64),
    /// A UTF-8 string.
    String(String),
}

impl StateValue {
    /// Name of this value's type, used in [`crate::Error::StateValueTypeError`].
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::String(_) => "string",
        }
    }

    /// Returns `true` if this is [`StateValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Reads this value as a boolean, or fails with [`crate::Error::StateValueTypeError`].
    pub fn as_boolean(&self) -> crate::Result<bool> {
        match self {
            Self::Boolean(v) => Ok(*v),
            _ => Err(self.type_error("boolean")),
        }
    }

    /// Reads this value as a 32-bit integer, or fails with [`crate::Error::StateValueTypeError`].
    pub fn as_integer(&self) -> crate::Result<i32> {
        match self {
            Self::Integer(v) => Ok(*v),
            _ => Err(self.type_error("integer")),
        }
    }

    /// Reads this value as a 64-bit integer, or fails with [`crate::Error::StateValueTypeError`].
    pub fn as_long(&self) -> crate::Result<i64> {
        match self {
            Self::Long(v) => Ok(*v),
            _ => Err(self.type_error("long")),
        }
    }

    /// Reads this value as a 64-bit float, or fails with [`crate::Error::StateValueTypeError`].
    pub fn as_double(&self) -> crate::Result<f64> {
        match self {
            Self::Double(v) => Ok(*v),
            _ => Err(self.type_error("double")),
        }
    }

    /// Reads this value as a string slice, or fails with [`crate::Error::StateValueTypeError`].
    pub fn as_str(&self) -> crate::Result<&str> {
        match self {
            Self::String(v) => Ok(v.as_str()),
            _ => Err(self.type_error("string")),
        }
    }

    fn type_error(&self, requested: &'static str) -> crate::Error {
        crate::Error::StateValueTypeError {
            actual: self.type_name(),
            requested,
        }
    }

    /// Partial comparison, per the rules this value type admits: numerics
    /// mutually, strings with strings, booleans with booleans, and `Null`
    /// strictly smaller than every other value (including other `Null`s,
    /// for which it is equal).
    #[must_use]
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        use StateValue::{Boolean, Double, Integer, Long, Null, String};

        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Null, _) => Some(Ordering::Less),
            (_, Null) => Some(Ordering::Greater),
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            (Integer(a), Integer(b)) => a.partial_cmp(b),
            (Long(a), Long(b)) => a.partial_cmp(b),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (Integer(a), Long(b)) => i64::from(*a).partial_cmp(b),
            (Long(a), Integer(b)) => a.partial_cmp(&i64::from(*b)),
            (Integer(a), Double(b)) => f64::from(*a).partial_cmp(b),
            (Double(a), Integer(b)) => a.partial_cmp(&f64::from(*b)),
            (Long(a), Double(b)) => (*a as f64).partial_cmp(b),
            (Double(a), Long(b)) => a.partial_cmp(&(*b as f64)),
            (String(a), String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    pub(crate) fn tag(&self) -> i8 {
        match self {
            Self::Null => -1,
            Self::Integer(_) => 0,
            Self::String(_) => 1,
            Self::Long(_) => 2,
            Self::Double(_) => 3,
            Self::Boolean(true) => 4,
            Self::Boolean(false) => 5,
        }
    }

    /// Size, in bytes, of the payload following the type tag.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        match self {
            Self::Null | Self::Boolean(_) => 0,
            Self::Integer(_) => 4,
            Self::Long(_) => 8,
            Self::Double(_) => 8,
            // u16 length prefix + bytes + terminating zero byte
            Self::String(s) => 2 + s.len() + 1,
        }
    }

    pub(crate) fn encode_payload<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            Self::Null | Self::Boolean(_) => {}
            Self::Integer(v) => writer.write_i32::<LittleEndian>(*v)?,
            Self::Long(v) => writer.write_i64::<LittleEndian>(*v)?,
            Self::Double(v) => writer.write_f64::<LittleEndian>(*v)?,
            Self::String(s) => {
                let bytes = s.as_bytes();
                if bytes.len() > usize::from(u16::MAX) {
                    return Err(EncodeError::TooLarge);
                }

                #[allow(clippy::cast_possible_truncation)]
                writer.write_u16::<LittleEndian>(bytes.len() as u16)?;
                writer.write_all(bytes)?;
                writer.write_u8(0)?;
            }
        }
        Ok(())
    }

    pub(crate) fn decode_payload<R: Read>(tag: i8, reader: &mut R) -> Result<Self, DecodeError> {
        Ok(match tag {
            -1 => Self::Null,
            0 => Self::Integer(reader.read_i32::<LittleEndian>()?),
            1 => {
                let len = usize::from(reader.read_u16::<LittleEndian>()?);
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf)?;

                let terminator = reader.read_u8()?;
                if terminator != 0 {
                    return Err(DecodeError::Invalid(
                        "string value is missing its terminating zero byte",
                    ));
                }

                let s = std::string::String::from_utf8(buf)
                    .map_err(|_| DecodeError::Invalid("string value is not valid UTF-8"))?;
                Self::String(s)
            }
            2 => Self::Long(reader.read_i64::<LittleEndian>()?),
            3 => Self::Double(reader.read_f64::<LittleEndian>()?),
            4 => Self::Boolean(true),
            5 => Self::Boolean(false),
            #[allow(clippy::cast_sign_loss)]
            other => return Err(DecodeError::InvalidTag("state value type tag", other as u8)),
        })
    }
}

impl Encode for StateValue {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_i8(self.tag())?;
        self.encode_payload(writer)
    }
}

impl Decode for StateValue {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_i8()?;
        Self::decode_payload(tag, reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn null_is_smallest() {
        assert_eq!(
            StateValue::Null.partial_compare(&StateValue::Integer(i32::MIN)),
            Some(Ordering::Less)
        );
        assert_eq!(
            StateValue::Null.partial_compare(&StateValue::Null),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn numerics_compare_mutually() {
        assert_eq!(
            StateValue::Integer(1).partial_compare(&StateValue::Long(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            StateValue::Double(3.0).partial_compare(&StateValue::Integer(3)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn incompatible_types_are_incomparable() {
        assert_eq!(
            StateValue::String("a".into()).partial_compare(&StateValue::Boolean(true)),
            None
        );
    }

    #[test]
    fn round_trip_each_variant() {
        let values = vec![
            StateValue::Null,
            StateValue::Boolean(true),
            StateValue::Boolean(false),
            StateValue::Integer(0),
            StateValue::Integer(-1),
            StateValue::Integer(i32::MAX),
            StateValue::Long(i64::MIN),
            StateValue::Double(f64::NAN),
            StateValue::Double(-0.0),
            StateValue::Double(std::f64::consts::PI),
            StateValue::String(std::string::String::new()),
            StateValue::String("a".into()),
            StateValue::String("π multi-byte".into()),
        ];

        for value in values {
            let bytes = value.encode_into_vec();
            let decoded = StateValue::decode_from(&mut &bytes[..]).unwrap();

            // NaN != NaN, so compare bit patterns for doubles.
            match (&value, &decoded) {
                (StateValue::Double(a), StateValue::Double(b)) => {
                    assert_eq!(a.to_bits(), b.to_bits());
                }
                _ => assert_eq!(value, decoded),
            }
        }
    }

    #[test]
    fn rejects_non_zero_string_terminator() {
        let mut bytes = StateValue::String("hi".into()).encode_into_vec();
        *bytes.last_mut().unwrap() = 1;
        let err = StateValue::decode_from(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }
}
