// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The interval record: the serialized unit stored inside a node.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::value::StateValue;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// A state interval: attribute `quark` held `value` for every `t` with
/// `start <= t <= end`.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    /// Inclusive lower bound of the interval.
    pub start: i64,
    /// Inclusive upper bound of the interval.
    pub end: i64,
    /// Attribute this interval describes. Opaque to the storage engine.
    pub quark: i32,
    /// The value held for the duration of the interval.
    pub value: StateValue,
}

impl Interval {
    /// Creates a new interval. Does not validate `start <= end`; callers
    /// going through [`crate::tree::HistoryTree::insert_past_state`] get
    /// that check for free.
    #[must_use]
    pub fn new(start: i64, end: i64, quark: i32, value: StateValue) -> Self {
        Self {
            start,
            end,
            quark,
            value,
        }
    }

    /// Returns `true` if `t` falls within `[start, end]`.
    #[must_use]
    pub fn intersects(&self, t: i64) -> bool {
        self.start <= t && t <= self.end
    }

    /// Size, in bytes, this interval occupies once serialized.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        // type_tag + start + end + quark + payload
        1 + 8 + 8 + 4 + self.value.payload_size()
    }
}

impl Encode for Interval {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        if self.encoded_size() > usize::from(u16::MAX) {
            return Err(EncodeError::TooLarge);
        }

        writer.write_i8(self.value.tag())?;
        writer.write_i64::<LittleEndian>(self.start)?;
        writer.write_i64::<LittleEndian>(self.end)?;
        writer.write_i32::<LittleEndian>(self.quark)?;
        self.value.encode_payload(writer)
    }
}

impl Decode for Interval {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_i8()?;
        let start = reader.read_i64::<LittleEndian>()?;
        let end = reader.read_i64::<LittleEndian>()?;
        let quark = reader.read_i32::<LittleEndian>()?;
        let value = StateValue::decode_payload(tag, reader)?;

        Ok(Self {
            start,
            end,
            quark,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn intersects_bounds() {
        let iv = Interval::new(10, 20, 0, StateValue::Null);
        assert!(iv.intersects(10));
        assert!(iv.intersects(20));
        assert!(iv.intersects(15));
        assert!(!iv.intersects(9));
        assert!(!iv.intersects(21));
    }

    #[test]
    fn round_trip() {
        let iv = Interval::new(5, 100, 42, StateValue::Long(-7));
        let bytes = iv.encode_into_vec();
        assert_eq!(bytes.len(), iv.encoded_size());
        let decoded = Interval::decode_from(&mut &bytes[..]).unwrap();
        assert_eq!(iv, decoded);
    }

    #[test]
    fn rejects_oversized_string_payload() {
        let huge = "x".repeat(usize::from(u16::MAX) + 1);
        let iv = Interval::new(0, 0, 0, StateValue::String(huge));
        let err = iv.encode_into(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, EncodeError::TooLarge));
    }
}
