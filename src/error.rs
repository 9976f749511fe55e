// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Represents errors that can occur in the history tree storage engine.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(std::io::Error),

    /// Serialization failed.
    Encode(EncodeError),

    /// Deserialization failed.
    Decode(DecodeError),

    /// A block's bytes did not decode to a recognized node/interval variant,
    /// or the tree header's magic or version did not match.
    ///
    /// Fatal: the file is not usable.
    Corruption(&'static str),

    /// A supplied timestamp was outside the tree's valid range, or an
    /// interval had `start > end`.
    TimeRangeError {
        /// Timestamp that was requested or inserted.
        requested: i64,
        /// Lower bound of the tree's valid range.
        start: i64,
        /// Upper bound of the tree's valid range.
        end: i64,
    },

    /// A caller tried to read a stored value as the wrong type.
    StateValueTypeError {
        /// Type tag actually stored.
        actual: &'static str,
        /// Type the caller requested.
        requested: &'static str,
    },

    /// The surrounding state system asked for a quark outside its
    /// attribute tree.
    ///
    /// The history tree engine never constructs this variant itself (quarks
    /// are opaque to it); it exists so the backend facade's callers can
    /// surface the condition through the same `Result` type.
    AttributeNotFound(i32),

    /// The tree (or the query in flight) was disposed.
    Disposed,

    /// An interval's serialized size exceeded the maximum allowed
    /// (`u16::MAX` bytes).
    IntervalTooLarge(usize),

    /// A [`crate::Config`] value was not usable (e.g. a block size too
    /// small to hold the largest possible interval).
    InvalidConfig(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::Corruption(what) => write!(f, "corrupted history tree file: {what}"),
            Self::TimeRangeError {
                requested,
                start,
                end,
            } => write!(
                f,
                "time {requested} is outside the tree's valid range [{start}, {end}]"
            ),
            Self::StateValueTypeError { actual, requested } => write!(
                f,
                "state value has type {actual}, but {requested} was requested"
            ),
            Self::AttributeNotFound(quark) => write!(f, "no attribute for quark {quark}"),
            Self::Disposed => write!(f, "history tree was disposed"),
            Self::IntervalTooLarge(size) => {
                write!(f, "interval serializes to {size} bytes, exceeding the {} byte limit", u16::MAX)
            }
            Self::InvalidConfig(what) => write!(f, "invalid history tree configuration: {what}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// History tree result.
pub type Result<T> = std::result::Result<T, Error>;
