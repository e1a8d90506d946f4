//! Error types for encoding, decoding and record file access.
//!
//! Every fallible operation returns a typed error to its immediate caller.
//! Nothing in this crate retries, prints diagnostics, or exits the process.

use thiserror::Error;

use crate::bitstream::BitError;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Open, seek, read or write failure on the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file structure is inconsistent, or a record index is out of range.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// An encoded record payload is inconsistent with its own headers.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A value does not fit the bit width reserved for it.
    #[error("encoding overflow: {0}")]
    EncodingOverflow(#[from] EncodingOverflow),

    /// A record handed to the encoder does not match the channel layout.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Structural errors in a record file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Requested record index is outside `[0, record_count)`.
    #[error("record index {index} out of range (file holds {count} records)")]
    IndexOutOfRange { index: u32, count: u32 },

    /// The file ends before data its header promises.
    #[error("file truncated: need {required} bytes, file has {actual}")]
    Truncated { required: u64, actual: u64 },

    /// An offset table entry points outside the payload area.
    #[error("offset {offset} for record {index} lies outside the payload area")]
    OffsetOutOfRange { index: u32, offset: u32 },

    /// Offsets are not strictly increasing.
    #[error("offset for record {index} ({offset}) does not follow previous offset {previous}")]
    NonMonotonicOffset { index: u32, offset: u32, previous: u32 },

    /// A payload size prefix is too small or disagrees with the offset table.
    #[error("record {index} has bad payload size {size}")]
    BadPayloadSize { index: u32, size: u16 },

    /// The writer was finished with a different number of records than declared.
    #[error("declared {declared} records but {written} were written")]
    RecordCountMismatch { declared: u32, written: u32 },

    /// Neither the compressed nor the legacy sibling file exists.
    #[error("no record file found for {0}")]
    NotFound(String),
}

/// Errors detected while parsing an encoded record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer cannot hold even the fixed part of a record.
    #[error("payload too short: need at least {required} bytes, got {actual}")]
    PayloadTooShort { required: usize, actual: usize },

    /// The size prefix disagrees with the number of bytes supplied.
    #[error("size prefix says {declared} bytes, buffer has {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    /// A channel's header widths would run past the end of the payload.
    #[error("channel {channel} needs {required_bits} bits, only {available_bits} remain")]
    ChannelOverrun {
        channel: &'static str,
        required_bits: usize,
        available_bits: usize,
    },

    /// A channel header holds an impossible start index.
    #[error("channel {channel} start index {start} exceeds length {len}")]
    BadStartIndex {
        channel: &'static str,
        start: u32,
        len: usize,
    },

    /// A reconstructed sample does not fit the sample type.
    #[error("channel {channel} sample {index} reconstructs to {value}, above 65535")]
    SampleOutOfRange {
        channel: &'static str,
        index: usize,
        value: u32,
    },

    /// Low-level bit access failed.
    #[error("bit access failed: {0}")]
    Bits(#[from] BitError),
}

/// A value that does not fit the width reserved for it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field} value {value} does not fit in {max_bits} bits")]
pub struct EncodingOverflow {
    /// Which field overflowed (e.g. `"PMT delta"`, `"payload size"`).
    pub field: String,
    /// The offending value.
    pub value: u64,
    /// Largest width the format allows for this field.
    pub max_bits: u32,
}

impl EncodingOverflow {
    pub(crate) fn new(field: impl Into<String>, value: u64, max_bits: u32) -> Self {
        Self {
            field: field.into(),
            value,
            max_bits,
        }
    }
}

/// Type alias for `Result` with this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
