//! # Wavepack
//!
//! Compact storage and random retrieval of multi-channel sensor waveform
//! captures ("shots"). Each shot holds a timestamp and four fixed-length
//! sample channels: PMT, APD, IR and RAMAN.
//!
//! ## Codec overview
//!
//! Each channel is encoded independently (see [`channel`]):
//!
//! - The first nonzero sample is stored verbatim as the **reference**, along
//!   with its **start** index.
//! - Every later nonzero sample is stored as its difference from the previous
//!   nonzero sample, plus a per-channel **bias** that makes all differences
//!   positive.
//! - Zero samples are stored as delta 0, which the bias keeps free for this.
//! - Field widths are the minimum that fit the channel's actual values. They
//!   are written into a small header ahead of each channel.
//!
//! A record payload starts with its own size (see [`codec`]), so a file of
//! payloads plus an offset table gives O(1) access to any record (see
//! [`file`]).
//!
//! ## Example
//!
//! ```rust
//! use wavepack::{Channel, ChannelLayout, IndexedRecordFile, WaveformRecord, write_records};
//!
//! let layout = ChannelLayout::STANDARD;
//! let mut shot = WaveformRecord::zeroed(&layout, 1_700_000_000);
//! shot.channel_mut(Channel::Pmt)[2..6].copy_from_slice(&[5, 7, 7, 9]);
//!
//! let dir = tempfile::tempdir().unwrap();
//! let base = dir.path().join("line_0001");
//! write_records(base.with_extension("cwf"), layout, &[shot.clone()]).unwrap();
//!
//! let mut file = IndexedRecordFile::open(&base).unwrap();
//! assert_eq!(file.record_count(), 1);
//! assert!(!file.is_legacy());
//! assert_eq!(file.read_record(0).unwrap(), shot);
//! ```
//!
//! ## Legacy files
//!
//! When no compressed file exists, [`IndexedRecordFile::open`] falls back to
//! the legacy sibling: a headerless array of fixed-size little-endian
//! records. [`compress_legacy`] converts such a file into the compressed
//! format.

pub mod bitstream;
pub mod channel;
pub mod codec;
pub mod error;
pub mod file;
pub mod record;
pub mod writer;

// Re-export primary types at the crate root.
pub use bitstream::{pack, unpack, BitError, BitReader, BitWriter};
pub use channel::ChannelEncoding;
pub use codec::RecordCodec;
pub use error::{DecodeError, EncodingOverflow, Error, FormatError, Result};
pub use file::{FileNaming, IndexedRecordFile, Records};
pub use record::{Channel, ChannelLayout, WaveformRecord, SENTINEL_SLOTS};
pub use writer::{compress_legacy, write_records, LegacyWriter, RecordFileWriter};
