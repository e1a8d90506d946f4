//! Serialisation of a whole [`WaveformRecord`] into a self-sized payload.
//!
//! # Payload layout
//!
//! | Bits | Field |
//! |------|-------|
//! | 16 | total payload size in bytes, little-endian `u16`, includes itself |
//! | 32 | `time_stamp` |
//! | per channel | channel block, in PMT, APD, IR, RAMAN order |
//!
//! Each channel block is:
//!
//! | Bits | Field |
//! |------|-------|
//! | 4 × 4 | widths of reference, start, bias, delta |
//! | `ref_bits` | reference |
//! | `start_bits` | start index |
//! | `bias_bits` | bias |
//! | `(slots - 1) × delta_bits` | one delta per slot after the sentinel |
//!
//! Everything after the size prefix is packed MSB-first with no alignment.
//! The payload is padded with zero bits to a whole byte.
//!
//! A width nibble of `w` in `1..=15` means `w` bits, and `0` means 16 bits.
//! Zero-width fields never occur, so the nibble can cover one extra width.

use byteorder::{ByteOrder, LittleEndian};

use crate::bitstream::{BitError, BitReader, BitWriter};
use crate::channel::{ChannelEncoding, Reconstructor};
use crate::error::{DecodeError, EncodingOverflow, Error, Result};
use crate::record::{Channel, ChannelLayout, WaveformRecord, SENTINEL_SLOTS};

/// Bits taken by the size prefix.
pub const SIZE_PREFIX_BITS: u32 = 16;

/// Bits taken by the four width nibbles of a channel block.
const WIDTH_HEADER_BITS: usize = 16;

/// Widest field a 4-bit width nibble can describe.
pub const MAX_FIELD_WIDTH: u32 = 16;

/// Smallest possible payload: size prefix plus timestamp.
const MIN_PAYLOAD_BYTES: usize = 6;

#[inline]
fn width_to_nibble(width: u32) -> u32 {
    width % MAX_FIELD_WIDTH
}

#[inline]
fn nibble_to_width(nibble: u32) -> u32 {
    if nibble == 0 {
        MAX_FIELD_WIDTH
    } else {
        nibble
    }
}

/// Encodes and decodes records for one fixed [`ChannelLayout`].
///
/// # Example
/// ```
/// use wavepack::{Channel, ChannelLayout, RecordCodec, WaveformRecord};
///
/// let layout = ChannelLayout::STANDARD;
/// let mut record = WaveformRecord::zeroed(&layout, 1_234);
/// record.channel_mut(Channel::Pmt)[2..6].copy_from_slice(&[5, 7, 7, 9]);
///
/// let codec = RecordCodec::new(layout);
/// let bytes = codec.encode(&record).unwrap();
/// assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]) as usize, bytes.len());
/// assert_eq!(codec.decode(&bytes).unwrap(), record);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec {
    layout: ChannelLayout,
}

impl RecordCodec {
    /// Creates a codec for `layout`.
    pub fn new(layout: ChannelLayout) -> Self {
        Self { layout }
    }

    /// The layout this codec reads and writes.
    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    /// Encodes a record into a size-prefixed payload.
    ///
    /// Returns `Error::InvalidRecord` if the record does not match the
    /// layout, and `Error::EncodingOverflow` if any field needs more than
    /// [`MAX_FIELD_WIDTH`] bits or the payload exceeds 65535 bytes.
    pub fn encode(&self, record: &WaveformRecord) -> Result<Vec<u8>> {
        record.validate(&self.layout)?;

        let encodings = Channel::ALL.map(|c| ChannelEncoding::compute(record.channel(c)));
        for (channel, enc) in Channel::ALL.iter().zip(&encodings) {
            check_widths(*channel, enc)?;
        }

        let total_bits = SIZE_PREFIX_BITS as usize
            + 32
            + encodings
                .iter()
                .map(|e| WIDTH_HEADER_BITS + e.value_bits())
                .sum::<usize>();
        let total_bytes = total_bits.div_ceil(8);
        let size = u16::try_from(total_bytes)
            .map_err(|_| EncodingOverflow::new("payload size", total_bytes as u64, 16))?;

        let mut writer = BitWriter::new(total_bytes);
        writer
            .skip(SIZE_PREFIX_BITS as usize)
            .map_err(|e| write_error("size prefix", e))?;
        writer
            .write(record.time_stamp, 32)
            .map_err(|e| write_error("time stamp", e))?;
        for (channel, enc) in Channel::ALL.iter().zip(&encodings) {
            write_channel(&mut writer, *channel, enc)?;
        }

        let mut bytes = writer.into_bytes();
        LittleEndian::write_u16(&mut bytes[..2], size);
        Ok(bytes)
    }

    /// Decodes a size-prefixed payload produced by [`encode`](Self::encode).
    ///
    /// The size prefix must equal `bytes.len()`, and decoding must consume
    /// exactly that many bytes. Channel headers are checked against the
    /// remaining payload before any of that channel's values are read.
    pub fn decode(&self, bytes: &[u8]) -> Result<WaveformRecord> {
        if bytes.len() < MIN_PAYLOAD_BYTES {
            return Err(DecodeError::PayloadTooShort {
                required: MIN_PAYLOAD_BYTES,
                actual: bytes.len(),
            }
            .into());
        }
        let declared = usize::from(LittleEndian::read_u16(&bytes[..2]));
        if declared != bytes.len() {
            return Err(DecodeError::SizeMismatch {
                declared,
                actual: bytes.len(),
            }
            .into());
        }

        let mut reader = BitReader::new(bytes);
        reader.read(SIZE_PREFIX_BITS).map_err(DecodeError::from)?;
        let time_stamp = reader.read(32).map_err(DecodeError::from)?;

        let mut record = WaveformRecord::zeroed(&self.layout, time_stamp);
        for channel in Channel::ALL {
            read_channel(&mut reader, channel, record.channel_mut(channel))?;
        }

        let consumed = reader.position().div_ceil(8);
        if consumed != declared {
            return Err(DecodeError::SizeMismatch {
                declared,
                actual: consumed,
            }
            .into());
        }
        Ok(record)
    }
}

fn check_widths(channel: Channel, enc: &ChannelEncoding) -> Result<()> {
    let max_delta = enc.deltas.iter().copied().max().unwrap_or(0);
    let fields = [
        ("reference", enc.reference, enc.ref_bits),
        ("start", enc.start_index, enc.start_bits),
        ("bias", enc.bias, enc.bias_bits),
        ("delta", max_delta, enc.delta_bits),
    ];
    for (name, value, bits) in fields {
        if bits > MAX_FIELD_WIDTH {
            return Err(EncodingOverflow::new(
                format!("{} {name}", channel.name()),
                u64::from(value),
                MAX_FIELD_WIDTH,
            )
            .into());
        }
    }
    Ok(())
}

fn write_error(field: &str, err: BitError) -> Error {
    match err {
        BitError::ValueTooWide { value, num_bits } => {
            EncodingOverflow::new(field, u64::from(value), num_bits).into()
        }
        other => DecodeError::Bits(other).into(),
    }
}

fn write_channel(writer: &mut BitWriter, channel: Channel, enc: &ChannelEncoding) -> Result<()> {
    let name = channel.name();
    for width in [enc.ref_bits, enc.start_bits, enc.bias_bits, enc.delta_bits] {
        writer
            .write(width_to_nibble(width), 4)
            .map_err(|e| write_error(name, e))?;
    }
    writer
        .write(enc.reference, enc.ref_bits)
        .map_err(|e| write_error(name, e))?;
    writer
        .write(enc.start_index, enc.start_bits)
        .map_err(|e| write_error(name, e))?;
    writer
        .write(enc.bias, enc.bias_bits)
        .map_err(|e| write_error(name, e))?;
    for &delta in &enc.deltas {
        writer
            .write(delta, enc.delta_bits)
            .map_err(|e| write_error(name, e))?;
    }
    Ok(())
}

fn read_channel(reader: &mut BitReader<'_>, channel: Channel, out: &mut [u16]) -> Result<()> {
    let name = channel.name();
    let overrun = |required_bits: usize, available_bits: usize| DecodeError::ChannelOverrun {
        channel: name,
        required_bits,
        available_bits,
    };

    if reader.remaining() < WIDTH_HEADER_BITS {
        return Err(overrun(WIDTH_HEADER_BITS, reader.remaining()).into());
    }
    let mut widths = [0u32; 4];
    for width in &mut widths {
        *width = nibble_to_width(reader.read(4).map_err(DecodeError::from)?);
    }
    let [ref_bits, start_bits, bias_bits, delta_bits] = widths;

    let delta_count = out.len() - SENTINEL_SLOTS;
    let required = (ref_bits + start_bits + bias_bits) as usize + delta_count * delta_bits as usize;
    if required > reader.remaining() {
        return Err(overrun(required, reader.remaining()).into());
    }

    let reference = reader.read(ref_bits).map_err(DecodeError::from)?;
    let start = reader.read(start_bits).map_err(DecodeError::from)?;
    let bias = reader.read(bias_bits).map_err(DecodeError::from)?;
    if start as usize >= out.len() {
        return Err(DecodeError::BadStartIndex {
            channel: name,
            start,
            len: delta_count,
        }
        .into());
    }

    let mut rebuild = Reconstructor::new(start, reference, bias);
    for (index, slot) in out.iter_mut().enumerate().skip(SENTINEL_SLOTS) {
        let delta = reader.read(delta_bits).map_err(DecodeError::from)?;
        let value = rebuild.next(index, delta);
        *slot = u16::try_from(value).map_err(|_| DecodeError::SampleOutOfRange {
            channel: name,
            index,
            value,
        })?;
    }
    Ok(())
}
