//! Bounds-checked bit-field packing into byte buffers.
//!
//! Fields are laid out MSB-first: bit 0 of a buffer is the most significant
//! bit of byte 0. A field may start at any bit offset and cross any number of
//! byte boundaries. Bits outside the field are never modified, so fields can
//! be packed back to back into a shared, pre-sized buffer.

use thiserror::Error;

/// Widest field [`pack`] and [`unpack`] accept.
pub const MAX_FIELD_BITS: u32 = 32;

/// Error returned by bit-field access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BitError {
    /// Field width is 0 or greater than [`MAX_FIELD_BITS`].
    #[error("invalid field width {0} (must be 1..=32)")]
    InvalidWidth(u32),

    /// Field would extend past the end of the buffer.
    #[error("field [{start_bit}, +{num_bits}) exceeds buffer of {len_bits} bits")]
    OutOfBounds {
        start_bit: usize,
        num_bits: u32,
        len_bits: usize,
    },

    /// Value has bits set above the field width.
    #[error("value {value} does not fit in {num_bits} bits")]
    ValueTooWide { value: u32, num_bits: u32 },
}

#[inline]
fn check_field(len_bytes: usize, start_bit: usize, num_bits: u32) -> Result<(), BitError> {
    if num_bits == 0 || num_bits > MAX_FIELD_BITS {
        return Err(BitError::InvalidWidth(num_bits));
    }
    let len_bits = len_bytes * 8;
    match start_bit.checked_add(num_bits as usize) {
        Some(end) if end <= len_bits => Ok(()),
        _ => Err(BitError::OutOfBounds {
            start_bit,
            num_bits,
            len_bits,
        }),
    }
}

/// Returns `true` if `value` is representable in `num_bits` bits.
#[inline]
pub fn fits(value: u32, num_bits: u32) -> bool {
    num_bits >= MAX_FIELD_BITS || value >> num_bits == 0
}

/// Returns the number of bits needed to store `value`, never less than 1.
///
/// Equivalent to `ceil(log2(value + 1))` clamped to a minimum of one bit.
#[inline]
pub fn bits_needed(value: u32) -> u32 {
    (u32::BITS - value.leading_zeros()).max(1)
}

/// Writes the low `num_bits` bits of `value` into `buf` starting at `start_bit`.
///
/// Returns `Err(ValueTooWide)` rather than truncating a value wider than the
/// field. On any error the buffer is left untouched.
pub fn pack(buf: &mut [u8], start_bit: usize, num_bits: u32, value: u32) -> Result<(), BitError> {
    check_field(buf.len(), start_bit, num_bits)?;
    if !fits(value, num_bits) {
        return Err(BitError::ValueTooWide { value, num_bits });
    }

    let mut pos = start_bit;
    let mut remaining = num_bits as usize;
    while remaining > 0 {
        let offset = pos % 8;
        let take = remaining.min(8 - offset);
        let shift = remaining - take;
        let chunk = ((value >> shift) & ((1u32 << take) - 1)) as u8;
        let low = 8 - offset - take;
        let mask = (((1u16 << take) - 1) as u8) << low;
        let byte = &mut buf[pos / 8];
        *byte = (*byte & !mask) | (chunk << low);
        pos += take;
        remaining -= take;
    }
    Ok(())
}

/// Reads a `num_bits`-wide field starting at `start_bit`. Inverse of [`pack`].
pub fn unpack(buf: &[u8], start_bit: usize, num_bits: u32) -> Result<u32, BitError> {
    check_field(buf.len(), start_bit, num_bits)?;

    let mut pos = start_bit;
    let mut remaining = num_bits as usize;
    let mut value: u32 = 0;
    while remaining > 0 {
        let offset = pos % 8;
        let take = remaining.min(8 - offset);
        let low = 8 - offset - take;
        let chunk = (buf[pos / 8] >> low) & (((1u16 << take) - 1) as u8);
        value = (value << take) | u32::from(chunk);
        pos += take;
        remaining -= take;
    }
    Ok(value)
}

/// Sequential writer over a fixed-size, zero-initialised buffer.
///
/// The buffer never grows: the caller sizes it up front and every write is
/// bounds-checked against that size.
#[derive(Debug, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Next bit to write.
    pos: usize,
}

impl BitWriter {
    /// Creates a writer over `len_bytes` zeroed bytes.
    pub fn new(len_bytes: usize) -> Self {
        Self {
            bytes: vec![0; len_bytes],
            pos: 0,
        }
    }

    /// Current bit position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Writes `value` as the next `num_bits`-wide field.
    pub fn write(&mut self, value: u32, num_bits: u32) -> Result<(), BitError> {
        pack(&mut self.bytes, self.pos, num_bits, value)?;
        self.pos += num_bits as usize;
        Ok(())
    }

    /// Advances the cursor without writing, leaving the skipped bits zero.
    pub fn skip(&mut self, num_bits: usize) -> Result<(), BitError> {
        let end = self.pos + num_bits;
        if end > self.bytes.len() * 8 {
            return Err(BitError::OutOfBounds {
                start_bit: self.pos,
                num_bits: num_bits as u32,
                len_bits: self.bytes.len() * 8,
            });
        }
        self.pos = end;
        Ok(())
    }

    /// Overwrites an earlier field without moving the cursor.
    pub fn patch(&mut self, start_bit: usize, num_bits: u32, value: u32) -> Result<(), BitError> {
        pack(&mut self.bytes, start_bit, num_bits, value)
    }

    /// Number of whole bytes covered by the bits written so far.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.pos.div_ceil(8)
    }

    /// Consumes the writer, returning the buffer cut to [`byte_len`](Self::byte_len).
    pub fn into_bytes(mut self) -> Vec<u8> {
        let len = self.byte_len();
        self.bytes.truncate(len);
        self.bytes
    }
}

/// A cursor for reading fields sequentially from a byte slice.
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    /// Current bit position (0-indexed from the start).
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader positioned at bit 0 of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current bit position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of bits remaining.
    #[inline]
    pub fn remaining(&self) -> usize {
        (self.bytes.len() * 8).saturating_sub(self.pos)
    }

    /// Reads the next `num_bits`-wide field.
    pub fn read(&mut self, num_bits: u32) -> Result<u32, BitError> {
        let value = unpack(self.bytes, self.pos, num_bits)?;
        self.pos += num_bits as usize;
        Ok(value)
    }
}
