//! Waveform records, the channel layout table, and the legacy struct layout.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, FormatError, Result};

/// Leading slots in every channel array that hold no sample data.
///
/// Slot 0 of each channel is a sentinel that is always zero and is never
/// encoded. Real samples occupy slots `SENTINEL_SLOTS..`.
pub const SENTINEL_SLOTS: usize = 1;

/// One of the four digitised light-return channels of a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Pmt,
    Apd,
    Ir,
    Raman,
}

impl Channel {
    /// All channels in on-disk order.
    pub const ALL: [Channel; 4] = [Channel::Pmt, Channel::Apd, Channel::Ir, Channel::Raman];

    /// Position of this channel in [`Channel::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short upper-case name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Channel::Pmt => "PMT",
            Channel::Apd => "APD",
            Channel::Ir => "IR",
            Channel::Raman => "RAMAN",
        }
    }
}

/// Per-channel sample counts shared by the writer and the reader of a file.
///
/// The layout is not stored on disk, so both sides must use the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    lengths: [usize; 4],
}

impl ChannelLayout {
    /// The standard layout: PMT=330, APD=148, IR=41, RAMAN=41.
    pub const STANDARD: ChannelLayout = ChannelLayout {
        lengths: [330, 148, 41, 41],
    };

    /// Creates a layout from the number of real samples in each channel.
    pub fn new(pmt: usize, apd: usize, ir: usize, raman: usize) -> Self {
        Self {
            lengths: [pmt, apd, ir, raman],
        }
    }

    /// Number of real samples in `channel`, excluding the sentinel.
    #[inline]
    pub fn len(&self, channel: Channel) -> usize {
        self.lengths[channel.index()]
    }

    /// Length of the channel array including the sentinel slot.
    #[inline]
    pub fn slots(&self, channel: Channel) -> usize {
        self.len(channel) + SENTINEL_SLOTS
    }

    /// Size in bytes of one record in the legacy fixed-size format.
    pub fn legacy_record_size(&self) -> usize {
        4 + Channel::ALL.iter().map(|&c| 2 * self.slots(c)).sum::<usize>()
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// One shot: a timestamp and four fixed-length sample arrays.
///
/// Each channel array includes the leading sentinel slot, so channel `c`
/// holds `layout.slots(c)` values with index 0 always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformRecord {
    pub time_stamp: u32,
    pub channels: [Vec<u16>; 4],
}

impl WaveformRecord {
    /// Creates an all-zero record sized for `layout`.
    pub fn zeroed(layout: &ChannelLayout, time_stamp: u32) -> Self {
        Self {
            time_stamp,
            channels: Channel::ALL.map(|c| vec![0; layout.slots(c)]),
        }
    }

    /// Builds a record from the real samples of each channel, inserting the sentinel.
    ///
    /// Returns `Error::InvalidRecord` if a slice length does not match `layout`.
    pub fn from_samples(
        layout: &ChannelLayout,
        time_stamp: u32,
        samples: [&[u16]; 4],
    ) -> Result<Self> {
        let mut record = Self::zeroed(layout, time_stamp);
        for channel in Channel::ALL {
            let src = samples[channel.index()];
            if src.len() != layout.len(channel) {
                return Err(Error::InvalidRecord(format!(
                    "{} has {} samples, layout expects {}",
                    channel.name(),
                    src.len(),
                    layout.len(channel)
                )));
            }
            record.channels[channel.index()][SENTINEL_SLOTS..].copy_from_slice(src);
        }
        Ok(record)
    }

    /// Full channel array including the sentinel slot.
    #[inline]
    pub fn channel(&self, channel: Channel) -> &[u16] {
        &self.channels[channel.index()]
    }

    /// Mutable access to a full channel array.
    #[inline]
    pub fn channel_mut(&mut self, channel: Channel) -> &mut [u16] {
        &mut self.channels[channel.index()]
    }

    /// Real samples of a channel, without the sentinel slot.
    #[inline]
    pub fn samples(&self, channel: Channel) -> &[u16] {
        &self.channels[channel.index()][SENTINEL_SLOTS..]
    }

    /// Checks that every channel matches `layout` and has a zero sentinel.
    pub fn validate(&self, layout: &ChannelLayout) -> Result<()> {
        for channel in Channel::ALL {
            let data = self.channel(channel);
            if data.len() != layout.slots(channel) {
                return Err(Error::InvalidRecord(format!(
                    "{} has {} slots, layout expects {}",
                    channel.name(),
                    data.len(),
                    layout.slots(channel)
                )));
            }
            if data[..SENTINEL_SLOTS].iter().any(|&s| s != 0) {
                return Err(Error::InvalidRecord(format!(
                    "{} sentinel slot is not zero",
                    channel.name()
                )));
            }
        }
        Ok(())
    }

    /// Serialises the record in the legacy fixed-size layout.
    ///
    /// Layout: `u32 time_stamp`, then every slot of every channel as `u16`,
    /// all little-endian with no padding.
    pub fn to_legacy_bytes(&self, layout: &ChannelLayout) -> Result<Vec<u8>> {
        for channel in Channel::ALL {
            if self.channel(channel).len() != layout.slots(channel) {
                return Err(Error::InvalidRecord(format!(
                    "{} does not match layout",
                    channel.name()
                )));
            }
        }
        let mut out = vec![0u8; layout.legacy_record_size()];
        LittleEndian::write_u32(&mut out[..4], self.time_stamp);
        let mut at = 4;
        for channel in Channel::ALL {
            let data = self.channel(channel);
            LittleEndian::write_u16_into(data, &mut out[at..at + 2 * data.len()]);
            at += 2 * data.len();
        }
        Ok(out)
    }

    /// Parses one legacy fixed-size record. Values are taken as stored.
    pub fn from_legacy_bytes(bytes: &[u8], layout: &ChannelLayout) -> Result<Self> {
        let size = layout.legacy_record_size();
        if bytes.len() < size {
            return Err(FormatError::Truncated {
                required: size as u64,
                actual: bytes.len() as u64,
            }
            .into());
        }
        let mut record = Self::zeroed(layout, LittleEndian::read_u32(&bytes[..4]));
        let mut at = 4;
        for channel in Channel::ALL {
            let dst = record.channel_mut(channel);
            let n = dst.len();
            LittleEndian::read_u16_into(&bytes[at..at + 2 * n], dst);
            at += 2 * n;
        }
        Ok(record)
    }
}
