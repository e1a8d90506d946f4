//! Adaptive delta+bias encoding of a single channel.
//!
//! A channel is reduced to:
//!
//! - a **reference**: the first nonzero sample, stored verbatim,
//! - a **start** index: where that sample sits in the channel array,
//! - a **bias**: added to every delta so that all deltas are positive,
//! - one **delta** per slot after the sentinel, each `delta_bits` wide.
//!
//! Deltas are taken between each nonzero sample and the previous *nonzero*
//! sample, not the positionally adjacent one. A zero sample encodes as delta
//! 0. Because the bias is chosen one larger than strictly necessary, every
//! nonzero sample after the first encodes as a delta of at least 1, so delta
//! 0 unambiguously means "no data" on the decode side.

use crate::bitstream::bits_needed;
use crate::record::SENTINEL_SLOTS;

/// Encoding parameters and deltas computed fresh for one channel of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEncoding {
    /// Index of the first nonzero sample, or 0 if the channel is all zero.
    pub start_index: u32,
    /// Value of the first nonzero sample, or 0.
    pub reference: u32,
    /// Offset added to every nonzero delta. Always at least 1.
    pub bias: u32,
    pub ref_bits: u32,
    pub start_bits: u32,
    pub bias_bits: u32,
    pub delta_bits: u32,
    /// One entry per slot after the sentinel (`samples.len() - SENTINEL_SLOTS`).
    pub deltas: Vec<u32>,
}

impl ChannelEncoding {
    /// Computes the encoding of a channel array that includes its sentinel slot.
    pub fn compute(samples: &[u16]) -> Self {
        let data = samples.get(SENTINEL_SLOTS..).unwrap_or(&[]);

        // Pass 1: reference, start and the smallest nonzero-to-nonzero step.
        let mut first: Option<(usize, u16)> = None;
        let mut prev: Option<u16> = None;
        let mut min_delta: Option<i64> = None;
        for (offset, &sample) in data.iter().enumerate() {
            if sample == 0 {
                continue;
            }
            match prev {
                None => first = Some((offset + SENTINEL_SLOTS, sample)),
                Some(p) => {
                    let d = i64::from(sample) - i64::from(p);
                    min_delta = Some(min_delta.map_or(d, |m| m.min(d)));
                }
            }
            prev = Some(sample);
        }
        let (start_index, reference) = first.map_or((0, 0), |(i, s)| (i as u32, u32::from(s)));
        let bias = -(min_delta.unwrap_or(0) - 1).min(-1);

        // Pass 2: biased deltas. The first nonzero slot is carried by the
        // reference and stays 0.
        let mut deltas = Vec::with_capacity(data.len());
        let mut prev: Option<u16> = None;
        for &sample in data {
            let delta = match (sample, prev) {
                (0, _) => 0,
                (s, None) => {
                    prev = Some(s);
                    0
                }
                (s, Some(p)) => {
                    prev = Some(s);
                    (i64::from(s) - i64::from(p) + bias) as u32
                }
            };
            deltas.push(delta);
        }

        let bias = bias as u32;
        let max_delta = deltas.iter().copied().max().unwrap_or(0);
        let (delta_bits, bias_bits) = if max_delta == 0 {
            (1, 1)
        } else {
            (bits_needed(max_delta), bits_needed(bias))
        };

        Self {
            start_index,
            reference,
            bias,
            ref_bits: bits_needed(reference),
            start_bits: bits_needed(start_index),
            bias_bits,
            delta_bits,
            deltas,
        }
    }

    /// Returns `true` if the channel holds no nonzero sample.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start_index == 0
    }

    /// Bits occupied by this channel's values, excluding the width header.
    pub fn value_bits(&self) -> usize {
        (self.ref_bits + self.start_bits + self.bias_bits) as usize
            + self.deltas.len() * self.delta_bits as usize
    }
}

/// Rebuilds samples from a stream of decoded deltas.
///
/// Feed deltas in slot order, starting at the first slot after the sentinel.
#[derive(Debug, Clone)]
pub struct Reconstructor {
    start_index: usize,
    reference: u32,
    bias: u32,
    previous: Option<u32>,
}

impl Reconstructor {
    pub fn new(start_index: u32, reference: u32, bias: u32) -> Self {
        Self {
            start_index: start_index as usize,
            reference,
            bias,
            previous: None,
        }
    }

    /// Returns the sample at `index` given its decoded `delta`.
    ///
    /// A slot before `start_index`, or a zero delta after the first value,
    /// decodes as "no data" (0). The first slot at or after `start_index`
    /// yields the reference. Any later nonzero delta yields
    /// `previous + delta - bias`, clamped at 0.
    pub fn next(&mut self, index: usize, delta: u32) -> u32 {
        if index < self.start_index {
            return 0;
        }
        match self.previous {
            None => {
                self.previous = Some(self.reference);
                self.reference
            }
            Some(_) if delta == 0 => 0,
            Some(prev) => {
                let value = (i64::from(prev) + i64::from(delta) - i64::from(self.bias)).max(0) as u32;
                self.previous = Some(value);
                value
            }
        }
    }
}
