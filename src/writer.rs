//! Creation of compressed and legacy record files.
//!
//! A compressed file is built in one pass. First the record count and a
//! zeroed offset table are written. Each record's payload is then appended,
//! and the table is patched once every record has been written. Appending
//! to an existing file is not supported.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info};

use crate::codec::RecordCodec;
use crate::error::{EncodingOverflow, FormatError, Result};
use crate::file::{IndexedRecordFile, COUNT_BYTES, OFFSET_BYTES};
use crate::record::{ChannelLayout, WaveformRecord};

/// Writes a compressed record file with a fixed, pre-declared record count.
///
/// # Example
/// ```no_run
/// use wavepack::{ChannelLayout, RecordFileWriter, WaveformRecord};
///
/// let layout = ChannelLayout::STANDARD;
/// let mut writer = RecordFileWriter::create("line.cwf", 2, layout)?;
/// writer.append(&WaveformRecord::zeroed(&layout, 100))?;
/// writer.append(&WaveformRecord::zeroed(&layout, 101))?;
/// writer.finish()?;
/// # Ok::<(), wavepack::Error>(())
/// ```
pub struct RecordFileWriter {
    out: BufWriter<File>,
    path: PathBuf,
    codec: RecordCodec,
    declared: u32,
    offsets: Vec<u32>,
    /// Absolute position of the next payload.
    position: u64,
}

impl RecordFileWriter {
    /// Creates (or truncates) `path` and reserves an index for `record_count` records.
    pub fn create(path: impl AsRef<Path>, record_count: u32, layout: ChannelLayout) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut out = BufWriter::new(File::create(&path)?);
        out.write_u32::<LittleEndian>(record_count)?;
        let index_bytes = OFFSET_BYTES * u64::from(record_count);
        io::copy(&mut io::repeat(0).take(index_bytes), &mut out)?;
        Ok(Self {
            out,
            path,
            codec: RecordCodec::new(layout),
            declared: record_count,
            offsets: Vec::with_capacity(record_count as usize),
            position: COUNT_BYTES + index_bytes,
        })
    }

    /// Number of records appended so far.
    pub fn written(&self) -> u32 {
        self.offsets.len() as u32
    }

    /// Encodes `record` and appends it, returning its index.
    pub fn append(&mut self, record: &WaveformRecord) -> Result<u32> {
        let index = self.written();
        if index >= self.declared {
            return Err(FormatError::RecordCountMismatch {
                declared: self.declared,
                written: index + 1,
            }
            .into());
        }
        let payload = self.codec.encode(record)?;
        let offset = u32::try_from(self.position)
            .map_err(|_| EncodingOverflow::new("record offset", self.position, 32))?;
        self.out.write_all(&payload)?;
        debug!("record {index}: offset {offset}, {} bytes", payload.len());
        self.offsets.push(offset);
        self.position += payload.len() as u64;
        Ok(index)
    }

    /// Patches the offset table and flushes the file.
    ///
    /// Fails with `FormatError::RecordCountMismatch` unless exactly the
    /// declared number of records were appended.
    pub fn finish(mut self) -> Result<u32> {
        let written = self.written();
        if written != self.declared {
            return Err(FormatError::RecordCountMismatch {
                declared: self.declared,
                written,
            }
            .into());
        }
        self.out.seek(SeekFrom::Start(COUNT_BYTES))?;
        for &offset in &self.offsets {
            self.out.write_u32::<LittleEndian>(offset)?;
        }
        self.out.flush()?;
        info!(
            "wrote {} records ({} bytes) to {}",
            written,
            self.position,
            self.path.display()
        );
        Ok(written)
    }
}

/// Writes all `records` to a new compressed file at `path`.
pub fn write_records(
    path: impl AsRef<Path>,
    layout: ChannelLayout,
    records: &[WaveformRecord],
) -> Result<u32> {
    let count = u32::try_from(records.len())
        .map_err(|_| EncodingOverflow::new("record count", records.len() as u64, 32))?;
    let mut writer = RecordFileWriter::create(path, count, layout)?;
    for record in records {
        writer.append(record)?;
    }
    writer.finish()
}

/// Writes records in the legacy fixed-size layout.
pub struct LegacyWriter {
    out: BufWriter<File>,
    layout: ChannelLayout,
    written: u32,
}

impl LegacyWriter {
    /// Creates (or truncates) `path`.
    pub fn create(path: impl AsRef<Path>, layout: ChannelLayout) -> Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            layout,
            written: 0,
        })
    }

    /// Appends one record as a raw fixed-size struct.
    pub fn append(&mut self, record: &WaveformRecord) -> Result<()> {
        self.out.write_all(&record.to_legacy_bytes(&self.layout)?)?;
        self.written += 1;
        Ok(())
    }

    /// Flushes the file and returns the number of records written.
    pub fn finish(mut self) -> Result<u32> {
        self.out.flush()?;
        Ok(self.written)
    }
}

/// Converts a legacy file into a compressed file, returning the record count.
pub fn compress_legacy(
    legacy_path: impl AsRef<Path>,
    compressed_path: impl AsRef<Path>,
    layout: ChannelLayout,
) -> Result<u32> {
    let mut source = IndexedRecordFile::open_legacy(legacy_path.as_ref().to_path_buf(), layout)?;
    let mut writer = RecordFileWriter::create(&compressed_path, source.record_count(), layout)?;
    for record in source.records() {
        writer.append(&record?)?;
    }
    let count = writer.finish()?;
    info!(
        "compressed {} into {} ({} records)",
        legacy_path.as_ref().display(),
        compressed_path.as_ref().display(),
        count
    );
    Ok(count)
}
