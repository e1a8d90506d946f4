//! Random-access reader for indexed record files.
//!
//! # Compressed container
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | `record_count` (`u32`) |
//! | 4 | 4 × n | absolute byte offset of each record's payload (`u32`) |
//! | `offset[i]` | `payload_size` | codec payload, starting with its own `u16` size |
//!
//! All integers are little-endian.
//!
//! # Legacy container
//!
//! A flat array of fixed-size records (see
//! [`WaveformRecord::to_legacy_bytes`]) with no header or index. It is
//! only used when no compressed sibling exists.
//!
//! Both containers read any record in O(1): one seek into the offset table
//! plus one seek to the payload, or a single seek for legacy files.
//!
//! A handle owns its `File`, and reads take `&mut self`. To read from several
//! threads, open one handle per thread. Reading a file while another process
//! is still writing it is not supported.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, warn};

use crate::codec::RecordCodec;
use crate::error::{FormatError, Result};
use crate::record::{ChannelLayout, WaveformRecord};

/// Size of the leading record count.
pub const COUNT_BYTES: u64 = 4;

/// Size of one offset table entry.
pub const OFFSET_BYTES: u64 = 4;

/// Size of a payload's size prefix.
pub const PAYLOAD_SIZE_BYTES: u64 = 2;

/// Maps a flightline base path to its compressed and legacy sibling files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    compressed_extension: String,
    legacy_extension: String,
}

impl FileNaming {
    /// Default extension of compressed files.
    pub const COMPRESSED_EXTENSION: &'static str = "cwf";
    /// Default extension of legacy fixed-size files.
    pub const LEGACY_EXTENSION: &'static str = "wve";

    pub fn new() -> Self {
        Self {
            compressed_extension: Self::COMPRESSED_EXTENSION.to_owned(),
            legacy_extension: Self::LEGACY_EXTENSION.to_owned(),
        }
    }

    /// Overrides the compressed file extension.
    pub fn with_compressed_extension(mut self, ext: impl Into<String>) -> Self {
        self.compressed_extension = ext.into();
        self
    }

    /// Overrides the legacy file extension.
    pub fn with_legacy_extension(mut self, ext: impl Into<String>) -> Self {
        self.legacy_extension = ext.into();
        self
    }

    /// Path of the compressed sibling of `path`.
    pub fn compressed_path(&self, path: &Path) -> PathBuf {
        path.with_extension(&self.compressed_extension)
    }

    /// Path of the legacy sibling of `path`.
    pub fn legacy_path(&self, path: &Path) -> PathBuf {
        path.with_extension(&self.legacy_extension)
    }
}

impl Default for FileNaming {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Storage {
    Compressed { codec: RecordCodec },
    Legacy { record_size: u64 },
}

/// An open record file, compressed or legacy.
///
/// # Example
/// ```no_run
/// use wavepack::IndexedRecordFile;
///
/// let mut file = IndexedRecordFile::open("flightline_0001")?;
/// println!("{} records, legacy = {}", file.record_count(), file.is_legacy());
/// let shot = file.read_record(42)?;
/// println!("time stamp {}", shot.time_stamp);
/// # Ok::<(), wavepack::Error>(())
/// ```
#[derive(Debug)]
pub struct IndexedRecordFile {
    file: File,
    path: PathBuf,
    file_len: u64,
    record_count: u32,
    layout: ChannelLayout,
    storage: Storage,
}

impl IndexedRecordFile {
    /// Opens the record file for `path` with the standard layout and naming.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ChannelLayout::STANDARD, &FileNaming::default())
    }

    /// Opens the record file for `path`, preferring the compressed sibling.
    ///
    /// If the compressed sibling exists, its leading record count is read
    /// and checked against the file length. Otherwise the legacy sibling is
    /// opened and its record count is `file_size / record_size`.
    pub fn open_with(
        path: impl AsRef<Path>,
        layout: ChannelLayout,
        naming: &FileNaming,
    ) -> Result<Self> {
        let path = path.as_ref();
        let compressed = naming.compressed_path(path);
        if compressed.is_file() {
            return Self::open_compressed(compressed, layout);
        }

        let legacy = naming.legacy_path(path);
        if legacy.is_file() {
            warn!(
                "no compressed file {}, falling back to legacy {}",
                compressed.display(),
                legacy.display()
            );
            return Self::open_legacy(legacy, layout);
        }

        Err(FormatError::NotFound(path.display().to_string()).into())
    }

    fn open_compressed(path: PathBuf, layout: ChannelLayout) -> Result<Self> {
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        if file_len < COUNT_BYTES {
            return Err(FormatError::Truncated {
                required: COUNT_BYTES,
                actual: file_len,
            }
            .into());
        }
        let record_count = file.read_u32::<LittleEndian>()?;
        let index_end = COUNT_BYTES + OFFSET_BYTES * u64::from(record_count);
        if index_end > file_len {
            return Err(FormatError::Truncated {
                required: index_end,
                actual: file_len,
            }
            .into());
        }
        info!(
            "opened compressed record file {} ({} records, {} bytes)",
            path.display(),
            record_count,
            file_len
        );
        Ok(Self {
            file,
            path,
            file_len,
            record_count,
            layout,
            storage: Storage::Compressed {
                codec: RecordCodec::new(layout),
            },
        })
    }

    pub(crate) fn open_legacy(path: PathBuf, layout: ChannelLayout) -> Result<Self> {
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let record_size = layout.legacy_record_size() as u64;
        let whole = file_len / record_size;
        if file_len % record_size != 0 {
            warn!(
                "legacy file {} has {} trailing bytes after {} whole records",
                path.display(),
                file_len % record_size,
                whole
            );
        }
        let record_count = u32::try_from(whole).map_err(|_| FormatError::Truncated {
            required: u64::from(u32::MAX) * record_size,
            actual: file_len,
        })?;
        info!(
            "opened legacy record file {} ({} records of {} bytes)",
            path.display(),
            record_count,
            record_size
        );
        Ok(Self {
            file,
            path,
            file_len,
            record_count,
            layout,
            storage: Storage::Legacy { record_size },
        })
    }

    /// Number of records in the file.
    #[inline]
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    /// `true` if this handle reads the legacy fixed-size sibling.
    #[inline]
    pub fn is_legacy(&self) -> bool {
        matches!(self.storage, Storage::Legacy { .. })
    }

    /// Path of the file actually opened.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Channel layout used to decode records.
    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.record_count {
            return Err(FormatError::IndexOutOfRange {
                index,
                count: self.record_count,
            }
            .into());
        }
        Ok(())
    }

    /// Reads and decodes record `index`.
    pub fn read_record(&mut self, index: u32) -> Result<WaveformRecord> {
        let raw = self.read_raw(index)?;
        match self.storage {
            Storage::Compressed { codec } => codec.decode(&raw),
            Storage::Legacy { .. } => WaveformRecord::from_legacy_bytes(&raw, &self.layout),
        }
    }

    /// Returns the stored bytes of record `index` without decoding them.
    ///
    /// For legacy files this is the fixed-size struct. For compressed files
    /// it is the payload including its size prefix.
    pub fn read_raw(&mut self, index: u32) -> Result<Vec<u8>> {
        self.check_index(index)?;
        match self.storage {
            Storage::Legacy { record_size } => {
                self.file.seek(SeekFrom::Start(u64::from(index) * record_size))?;
                let mut buf = vec![0u8; record_size as usize];
                self.file.read_exact(&mut buf)?;
                Ok(buf)
            }
            Storage::Compressed { .. } => {
                let offset = self.read_offset(index)?;
                self.read_payload(index, offset)
            }
        }
    }

    fn index_end(&self) -> u64 {
        COUNT_BYTES + OFFSET_BYTES * u64::from(self.record_count)
    }

    fn read_offset(&mut self, index: u32) -> Result<u32> {
        self.file
            .seek(SeekFrom::Start(COUNT_BYTES + OFFSET_BYTES * u64::from(index)))?;
        let offset = self.file.read_u32::<LittleEndian>()?;
        let start = u64::from(offset);
        if start < self.index_end() || start + PAYLOAD_SIZE_BYTES > self.file_len {
            return Err(FormatError::OffsetOutOfRange { index, offset }.into());
        }
        Ok(offset)
    }

    fn read_payload_size(&mut self, index: u32, offset: u32) -> Result<u16> {
        self.file.seek(SeekFrom::Start(u64::from(offset)))?;
        let size = self.file.read_u16::<LittleEndian>()?;
        if u64::from(size) < PAYLOAD_SIZE_BYTES {
            return Err(FormatError::BadPayloadSize { index, size }.into());
        }
        let end = u64::from(offset) + u64::from(size);
        if end > self.file_len {
            return Err(FormatError::Truncated {
                required: end,
                actual: self.file_len,
            }
            .into());
        }
        Ok(size)
    }

    fn read_payload(&mut self, index: u32, offset: u32) -> Result<Vec<u8>> {
        let size = self.read_payload_size(index, offset)?;
        debug!("record {index}: offset {offset}, {size} bytes");
        let mut buf = vec![0u8; usize::from(size)];
        buf[..2].copy_from_slice(&size.to_le_bytes());
        self.file.read_exact(&mut buf[2..])?;
        Ok(buf)
    }

    /// Byte position of every record, in index order.
    ///
    /// For compressed files this is the offset table. For legacy files the
    /// positions are implied by the fixed record size.
    pub fn offsets(&mut self) -> Result<Vec<u64>> {
        match self.storage {
            Storage::Legacy { record_size } => Ok((0..u64::from(self.record_count))
                .map(|i| i * record_size)
                .collect()),
            Storage::Compressed { .. } => {
                self.file.seek(SeekFrom::Start(COUNT_BYTES))?;
                let mut table = vec![0u32; self.record_count as usize];
                self.file.read_u32_into::<LittleEndian>(&mut table)?;
                Ok(table.into_iter().map(u64::from).collect())
            }
        }
    }

    /// Checks the structure of a compressed file without decoding payloads.
    ///
    /// Offsets must increase strictly and start after the offset table.
    /// Each payload must end exactly where the next one starts, and the last
    /// must end within the file. Legacy files carry no structure beyond
    /// their length and always pass.
    pub fn validate(&mut self) -> Result<()> {
        if self.is_legacy() {
            return Ok(());
        }
        let offsets = self.offsets()?;
        let mut previous: Option<u64> = None;
        for (i, &offset) in offsets.iter().enumerate() {
            let index = i as u32;
            if let Some(prev) = previous {
                if offset <= prev {
                    return Err(FormatError::NonMonotonicOffset {
                        index,
                        offset: offset as u32,
                        previous: prev as u32,
                    }
                    .into());
                }
            }
            if offset < self.index_end() || offset + PAYLOAD_SIZE_BYTES > self.file_len {
                return Err(FormatError::OffsetOutOfRange {
                    index,
                    offset: offset as u32,
                }
                .into());
            }
            let size = self.read_payload_size(index, offset as u32)?;
            if let Some(&next) = offsets.get(i + 1) {
                if offset + u64::from(size) != next {
                    return Err(FormatError::BadPayloadSize { index, size }.into());
                }
            }
            previous = Some(offset);
        }
        Ok(())
    }

    /// Iterates over all records in index order.
    pub fn records(&mut self) -> Records<'_> {
        Records {
            file: self,
            next: 0,
        }
    }
}

/// Sequential iterator over the records of an [`IndexedRecordFile`].
pub struct Records<'a> {
    file: &'a mut IndexedRecordFile,
    next: u32,
}

impl Iterator for Records<'_> {
    type Item = Result<WaveformRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.file.record_count {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.file.read_record(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.file.record_count - self.next) as usize;
        (left, Some(left))
    }
}
