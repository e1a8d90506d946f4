use std::io::Write;
use std::path::{Path, PathBuf};

use wavepack::{
    compress_legacy, write_records, Channel, ChannelEncoding, ChannelLayout, Error, FileNaming,
    FormatError, IndexedRecordFile, LegacyWriter, RecordCodec, WaveformRecord,
};

/// A shot with a noisy return pulse in each channel and zero padding around it.
fn shot(layout: &ChannelLayout, seed: u32) -> WaveformRecord {
    let mut rec = WaveformRecord::zeroed(layout, 1_600_000_000 + seed);
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    for channel in Channel::ALL {
        let data = rec.channel_mut(channel);
        let len = data.len();
        let begin = 1 + (seed as usize * 7 + channel.index() * 3) % (len / 2);
        let end = (begin + len / 3).min(len);
        for (k, slot) in data[begin..end].iter_mut().enumerate() {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let peak = 900.0 * (-((k as f64 - 12.0).powi(2)) / 40.0).exp();
            *slot = 20 + peak as u16 + ((state >> 16) % 15) as u16;
        }
    }
    rec
}

fn shots(layout: &ChannelLayout, n: u32) -> Vec<WaveformRecord> {
    (0..n).map(|i| shot(layout, i)).collect()
}

fn compressed_file(dir: &Path, name: &str, records: &[WaveformRecord]) -> PathBuf {
    let base = dir.join(name);
    write_records(base.with_extension("cwf"), ChannelLayout::STANDARD, records).unwrap();
    base
}

// ── Scenarios ──────────────────────────────────────────────────────────

#[test]
fn test_pmt_scenario_start_and_reference() {
    let layout = ChannelLayout::STANDARD;
    let mut rec = WaveformRecord::zeroed(&layout, 42);
    rec.channel_mut(Channel::Pmt)[..7].copy_from_slice(&[0, 0, 5, 7, 7, 9, 0]);

    let enc = ChannelEncoding::compute(rec.channel(Channel::Pmt));
    assert_eq!(enc.start_index, 2);
    assert_eq!(enc.reference, 5);

    let codec = RecordCodec::new(layout);
    let decoded = codec.decode(&codec.encode(&rec).unwrap()).unwrap();
    assert_eq!(decoded.channel(Channel::Pmt), rec.channel(Channel::Pmt));
    assert_eq!(decoded, rec);
}

#[test]
fn test_all_zero_channel_scenario() {
    let layout = ChannelLayout::STANDARD;
    let rec = WaveformRecord::zeroed(&layout, 0);
    for channel in Channel::ALL {
        let enc = ChannelEncoding::compute(rec.channel(channel));
        assert_eq!(enc.start_index, 0);
        assert_eq!(enc.reference, 0);
        assert_eq!(enc.delta_bits, 1);
        assert_eq!(enc.bias_bits, 1);
    }
    let codec = RecordCodec::new(layout);
    let decoded = codec.decode(&codec.encode(&rec).unwrap()).unwrap();
    for channel in Channel::ALL {
        assert_eq!(decoded.channel(channel).len(), layout.slots(channel));
        assert!(decoded.channel(channel).iter().all(|&s| s == 0));
    }
}

#[test]
fn test_zero_run_after_start_survives() {
    // Zeros after the first nonzero sample are "no data" and must stay zero,
    // while the repeated value around them must not be mistaken for no data.
    let layout = ChannelLayout::STANDARD;
    let mut rec = WaveformRecord::zeroed(&layout, 7);
    let apd = rec.channel_mut(Channel::Apd);
    apd[10] = 300;
    apd[11] = 300;
    apd[40] = 300;
    apd[41] = 299;
    let codec = RecordCodec::new(layout);
    assert_eq!(codec.decode(&codec.encode(&rec).unwrap()).unwrap(), rec);
}

#[test]
fn test_legacy_only_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ChannelLayout::STANDARD;
    let base = dir.path().join("legacy_line");
    let records = shots(&layout, 5);

    let mut writer = LegacyWriter::create(base.with_extension("wve"), layout).unwrap();
    for rec in &records {
        writer.append(rec).unwrap();
    }
    writer.finish().unwrap();
    // A partial trailing record is ignored by the count.
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(base.with_extension("wve"))
        .unwrap();
    f.write_all(&[0xAB; 100]).unwrap();
    drop(f);

    let file_size = std::fs::metadata(base.with_extension("wve")).unwrap().len();
    let mut file = IndexedRecordFile::open(&base).unwrap();
    assert!(file.is_legacy());
    assert_eq!(
        u64::from(file.record_count()),
        file_size / layout.legacy_record_size() as u64
    );
    assert_eq!(file.record_count(), 5);

    let raw = file.read_raw(3).unwrap();
    assert_eq!(raw, records[3].to_legacy_bytes(&layout).unwrap());
    let on_disk = std::fs::read(base.with_extension("wve")).unwrap();
    let size = layout.legacy_record_size();
    assert_eq!(raw, on_disk[3 * size..4 * size]);

    assert_eq!(file.read_record(4).unwrap(), records[4]);
    assert!(matches!(
        file.read_record(5),
        Err(Error::Format(FormatError::IndexOutOfRange { index: 5, count: 5 }))
    ));
}

// ── File structure ─────────────────────────────────────────────────────

#[test]
fn test_compressed_preferred_over_legacy() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ChannelLayout::STANDARD;
    let base = dir.path().join("both");
    let records = shots(&layout, 3);

    let mut legacy = LegacyWriter::create(base.with_extension("wve"), layout).unwrap();
    legacy.append(&records[0]).unwrap();
    legacy.finish().unwrap();
    write_records(base.with_extension("cwf"), layout, &records).unwrap();

    let mut file = IndexedRecordFile::open(&base).unwrap();
    assert!(!file.is_legacy());
    assert_eq!(file.record_count(), 3);
    assert_eq!(file.path(), base.with_extension("cwf"));
    assert_eq!(file.read_record(2).unwrap(), records[2]);
}

#[test]
fn test_offsets_are_monotonic_and_fit() {
    let dir = tempfile::tempdir().unwrap();
    let records = shots(&ChannelLayout::STANDARD, 25);
    let base = compressed_file(dir.path(), "mono", &records);

    let mut file = IndexedRecordFile::open(&base).unwrap();
    let offsets = file.offsets().unwrap();
    assert_eq!(offsets.len(), 25);
    assert_eq!(offsets[0], 4 + 4 * 25);
    for pair in offsets.windows(2) {
        assert!(pair[0] < pair[1], "offsets not increasing: {pair:?}");
    }
    let file_len = std::fs::metadata(base.with_extension("cwf")).unwrap().len();
    let last = file.read_raw(24).unwrap();
    assert_eq!(offsets[24] + last.len() as u64, file_len);
    file.validate().unwrap();
}

#[test]
fn test_size_prefix_matches_consumed_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let records = shots(&ChannelLayout::STANDARD, 10);
    let base = compressed_file(dir.path(), "sizes", &records);
    let codec = RecordCodec::default();

    let mut file = IndexedRecordFile::open(&base).unwrap();
    let offsets = file.offsets().unwrap();
    for i in 0..10u32 {
        let raw = file.read_raw(i).unwrap();
        let size = u16::from_le_bytes([raw[0], raw[1]]) as usize;
        assert_eq!(size, raw.len());
        if let Some(&next) = offsets.get(i as usize + 1) {
            assert_eq!(offsets[i as usize] + size as u64, next);
        }
        // Decoding succeeds only if exactly `size` bytes are consumed.
        assert_eq!(codec.decode(&raw).unwrap(), records[i as usize]);
    }
}

#[test]
fn test_access_order_does_not_matter() {
    let dir = tempfile::tempdir().unwrap();
    let records = shots(&ChannelLayout::STANDARD, 16);
    let base = compressed_file(dir.path(), "order", &records);
    let mut file = IndexedRecordFile::open(&base).unwrap();

    let forward: Vec<WaveformRecord> = file.records().map(|r| r.unwrap()).collect();
    let mut backward: Vec<WaveformRecord> =
        (0..16).rev().map(|i| file.read_record(i).unwrap()).collect();
    backward.reverse();
    let scattered: Vec<(u32, WaveformRecord)> = [7, 0, 15, 3, 3, 11, 1]
        .into_iter()
        .map(|i| (i, file.read_record(i).unwrap()))
        .collect();

    assert_eq!(forward, records);
    assert_eq!(backward, records);
    for (i, rec) in scattered {
        assert_eq!(rec, records[i as usize]);
    }
}

#[test]
fn test_corrupt_payload_size_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let records = shots(&ChannelLayout::STANDARD, 3);
    let base = compressed_file(dir.path(), "corrupt", &records);
    let path = base.with_extension("cwf");

    let mut bytes = std::fs::read(&path).unwrap();
    let second = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    bytes[second] = 1;
    bytes[second + 1] = 0;
    std::fs::write(&path, &bytes).unwrap();

    let mut file = IndexedRecordFile::open(&base).unwrap();
    assert_eq!(file.read_record(0).unwrap(), records[0]);
    assert!(matches!(
        file.read_record(1),
        Err(Error::Format(FormatError::BadPayloadSize { index: 1, size: 1 }))
    ));
    assert!(file.validate().is_err());
}

#[test]
fn test_truncated_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let records = shots(&ChannelLayout::STANDARD, 4);
    let base = compressed_file(dir.path(), "cut", &records);
    let path = base.with_extension("cwf");

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

    let mut file = IndexedRecordFile::open(&base).unwrap();
    assert_eq!(file.read_record(2).unwrap(), records[2]);
    assert!(matches!(
        file.read_record(3),
        Err(Error::Format(FormatError::Truncated { .. }))
    ));
}

// ── Conversion and configuration ───────────────────────────────────────

#[test]
fn test_compress_legacy_file() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ChannelLayout::STANDARD;
    let base = dir.path().join("convert");
    let records = shots(&layout, 12);

    let mut writer = LegacyWriter::create(base.with_extension("wve"), layout).unwrap();
    for rec in &records {
        writer.append(rec).unwrap();
    }
    writer.finish().unwrap();

    let count = compress_legacy(base.with_extension("wve"), base.with_extension("cwf"), layout).unwrap();
    assert_eq!(count, 12);

    let legacy_len = std::fs::metadata(base.with_extension("wve")).unwrap().len();
    let compressed_len = std::fs::metadata(base.with_extension("cwf")).unwrap().len();
    assert!(
        compressed_len < legacy_len,
        "compressed {compressed_len} bytes vs legacy {legacy_len} bytes"
    );

    let mut file = IndexedRecordFile::open(&base).unwrap();
    assert!(!file.is_legacy());
    let decoded: Vec<WaveformRecord> = file.records().collect::<Result<_, _>>().unwrap();
    assert_eq!(decoded, records);
}

#[test]
fn test_custom_layout_and_naming() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ChannelLayout::new(64, 32, 8, 8);
    let naming = FileNaming::new()
        .with_compressed_extension("cmp")
        .with_legacy_extension("raw");
    let base = dir.path().join("custom");
    let records = shots(&layout, 6);

    write_records(base.with_extension("cmp"), layout, &records).unwrap();
    let mut file = IndexedRecordFile::open_with(&base, layout, &naming).unwrap();
    assert_eq!(file.layout(), &layout);
    assert_eq!(file.read_record(5).unwrap(), records[5]);

    // The default naming does not see the custom extension.
    assert!(matches!(
        IndexedRecordFile::open(&base),
        Err(Error::Format(FormatError::NotFound(_)))
    ));
}
