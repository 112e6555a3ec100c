//! 加载 → 变换 → 编码的端到端场景（不涉及磁盘）

use std::sync::Arc;
use titanbreak::{
    presets, CellAddress, ErrorClass, Operation, RecordCodec, RecordLoader, RecordSet, Selection,
    SourceFile, TransformEngine, Value,
};

const ENRAGE_VALUES: [f32; 13] = [
    1.0, 1.5, 2.0, 0.5, 0.75, 1.25, 3.0, 4.5, 6.0, 7.5, 9.0, 10.5, 12.0,
];

fn enrage_file(block_at: usize, prefix: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 0x400];
    bytes[0xD0..0xD0 + prefix.len()].copy_from_slice(prefix);
    for (i, v) in ENRAGE_VALUES.iter().enumerate() {
        let at = block_at + i * 4;
        bytes[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn floats(set: &RecordSet, row: usize) -> Vec<f32> {
    set.records()[row]
        .values()
        .iter()
        .map(|v| match v {
            Value::Float(f) => *f,
            Value::Int(i) => *i as f32,
        })
        .collect()
}

fn load(spec_name: &str, files: Vec<(&str, Vec<u8>)>) -> (RecordSet, titanbreak::LoadReport) {
    let spec = presets::builtin(spec_name).unwrap();
    let sources = files
        .into_iter()
        .map(|(name, bytes)| SourceFile::new(name, name, bytes))
        .collect();
    RecordLoader::new(&spec).load(sources)
}

#[test]
fn enrage_block_decodes_at_d0() {
    let (set, report) = load("enrage", vec![("em001_00_dttune.48E8AC29", enrage_file(0xD0, &[]))]);
    assert_eq!(report.files_loaded, 1);
    assert_eq!(set.records()[0].block_offset(), 0xD0);
    assert_eq!(floats(&set, 0), ENRAGE_VALUES.to_vec());
}

#[test]
fn enrage_scan_skips_implausible_prefix() {
    // NaN、超出范围的 100.0，其后全为 0
    let mut prefix = Vec::new();
    prefix.extend_from_slice(&f32::NAN.to_le_bytes());
    prefix.extend_from_slice(&100.0f32.to_le_bytes());
    prefix.extend_from_slice(&[0u8; 9]);
    let bytes = enrage_file(0xD0 + 17, &prefix);

    let (first, _) = load("enrage", vec![("em001_00_dttune.48E8AC29", bytes.clone())]);
    let (second, _) = load("enrage", vec![("em001_00_dttune.48E8AC29", bytes)]);
    assert_eq!(first.records()[0].block_offset(), 0xD0 + 17);
    assert_eq!(second.records()[0].block_offset(), 0xD0 + 17);
    assert_eq!(floats(&first, 0), ENRAGE_VALUES.to_vec());
}

#[test]
fn enrage_without_block_is_skipped_not_fatal() {
    let (set, report) = load(
        "enrage",
        vec![
            ("em001_00_dttune.48E8AC29", vec![0u8; 0x400]),
            ("em002_00_dttune.48E8AC29", enrage_file(0xD0, &[])),
        ],
    );
    assert_eq!(set.len(), 1);
    assert_eq!(report.count_of(ErrorClass::BlockNotFound), 1);
}

#[test]
fn stagger_signature_rejected_before_decode() {
    let mut bad = vec![0u8; 0x3C + 72];
    bad[0..4].copy_from_slice(b"XXXX");
    let (set, report) = load("stagger", vec![("em001_00_dttune.48E8AC29", bad)]);
    assert!(set.is_empty());
    assert_eq!(report.count_of(ErrorClass::FormatError), 1);
}

#[test]
fn stagger_zero_parts_protected_and_gaps_preserved() {
    let mut bytes = vec![0xABu8; 0x3C + 72 + 8];
    bytes[0..4].copy_from_slice(&presets::DTT_MAGIC.to_le_bytes());
    let thresholds: [u16; 8] = [100, 0, 250, 0, 400, 500, 0, 700];
    for (i, t) in thresholds.iter().enumerate() {
        let at = 0x3C + i * 10;
        bytes[at..at + 2].copy_from_slice(&t.to_le_bytes());
    }

    let (mut set, _) = load("stagger", vec![("em001_00_dttune.48E8AC29", bytes.clone())]);
    let report = TransformEngine::new(&mut set)
        .scale_percentage(50.0, &[], &Selection::All)
        .unwrap();
    assert_eq!(report.protected, 3);
    assert_eq!(report.changed, 5);

    let codec = RecordCodec::new(Arc::clone(set.schema()));
    let mut content = bytes.clone();
    codec.splice_into(&mut content, &set.records()[0]).unwrap();

    for (i, t) in thresholds.iter().enumerate() {
        let at = 0x3C + i * 10;
        let written = u16::from_le_bytes([content[at], content[at + 1]]);
        let expected = if *t == 0 { 0 } else { t + t / 2 };
        assert_eq!(written, expected, "part {}", i);
        // 字段之间的 8 个字节原样保留
        assert_eq!(&content[at + 2..at + 10], &bytes[at + 2..at + 10]);
    }
    assert_eq!(&content[..0x3C], &bytes[..0x3C]);
}

#[test]
fn resident_table_sorted_by_genus() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&presets::RDB_MAGIC.to_le_bytes());
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.push(2);
    for (despawn, genus) in [(900i32, 9u8), (300, 2)] {
        let mut entry = [0u8; 16];
        entry[0..4].copy_from_slice(&despawn.to_le_bytes());
        entry[4..6].copy_from_slice(&60i16.to_le_bytes());
        entry[12] = genus;
        bytes.extend_from_slice(&entry);
    }

    let (set, _) = load("resident", vec![("em_resident_dtbase.583F70B0", bytes)]);
    let schema = Arc::clone(set.schema());
    assert_eq!(set.len(), 2);
    assert_eq!(set.files()[0].version, Some(3));
    assert_eq!(set.records()[0].get(&schema, "genus_id"), Some(Value::Int(2)));
    assert_eq!(set.records()[0].get(&schema, "corpse_despawn"), Some(Value::Int(300)));
    assert_eq!(set.records()[0].record_index(), 1);
    assert_eq!(set.records()[0].block_offset(), 9 + 16);
}

#[test]
fn loot_hidden_pair_unchanged_by_quantity_bump() {
    let mut bytes = vec![0u8; 26];
    bytes.extend_from_slice(&[255, 255, 0x10, 0x00]);
    bytes.extend_from_slice(&[40, 2, 0x20, 0x00]);

    let (mut set, _) = load("loot", vec![("hagi_s1_em001_00.33A84E14", bytes)]);
    TransformEngine::new(&mut set)
        .add_delta(1.0, &["quantity".to_string()], &Selection::All)
        .unwrap();

    let file = set.files()[0].identifier();
    let hidden = |field: &str| set.get_value(&CellAddress::new(file.clone(), 0, field)).unwrap();
    assert!(hidden("quantity").bit_eq(Value::Int(255)));
    assert!(hidden("probability").bit_eq(Value::Int(255)));
    assert_eq!(
        set.get_value(&CellAddress::new(file.clone(), 1, "quantity")).unwrap(),
        Value::Int(3)
    );
}

#[test]
fn transform_on_one_file_leaves_other_file_untouched() {
    let mut first = vec![0u8; 64];
    first[56..60].copy_from_slice(&1000u32.to_le_bytes());
    let mut second = vec![0u8; 64];
    second[56..60].copy_from_slice(&2000u32.to_le_bytes());

    let (mut set, _) = load(
        "hp",
        vec![
            ("em001_00_dttune.48E8AC29", first),
            ("em002_00_dttune.48E8AC29", second.clone()),
        ],
    );
    let other = set.find_file("em002_00_dttune.48E8AC29").unwrap();
    let target_row = set.locate_row("em001_00_dttune.48E8AC29", 0).unwrap();

    TransformEngine::new(&mut set)
        .apply(Operation::Multiplier(3.0), &[], &Selection::Records(vec![target_row]))
        .unwrap();

    assert_eq!(&set.file(other).unwrap().original[..], &second[..]);
    assert_eq!(set.modified_files().len(), 1);
    let codec = RecordCodec::new(Arc::clone(set.schema()));
    let row = set.locate_row("em002_00_dttune.48E8AC29", 0).unwrap();
    assert_eq!(codec.encode(&set.records()[row]).unwrap(), 2000u32.to_le_bytes().to_vec());
}

#[test]
fn decode_encode_roundtrip_for_resident_entry() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&presets::RDB_MAGIC.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.push(1);
    let mut entry = [0x5Au8; 16];
    entry[0..4].copy_from_slice(&(-1i32).to_le_bytes());
    entry[4..6].copy_from_slice(&i16::MIN.to_le_bytes());
    entry[6..8].copy_from_slice(&i16::MAX.to_le_bytes());
    entry[8..10].copy_from_slice(&0i16.to_le_bytes());
    entry[10..12].copy_from_slice(&1800i16.to_le_bytes());
    entry[12] = 255;
    bytes.extend_from_slice(&entry);

    let (set, _) = load("resident", vec![("em_resident_dtbase.583F70B0", bytes)]);
    let codec = RecordCodec::new(Arc::clone(set.schema()));
    let encoded = codec.encode(&set.records()[0]).unwrap();
    assert_eq!(encoded, entry.to_vec());

    let reloaded: Arc<[u8]> = Arc::from(encoded);
    let decoded = codec.decode_values(&reloaded, 0).unwrap();
    assert_eq!(decoded, set.records()[0].values().to_vec());
}
