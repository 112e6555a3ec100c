/// 内置格式
///
/// 对应工具集里五个编辑器各自处理的文件格式。

use crate::datatypes::{NumericKind, Value};
use crate::format::{FormatSpec, SortKey};
use crate::locator::{BlockLocator, EntryCount, Plausibility, Signature, TableLayout};
use crate::schema::{FieldDescriptor, Schema, Sentinel};
use crate::utils::{EditorError, Result};

/// 怪物调校文件（enrage / hp / stagger 共用）
pub const DTTUNE_PATTERN: &str = "em*_*_dttune.48E8AC29";
/// 常驻数据文件
pub const RESIDENT_PATTERN: &str = "*em_resident_dtbase.583F70B0";
/// 掉落表文件
pub const LOOT_PATTERN: &str = "hagi_s*_em*_*.33A84E14";
/// 环境生物文件前缀（调校类格式不处理）
pub const ENDEMIC_PREFIX: &str = "ems";

/// `DTT\0`
pub const DTT_MAGIC: u32 = 0x0054_5444;
/// `RDB\0`
pub const RDB_MAGIC: u32 = 0x0042_4452;

/// 掉落表中受保护的物品 ID（急救药）
pub const RESERVED_ITEM_ID: i64 = 1716;
/// 掉落条目“隐藏”标记值（数量与概率同为该值）
pub const HIDDEN_DROP_MARKER: i64 = 255;

/// 预设名称
pub const PRESET_NAMES: &[&str] = &["enrage", "hp", "stagger", "resident", "loot"];

const ENRAGE_FIELDS: [&str; 13] = [
    "spd", "atk", "def", "hp_100", "hp_99_88", "hp_88_77", "hp_77_66", "hp_66_55", "hp_55_44",
    "hp_44_33", "hp_33_22", "hp_22_11", "hp_11_0",
];

const STAGGER_FIELDS: [&str; 8] = [
    "head", "neck_torso", "stagger_1", "stagger_2", "stagger_3", "stagger_4", "stagger_5",
    "stagger_6",
];

/// 狂暴曲线：13 个 f32，位置不固定，从 0xD0 起扫描 512 字节
pub fn enrage() -> Result<FormatSpec> {
    let fields = ENRAGE_FIELDS
        .iter()
        .enumerate()
        .map(|(i, name)| FieldDescriptor::new(name, i * 4, NumericKind::Float, 4))
        .collect();
    let schema = Schema::new("enrage", ENRAGE_FIELDS.len() * 4, fields)?;
    let locator = BlockLocator::scan(0xD0, 512, Plausibility::default());

    Ok(FormatSpec::new("enrage", DTTUNE_PATTERN, schema, locator)?
        .with_description("Speed/attack/defense multipliers and enrage curve by HP bracket")
        .excluding(ENDEMIC_PREFIX))
}

/// 基础体力：偏移 56 处的 u32
pub fn hp() -> Result<FormatSpec> {
    let schema = Schema::new(
        "hp",
        4,
        vec![FieldDescriptor::new("base_hp", 0, NumericKind::Unsigned, 4)],
    )?;

    Ok(FormatSpec::new("hp", DTTUNE_PATTERN, schema, BlockLocator::fixed(56))?
        .with_description("Monster base hit points")
        .excluding(ENDEMIC_PREFIX))
}

/// 部位硬直阈值：0x3C 起每 10 字节一个 u16，值为 0 的部位不参与批量修改
pub fn stagger() -> Result<FormatSpec> {
    let fields = STAGGER_FIELDS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            FieldDescriptor::new(name, i * 10, NumericKind::Unsigned, 2)
                .protected_when(Sentinel::Equals { value: Value::Int(0) })
        })
        .collect();
    let schema = Schema::new("stagger", 72, fields)?;
    let locator = BlockLocator::fixed(0x3C).with_signature(Signature::at_start(DTT_MAGIC));

    Ok(FormatSpec::new("stagger", DTTUNE_PATTERN, schema, locator)?
        .with_description("Part stagger thresholds")
        .excluding(ENDEMIC_PREFIX))
}

/// 常驻数据：9 字节文件头（魔数 + 版本 + u8 条目数）后接 16 字节条目
pub fn resident() -> Result<FormatSpec> {
    let timer = |name: &str, offset: usize, width: usize| {
        FieldDescriptor::new(name, offset, NumericKind::Signed, width).time_scaled()
    };
    let schema = Schema::new(
        "resident",
        16,
        vec![
            timer("corpse_despawn", 0, 4),
            timer("exhaust_duration", 4, 2),
            timer("zone_cooldown", 6, 2),
            timer("rage_duration", 8, 2),
            timer("vulnerability_timer", 10, 2),
            FieldDescriptor::new("genus_id", 12, NumericKind::Unsigned, 1).read_only(),
        ],
    )?;
    let layout = TableLayout {
        header_size: 9,
        count: EntryCount::U8At(8),
        stride: 16,
        version_at: Some(4),
    };
    let locator = BlockLocator::table(layout).with_signature(Signature::at_start(RDB_MAGIC));

    Ok(FormatSpec::new("resident", RESIDENT_PATTERN, schema, locator)?
        .with_description("Per-genus resident timers (ticks at 30/s)")
        .sorted_by(SortKey::Field {
            field: "genus_id".to_string(),
        }))
}

/// 掉落表：26 字节文件头后直到文件末尾的 4 字节条目
pub fn loot() -> Result<FormatSpec> {
    let hidden = Sentinel::AllEqual {
        fields: vec!["probability".to_string(), "quantity".to_string()],
        value: Value::Int(HIDDEN_DROP_MARKER),
    };
    let schema = Schema::new(
        "loot",
        4,
        vec![
            FieldDescriptor::new("probability", 0, NumericKind::Unsigned, 1)
                .protected_when(hidden.clone()),
            FieldDescriptor::new("quantity", 1, NumericKind::Unsigned, 1)
                .protected_when(hidden)
                .protected_when(Sentinel::FieldEquals {
                    field: "item_id".to_string(),
                    value: Value::Int(RESERVED_ITEM_ID),
                }),
            FieldDescriptor::new("item_id", 2, NumericKind::Unsigned, 2).read_only(),
        ],
    )?;
    let layout = TableLayout {
        header_size: 26,
        count: EntryCount::ToEnd,
        stride: 4,
        version_at: None,
    };

    Ok(FormatSpec::new("loot", LOOT_PATTERN, schema, BlockLocator::table(layout))?
        .with_description("Monster drop tables (probability, quantity, item id)"))
}

/// 全部内置格式
pub fn all() -> Result<Vec<FormatSpec>> {
    PRESET_NAMES.iter().map(|name| builtin(name)).collect()
}

/// 按名称获取内置格式
pub fn builtin(name: &str) -> Result<FormatSpec> {
    match name {
        "enrage" => enrage(),
        "hp" => hp(),
        "stagger" => stagger(),
        "resident" => resident(),
        "loot" => loot(),
        other => Err(EditorError::Format(format!(
            "unknown format preset '{}' (available: {})",
            other,
            PRESET_NAMES.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_valid() {
        let specs = all().unwrap();
        assert_eq!(specs.len(), PRESET_NAMES.len());
        for (spec, name) in specs.iter().zip(PRESET_NAMES) {
            assert_eq!(spec.name, *name);
        }
    }

    #[test]
    fn test_stagger_layout() {
        let spec = stagger().unwrap();
        let last = spec.schema.fields().last().unwrap();
        assert_eq!(0x3C + last.offset, 0x82);
        assert_eq!(0x3C + spec.schema.total_width(), 0x84);
    }

    #[test]
    fn test_resident_genus_not_editable() {
        let spec = resident().unwrap();
        assert!(!spec.schema.field("genus_id").unwrap().editable);
        assert!(spec.schema.field("rage_duration").unwrap().time_scaled);
    }

    #[test]
    fn test_loot_pattern_covers_em_and_ems() {
        let spec = loot().unwrap();
        assert!(spec.matches_file_name("hagi_s1_em001_00.33A84E14"));
        assert!(spec.matches_file_name("hagi_s1_ems042_01.33A84E14"));
    }

    #[test]
    fn test_unknown_preset() {
        assert!(builtin("nope").is_err());
    }
}
